use std::path::PathBuf;

use aegis_client::credentials::{self, default_state_dir};
use aegis_client::models::{
    ApprovePermitPayload, IncidentQuery, IncidentSeverity, IncidentStatus, InspeksiQuery,
    InspeksiStatus, PermitQuery, PermitStatus, PermitType, UserQuery,
};
use aegis_client::stats::{StatusFilter, filter_inspeksi, tally_inspeksi};
use aegis_client::{ClientConfig, ClientError, LoginCredentials, Session, UserRole};
use anyhow::{Context, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "aegis")]
#[command(about = "AEGIS K3 safety-management API client")]
pub struct AegisCli {
    /// API base URL, e.g. https://k3.example.com/api
    #[arg(long, global = true, env = "AEGIS_API_URL")]
    pub api_url: Option<String>,

    /// Directory holding the saved session
    #[arg(long, global = true, env = "AEGIS_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and save the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AEGIS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in with the built-in demo administrator
    DemoLogin,
    /// Sign out and forget the saved session
    Logout,
    /// Show the signed-in user
    Whoami {
        /// Use the cached profile without asking the server
        #[arg(long)]
        offline: bool,
    },
    /// Dashboard totals
    Dashboard,
    /// Safety inspections
    #[command(subcommand)]
    Inspections(InspectionCommand),
    /// Incident reports
    #[command(subcommand)]
    Incidents(IncidentCommand),
    /// Work permits
    #[command(subcommand)]
    Permits(PermitCommand),
    /// User accounts
    #[command(subcommand)]
    Users(UserCommand),
}

#[derive(Args, Debug, Clone, Default)]
pub struct PageArgs {
    #[arg(long)]
    pub page: Option<u32>,
    #[arg(long)]
    pub limit: Option<u32>,
}

#[derive(Subcommand)]
pub enum InspectionCommand {
    List {
        /// `all`, `safe`, `unsafe` or `pending`
        #[arg(long, default_value = "all")]
        status: StatusFilter<InspeksiStatus>,
        #[command(flatten)]
        paging: PageArgs,
    },
    Stats {
        /// Count the fetched page locally instead of calling the stats endpoint
        #[arg(long)]
        local: bool,
    },
}

#[derive(Subcommand)]
pub enum IncidentCommand {
    List {
        #[arg(long)]
        severity: Option<IncidentSeverity>,
        #[arg(long)]
        status: Option<IncidentStatus>,
        #[command(flatten)]
        paging: PageArgs,
    },
    Stats,
}

#[derive(Subcommand)]
pub enum PermitCommand {
    List {
        #[arg(long = "type")]
        permit_type: Option<PermitType>,
        #[arg(long)]
        status: Option<PermitStatus>,
        #[command(flatten)]
        paging: PageArgs,
    },
    Stats,
    Approve {
        id: String,
    },
    Reject {
        id: String,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    List {
        #[arg(long)]
        role: Option<UserRole>,
        #[command(flatten)]
        paging: PageArgs,
    },
}

pub const SESSION_EXPIRED: &str = "session expired, sign in again with `aegis login`";

/// Runs one command and returns what should be printed.
///
/// Errors that ended the session are reported as [`SESSION_EXPIRED`] rather
/// than as the underlying renewal failure.
pub async fn run(cli: AegisCli) -> anyhow::Result<String> {
    execute(cli).await.map_err(|error| {
        if ends_session(&error) {
            tracing::debug!(error = %error, "session ended");
            anyhow!(SESSION_EXPIRED)
        } else {
            error
        }
    })
}

fn ends_session(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<ClientError>()
            .is_some_and(ClientError::is_session_terminal)
    })
}

async fn execute(cli: AegisCli) -> anyhow::Result<String> {
    let session = open_session(cli.api_url, cli.state_dir)?;
    let api = session.api();
    match cli.command {
        Commands::Login { email, password } => {
            let user = session
                .login(&LoginCredentials::new(email, password))
                .await
                .context("login failed")?;
            Ok(format!("signed in as {} ({})", user.email, user.role))
        }
        Commands::DemoLogin => {
            let user = session.demo_login()?;
            Ok(format!("signed in as {} ({})", user.email, user.role))
        }
        Commands::Logout => {
            session.logout().await;
            Ok("signed out".to_string())
        }
        Commands::Whoami { offline } => {
            let user = if offline {
                session.stored_user()
            } else {
                session.current_user().await
            };
            match user {
                Some(user) => pretty(&user),
                None => bail!("not signed in"),
            }
        }
        Commands::Dashboard => pretty(&api.dashboard_stats().await?),
        Commands::Inspections(InspectionCommand::List { status, paging }) => {
            let query = InspeksiQuery {
                status: status.as_query(),
                page: paging.page,
                limit: paging.limit,
            };
            let page = api.list_inspeksi(&query).await?;
            pretty(&filter_inspeksi(&page.data, status))
        }
        Commands::Inspections(InspectionCommand::Stats { local }) => {
            if local {
                let page = api.list_inspeksi(&InspeksiQuery::default()).await?;
                pretty(&tally_inspeksi(&page.data))
            } else {
                pretty(&api.inspeksi_stats().await?)
            }
        }
        Commands::Incidents(IncidentCommand::List {
            severity,
            status,
            paging,
        }) => {
            let query = IncidentQuery {
                severity,
                status,
                page: paging.page,
                limit: paging.limit,
            };
            pretty(&api.list_incidents(&query).await?.data)
        }
        Commands::Incidents(IncidentCommand::Stats) => pretty(&api.incident_stats().await?),
        Commands::Permits(PermitCommand::List {
            permit_type,
            status,
            paging,
        }) => {
            let query = PermitQuery {
                permit_type,
                status,
                page: paging.page,
                limit: paging.limit,
            };
            pretty(&api.list_permits(&query).await?.data)
        }
        Commands::Permits(PermitCommand::Stats) => pretty(&api.permit_stats().await?),
        Commands::Permits(PermitCommand::Approve { id }) => {
            pretty(&api.approve_permit(&id, &ApprovePermitPayload::approve()).await?)
        }
        Commands::Permits(PermitCommand::Reject { id, reason }) => {
            pretty(&api.approve_permit(&id, &ApprovePermitPayload::reject(reason)).await?)
        }
        Commands::Users(UserCommand::List { role, paging }) => {
            let query = UserQuery {
                role,
                page: paging.page,
                limit: paging.limit,
            };
            pretty(&api.list_users(&query).await?.data)
        }
    }
}

fn open_session(api_url: Option<String>, state_dir: Option<PathBuf>) -> anyhow::Result<Session> {
    let mut config = ClientConfig::from_env().context("invalid client configuration")?;
    if let Some(api_url) = api_url {
        config.base_url = api_url;
    }
    let state_dir = match state_dir {
        Some(dir) => dir,
        None => default_state_dir().context("resolve state directory")?,
    };
    tracing::debug!(base_url = %config.base_url, state_dir = %state_dir.display(), "opening session");
    let store = credentials::file(state_dir, config.token_lifetimes);
    Session::connect(config, store).context("build session")
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
