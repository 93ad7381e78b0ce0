//! Login, logout and identity for one authenticated session.

use std::sync::Arc;

use reqwest::StatusCode;
use tokio::sync::broadcast;

use crate::api::AegisApi;
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::dispatcher::{ApiRequest, Dispatcher, RequestAuth};
use crate::error::{ClientError, Result};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{AuthResponse, LoginCredentials, MeBody, SessionUser, UserRole};

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const ME_PATH: &str = "/auth/me";

pub const DEMO_ACCESS_TOKEN: &str = "demo-token";
pub const DEMO_REFRESH_TOKEN: &str = "demo-refresh-token";
pub const DEFAULT_LOGIN_FAILURE: &str = "login failed, check email and password";

const EVENT_CAPACITY: usize = 32;

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { user_id: String },
    LoggedOut,
    /// Renewal failed and the credentials were dropped; the user has to sign
    /// in again.
    Expired { reason: String },
}

/// Handle to one authenticated session. Clones share state.
#[derive(Clone)]
pub struct Session {
    dispatcher: Dispatcher,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let dispatcher = Dispatcher::new(&config, transport, store, events.clone())?;
        Ok(Self { dispatcher, events })
    }

    /// Session over the default `reqwest` transport.
    pub fn connect(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        Self::new(config, Arc::new(ReqwestTransport::new()), store)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn api(&self) -> AegisApi {
        AegisApi::new(self.dispatcher.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn store(&self) -> &Arc<dyn CredentialStore> {
        self.dispatcher.store()
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<SessionUser> {
        let request = ApiRequest::post(LOGIN_PATH)
            .auth(RequestAuth::Anonymous)
            .json(credentials)?;
        let response = match self.dispatcher.send(request).await {
            Ok(response) => response,
            Err(ClientError::Http { status, body }) if is_credential_rejection(status) => {
                tracing::info!(email = %credentials.email, %status, "login rejected");
                return Err(ClientError::Auth {
                    message: server_message(&body)
                        .unwrap_or_else(|| DEFAULT_LOGIN_FAILURE.to_string()),
                });
            }
            Err(error) => return Err(error),
        };

        let auth: AuthResponse = response.data()?;
        let store = self.store();
        store.set_tokens(&auth.access_token, &auth.refresh_token)?;
        store.cache_user(&auth.user)?;
        tracing::info!(user_id = %auth.user.id, role = %auth.user.role, "logged in");
        let _ = self.events.send(SessionEvent::LoggedIn {
            user_id: auth.user.id.clone(),
        });
        Ok(auth.user)
    }

    /// Signs in with the fixed demo identity, without contacting the API.
    pub fn demo_login(&self) -> Result<SessionUser> {
        let user = demo_user();
        let store = self.store();
        store.set_tokens(DEMO_ACCESS_TOKEN, DEMO_REFRESH_TOKEN)?;
        store.cache_user(&user)?;
        tracing::info!(user_id = %user.id, "logged in with demo account");
        let _ = self.events.send(SessionEvent::LoggedIn {
            user_id: user.id.clone(),
        });
        Ok(user)
    }

    /// Notifies the server when any credential is held, then always drops
    /// local credentials. An expired access token is renewed first so the
    /// server can revoke the refresh token it issued.
    pub async fn logout(&self) {
        let store = self.store();
        if store.access_token().is_some() || store.refresh_token().is_some() {
            let request = ApiRequest::post(LOGOUT_PATH);
            if let Err(error) = self.dispatcher.send(request).await {
                tracing::warn!(error = %error, "logout notification failed");
            }
        }
        if let Err(error) = store.clear() {
            tracing::warn!(error = %error, "failed to clear credentials on logout");
        }
        tracing::info!("logged out");
        let _ = self.events.send(SessionEvent::LoggedOut);
    }

    /// Asks the server who we are. Any failure yields `None`; the caller
    /// decides whether to send the user back to login.
    pub async fn current_user(&self) -> Option<SessionUser> {
        let user = match self.fetch_me().await {
            Ok(user) => user,
            Err(error) => {
                tracing::debug!(error = %error, "identity check failed");
                return None;
            }
        };
        if let Err(error) = self.store().cache_user(&user) {
            tracing::warn!(error = %error, "failed to cache user");
        }
        Some(user)
    }

    async fn fetch_me(&self) -> Result<SessionUser> {
        let response = self.dispatcher.send(ApiRequest::get(ME_PATH)).await?;
        response.data::<MeBody>().map(MeBody::into_user)
    }

    pub fn stored_user(&self) -> Option<SessionUser> {
        self.store().cached_user()
    }

    /// True when an access token is held. Says nothing about whether the
    /// server still accepts it.
    pub fn is_authenticated(&self) -> bool {
        self.store().access_token().is_some()
    }
}

pub fn demo_user() -> SessionUser {
    SessionUser {
        id: "1".to_string(),
        name: "Admin Demo".to_string(),
        email: "admin@demo.com".to_string(),
        role: UserRole::Admin,
        avatar: None,
    }
}

fn is_credential_rejection(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::UNPROCESSABLE_ENTITY
    )
}

/// Pulls `message` (or FastAPI's `detail`) out of an error body.
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "detail"]
        .iter()
        .find_map(|key| value.get(key).and_then(serde_json::Value::as_str))
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}
