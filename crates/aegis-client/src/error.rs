//! Client error types.

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;
use crate::credentials::StoreError;

/// Failure of the token renewal exchange.
///
/// Cloned into every request parked behind the renewal, so it carries only
/// owned strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("refresh_token_missing")]
    MissingRefreshToken,
    #[error("refresh_rejected_{status}:{body}")]
    Rejected { status: StatusCode, body: String },
    #[error("refresh_request_failed:{message}")]
    Transport { message: String },
    #[error("refresh_json_decode_failed:{message}")]
    Decode { message: String },
    #[error("refresh_store_failed:{message}")]
    Store { message: String },
    #[error("refresh_timed_out")]
    TimedOut,
    #[error("refresh_abandoned")]
    Abandoned,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("aegis_config_invalid:{0}")]
    Config(#[from] ConfigError),
    #[error("aegis_invalid_path")]
    InvalidPath,
    #[error("aegis_auth_failed:{message}")]
    Auth { message: String },
    #[error("aegis_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("aegis_refresh_failed:{0}")]
    Refresh(#[from] RefreshError),
    #[error("aegis_session_unrecoverable")]
    UnrecoverableSession,
    #[error("aegis_request_failed:{message}")]
    Transport { message: String },
    #[error("aegis_json_decode_failed:{message}")]
    Decode { message: String },
    #[error("aegis_store_failed:{0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Refresh(RefreshError::Rejected { status, .. }) => Some(*status),
            Self::UnrecoverableSession => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    /// True when the error ended the session and the caller should return to login.
    pub fn is_session_terminal(&self) -> bool {
        matches!(self, Self::Refresh(_) | Self::UnrecoverableSession)
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> ClientError {
    ClientError::Http {
        status,
        body: body_text(body),
    }
}

pub(crate) fn body_text(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        "<empty>".to_string()
    } else {
        text
    }
}
