//! Authenticated request dispatch with one transparent replay after renewal.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::{ClientConfig, normalize_base_url};
use crate::credentials::CredentialStore;
use crate::error::{ClientError, Result, format_http_error};
use crate::refresh::{REFRESH_PATH, RefreshCoordinator};
use crate::session::SessionEvent;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::types::Envelope;

/// How a request presents credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestAuth {
    /// Attach the access token; a first 401 triggers renewal and one replay.
    #[default]
    Bearer,
    /// Attach the access token but surface a 401 as-is.
    BearerNoRefresh,
    /// Never attach a token (login, renewal).
    Anonymous,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub auth: RequestAuth,
    attempt: u8,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            auth: RequestAuth::default(),
            attempt: 0,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|error| ClientError::Decode {
            message: error.to_string(),
        })?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn auth(mut self, auth: RequestAuth) -> Self {
        self.auth = auth;
        self
    }

    /// 0 for the original send, 1 for the replay after renewal.
    pub fn attempt(&self) -> u8 {
        self.attempt
    }

    fn replay(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T>(&self) -> Result<T>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        serde_json::from_slice(&self.body).map_err(|error| ClientError::Decode {
            message: error.to_string(),
        })
    }

    /// Decodes the payload, unwrapping a `{ data }` envelope when present.
    pub fn data<T>(&self) -> Result<T>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        self.json::<Envelope<T>>().map(Envelope::into_inner)
    }
}

impl From<HttpResponse> for ApiResponse {
    fn from(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            body: response.body,
        }
    }
}

/// Cloneable handle to one session's request pipeline.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    base_url: String,
    request_timeout: Duration,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn CredentialStore>,
    coordinator: RefreshCoordinator,
}

impl Dispatcher {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let coordinator = RefreshCoordinator::new(
            format!("{base_url}{REFRESH_PATH}"),
            config.refresh_timeout,
            transport.clone(),
            store.clone(),
            events,
        );
        Ok(Self {
            inner: Arc::new(DispatcherInner {
                base_url,
                request_timeout: config.request_timeout,
                transport,
                store,
                coordinator,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.inner.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.inner.base_url, trimmed))
        }
    }

    /// Sends `request`, renewing the access token once on a first 401.
    ///
    /// Non-2xx answers become `ClientError::Http`; a 401 on the replay is
    /// `ClientError::UnrecoverableSession`.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let token = match request.auth {
            RequestAuth::Anonymous => None,
            RequestAuth::Bearer | RequestAuth::BearerNoRefresh => self.inner.store.access_token(),
        };
        let response = self.transmit(&request, token.clone()).await?;
        if response.status != StatusCode::UNAUTHORIZED || request.auth != RequestAuth::Bearer {
            return finish(response);
        }
        if request.attempt() > 0 {
            tracing::warn!(path = %request.path, "unauthorized after replay");
            return Err(ClientError::UnrecoverableSession);
        }

        tracing::debug!(path = %request.path, "unauthorized, renewing access token");
        let fresh = self.inner.coordinator.fresh_token(token.as_deref()).await?;
        let replay = request.replay();
        let response = self.transmit(&replay, Some(fresh)).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            tracing::warn!(path = %replay.path, "unauthorized after replay");
            return Err(ClientError::UnrecoverableSession);
        }
        finish(response)
    }

    async fn transmit(&self, request: &ApiRequest, bearer: Option<String>) -> Result<HttpResponse> {
        let url = self.resolve_url(request)?;
        tracing::debug!(
            method = %request.method,
            url = %url,
            attempt = request.attempt(),
            authenticated = bearer.is_some(),
            "dispatching request"
        );
        let http_request = HttpRequest {
            method: request.method,
            url,
            bearer,
            body: request.body.clone(),
            timeout: self.inner.request_timeout,
        };
        self.inner
            .transport
            .execute(http_request)
            .await
            .map_err(|error| ClientError::Transport {
                message: error.message,
            })
    }

    fn resolve_url(&self, request: &ApiRequest) -> Result<String> {
        let endpoint = self
            .endpoint(&request.path)
            .ok_or(ClientError::InvalidPath)?;
        if request.query.is_empty() {
            return Ok(endpoint);
        }
        url::Url::parse_with_params(&endpoint, &request.query)
            .map(String::from)
            .map_err(|_| ClientError::InvalidPath)
    }
}

fn finish(response: HttpResponse) -> Result<ApiResponse> {
    if response.status.is_success() {
        Ok(response.into())
    } else {
        Err(format_http_error(response.status, &response.body))
    }
}
