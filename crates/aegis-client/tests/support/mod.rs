#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aegis_client::credentials;
use aegis_client::{
    ClientConfig, CredentialStore, HttpRequest, HttpResponse, HttpTransport, Session,
    TokenLifetimes, TransportError,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

pub const BASE_URL: &str = "http://aegis.test/api";

pub struct Reply {
    pub delay: Duration,
    pub outcome: Result<HttpResponse, TransportError>,
}

impl Reply {
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(HttpResponse::json(status, &body)),
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(HttpResponse::new(status, Vec::new())),
        }
    }

    pub fn unauthorized() -> Self {
        Self::json(
            StatusCode::UNAUTHORIZED,
            json!({ "success": false, "message": "Token expired" }),
        )
    }

    pub fn ok(data: Value) -> Self {
        Self::json(StatusCode::OK, json!({ "success": true, "data": data }))
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = dyn Fn(&HttpRequest) -> Reply + Send + Sync;

/// Answers every request through `handler` and records what was sent.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    log: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().expect("log").clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| path_of(request) == path)
            .count()
    }

    pub fn bearers_for(&self, path: &str) -> Vec<Option<String>> {
        self.requests()
            .iter()
            .filter(|request| path_of(request) == path)
            .map(|request| request.bearer.clone())
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.log.lock().expect("log").push(request.clone());
        let reply = (self.handler)(&request);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.outcome
    }
}

/// Request path relative to the API base, without the query string.
pub fn path_of(request: &HttpRequest) -> &str {
    let rest = request.url.strip_prefix(BASE_URL).unwrap_or(&request.url);
    rest.split('?').next().unwrap_or(rest)
}

pub fn token_pair(access: &str, refresh: &str) -> Value {
    json!({ "accessToken": access, "refreshToken": refresh })
}

pub fn memory_store() -> Arc<dyn CredentialStore> {
    credentials::memory(TokenLifetimes::default())
}

pub fn session_with(
    transport: Arc<ScriptedTransport>,
    store: Arc<dyn CredentialStore>,
) -> Session {
    session_with_config(ClientConfig::new(BASE_URL), transport, store)
}

pub fn session_with_config(
    config: ClientConfig,
    transport: Arc<ScriptedTransport>,
    store: Arc<dyn CredentialStore>,
) -> Session {
    Session::new(config, transport, store).expect("session")
}

/// Server double whose accepted access token changes on every renewal.
///
/// Renewal `n` (starting at 1) issues `AT{n+1}` / `RT{n+1}`.
pub struct RotatingServer {
    pub valid: Mutex<String>,
    pub renewals: AtomicUsize,
    pub refresh_delay: Duration,
}

impl RotatingServer {
    pub fn new(valid: &str, refresh_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            valid: Mutex::new(valid.to_string()),
            renewals: AtomicUsize::new(0),
            refresh_delay,
        })
    }

    pub fn revoke(&self) {
        *self.valid.lock().expect("valid") = "revoked".to_string();
    }

    pub fn handle(&self, request: &HttpRequest) -> Reply {
        if path_of(request) == "/auth/refresh" {
            let n = self.renewals.fetch_add(1, Ordering::SeqCst) + 2;
            let access = format!("AT{n}");
            *self.valid.lock().expect("valid") = access.clone();
            return Reply::ok(token_pair(&access, &format!("RT{n}"))).after(self.refresh_delay);
        }
        let valid = self.valid.lock().expect("valid").clone();
        if request.bearer.as_deref() == Some(valid.as_str()) {
            Reply::ok(json!({ "path": path_of(request) }))
        } else {
            Reply::unauthorized()
        }
    }
}
