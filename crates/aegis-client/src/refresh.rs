//! Single-flight access token renewal.
//!
//! The first request to see a 401 becomes the leader and performs the one
//! `/auth/refresh` exchange. Requests that fail while the exchange is in
//! flight park a oneshot waiter and receive the leader's outcome, in arrival
//! order, once it settles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};

use crate::credentials::CredentialStore;
use crate::error::{RefreshError, body_text};
use crate::session::SessionEvent;
use crate::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::types::{Envelope, RefreshRequest, TokenPair};

pub const REFRESH_PATH: &str = "/auth/refresh";

type Waiter = oneshot::Sender<Result<String, RefreshError>>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

enum Role {
    Leader,
    Follower(oneshot::Receiver<Result<String, RefreshError>>),
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    refresh_url: String,
    timeout: Duration,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn CredentialStore>,
    events: broadcast::Sender<SessionEvent>,
    state: Mutex<RefreshState>,
    exchanges: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        refresh_url: String,
        timeout: Duration,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                refresh_url,
                timeout,
                transport,
                store,
                events,
                state: Mutex::new(RefreshState::Idle),
                exchanges: AtomicU64::new(0),
            }),
        }
    }

    /// True while an exchange is outstanding.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Number of `/auth/refresh` exchanges started by this coordinator.
    pub fn exchanges(&self) -> u64 {
        self.inner.exchanges.load(Ordering::SeqCst)
    }

    /// Returns an access token newer than `stale`.
    ///
    /// `stale` is the token the failed request carried. If the store already
    /// holds a different token, a concurrent renewal has finished and that
    /// token is returned without another exchange.
    pub async fn fresh_token(&self, stale: Option<&str>) -> Result<String, RefreshError> {
        let role = {
            let mut state = self.inner.lock_state();
            let parked = match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                RefreshState::Idle => None,
            };
            match parked {
                Some(rx) => Role::Follower(rx),
                None => {
                    if let Some(current) = self.inner.store.access_token() {
                        if stale != Some(current.as_str()) {
                            return Ok(current);
                        }
                    }
                    *state = RefreshState::Refreshing {
                        waiters: Vec::new(),
                    };
                    Role::Leader
                }
            }
        };

        match role {
            Role::Follower(rx) => {
                tracing::debug!("access token renewal in flight, waiting");
                rx.await.unwrap_or(Err(RefreshError::Abandoned))
            }
            Role::Leader => {
                let guard = SettleGuard {
                    inner: self.inner.as_ref(),
                    armed: true,
                };
                let outcome = self.inner.exchange().await;
                guard.settle(outcome)
            }
        }
    }
}

impl CoordinatorInner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resets to idle and hands back whoever was waiting.
    fn take_waiters(&self) -> Vec<Waiter> {
        match std::mem::replace(&mut *self.lock_state(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        }
    }

    async fn exchange(&self) -> Result<String, RefreshError> {
        let Some(refresh_token) = self.store.refresh_token() else {
            return Err(RefreshError::MissingRefreshToken);
        };
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        tracing::info!("renewing access token");

        let body = serde_json::to_value(RefreshRequest {
            refresh_token: refresh_token.as_str(),
        })
        .map_err(|error| RefreshError::Decode {
            message: error.to_string(),
        })?;
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.refresh_url.clone(),
            bearer: None,
            body: Some(body),
            timeout: self.timeout,
        };

        let response = match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
            Err(_) => return Err(RefreshError::TimedOut),
            Ok(Err(error)) if error.timed_out => return Err(RefreshError::TimedOut),
            Ok(Err(error)) => {
                return Err(RefreshError::Transport {
                    message: error.message,
                });
            }
            Ok(Ok(response)) => response,
        };
        if !response.status.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status,
                body: body_text(&response.body),
            });
        }

        let pair = serde_json::from_slice::<Envelope<TokenPair>>(&response.body)
            .map_err(|error| RefreshError::Decode {
                message: error.to_string(),
            })?
            .into_inner();
        self.store
            .set_tokens(&pair.access_token, &pair.refresh_token)
            .map_err(|error| RefreshError::Store {
                message: error.to_string(),
            })?;
        Ok(pair.access_token)
    }

    fn fail_closed(&self, error: &RefreshError) {
        tracing::warn!(error = %error, "access token renewal failed, clearing session");
        if let Err(store_error) = self.store.clear() {
            tracing::warn!(error = %store_error, "failed to clear credentials");
        }
    }
}

/// Guarantees the coordinator returns to idle even if the leader's future is
/// dropped mid-exchange.
struct SettleGuard<'a> {
    inner: &'a CoordinatorInner,
    armed: bool,
}

impl SettleGuard<'_> {
    fn settle(mut self, outcome: Result<String, RefreshError>) -> Result<String, RefreshError> {
        self.armed = false;
        if let Err(error) = &outcome {
            self.inner.fail_closed(error);
        }

        let waiters = self.inner.take_waiters();
        tracing::debug!(waiters = waiters.len(), ok = outcome.is_ok(), "access token renewal settled");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }

        if let Err(error) = &outcome {
            let _ = self.inner.events.send(SessionEvent::Expired {
                reason: error.to_string(),
            });
        }
        outcome
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let waiters = self.inner.take_waiters();
        tracing::warn!(waiters = waiters.len(), "access token renewal abandoned");
        for waiter in waiters {
            let _ = waiter.send(Err(RefreshError::Abandoned));
        }
    }
}
