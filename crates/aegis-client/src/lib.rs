//! Session-aware client for the AEGIS K3 safety-management API.
//!
//! The crate is organised around a single authenticated session:
//! - a credential store holding the access/refresh token pair and the cached user
//! - a request dispatcher attaching bearer credentials to every call
//! - a refresh coordinator that renews an expired access token at most once,
//!   parking concurrent failures until the renewal settles
//! - typed wrappers for the inspection, incident, permit and user endpoints

pub mod api;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod refresh;
pub mod session;
pub mod stats;
pub mod transport;
pub mod types;

pub use api::AegisApi;
pub use config::{ClientConfig, ConfigError, TokenLifetimes};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError};
pub use dispatcher::{ApiRequest, ApiResponse, Dispatcher, RequestAuth};
pub use error::{ClientError, RefreshError, Result};
pub use refresh::RefreshCoordinator;
pub use session::{Session, SessionEvent};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use types::{AuthResponse, LoginCredentials, SessionUser, TokenPair, UserRole};
