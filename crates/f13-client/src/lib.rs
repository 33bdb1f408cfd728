//! Session-aware client for the f13 platform API.
//!
//! - [`SessionStore`]: persisted authentication state (user, access and
//!   refresh credentials) behind a [`SessionPersistence`] port
//! - [`ApiClient`]: attaches the bearer credential to every request and
//!   recovers from expired credentials with a single de-duplicated refresh
//! - [`CaptchaFlow`]: challenge/response flow for actions gated by a CAPTCHA
//!
//! ```no_run
//! use std::sync::Arc;
//! use f13_client::{ApiClient, ClientConfig, FilePersistence, SessionStore};
//!
//! # async fn run() -> Result<(), f13_client::ClientError> {
//! let config = ClientConfig::builder().base_url("https://f13.example/api").build();
//! let session = Arc::new(SessionStore::open(
//!     config.storage_key.clone(),
//!     Arc::new(FilePersistence::new("/tmp/f13")),
//! ));
//! let client = ApiClient::new(config, session)?;
//! let me = client.me().await?;
//! println!("logged in as {}", me.username);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod captcha;
mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod navigator;
pub mod request;
pub mod session;
pub mod single_flight;

pub use auth::AuthResponse;
pub use captcha::{
    CaptchaChallenge, CaptchaConfig, CaptchaFlow, CaptchaOutcome, CaptchaSolution, Verification,
};
pub use client::ApiClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ClientError, RefreshError};
pub use navigator::{LogNavigator, LoginNavigator};
pub use request::{ApiRequest, MultipartField, RequestBody};
pub use session::{
    FilePersistence, MemoryPersistence, Session, SessionPersistence, SessionStore, UserPatch,
    UserSummary, VerificationType,
};
pub use single_flight::SingleFlight;
