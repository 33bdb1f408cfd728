//! Client error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Why a shared credential refresh failed.
///
/// This is `Clone` because one refresh outcome is handed to every request
/// that joined the same in-flight refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The session holds no refresh credential; re-login required.
    #[error("No refresh token available")]
    NoRefreshCredential,

    /// The refresh call never produced a response.
    #[error("refresh request failed: {0}")]
    Transport(String),

    /// The refresh endpoint answered with a non-success status.
    #[error("refresh endpoint returned HTTP {0}")]
    Status(u16),

    /// The refresh response body was not JSON.
    #[error("malformed refresh response: {0}")]
    Malformed(String),

    /// The refresh response carried no usable `access_token`.
    #[error("No access token in refresh response")]
    MissingAccessToken,

    /// The refresh call did not settle within the configured timeout.
    #[error("refresh request timed out")]
    Timeout,

    /// The refresh task panicked or was cancelled before settling.
    #[error("refresh task aborted: {0}")]
    Aborted(String),
}

/// Errors returned by [`ApiClient`](crate::ApiClient) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be built (bad path, bad header value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport failure before any response arrived.
    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    /// Non-success response that the session protocol does not handle.
    #[error("request failed with HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    /// A request that was already retried after a refresh got 401 again.
    #[error("request to {path} is still unauthorized after refreshing the session")]
    Unauthorized { path: String },

    /// The session could not be continued and has been torn down.
    #[error("session expired: {0}")]
    SessionExpired(#[source] RefreshError),

    /// Response body did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session persistence failed.
    #[error("session persistence error: {0}")]
    Persistence(String),

    /// CAPTCHA flow misuse or rejection.
    #[error("captcha error: {0}")]
    Captcha(String),
}

impl ClientError {
    /// Check if this error means the user has to log in again.
    pub fn requires_relogin(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::Unauthorized { .. })
    }

    /// Check if this error is transient and the call may be repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::Network { source } => source.status(),
            _ => None,
        }
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
