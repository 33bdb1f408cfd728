//! Authentication endpoints that create and inspect sessions.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::captcha::CaptchaSolution;
use crate::client::ApiClient;
use crate::error::Result;
use crate::request::ApiRequest;
use crate::session::{UserPatch, UserSummary};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const ME_PATH: &str = "/auth/me";

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Body returned by login and registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: UserSummary,
    pub access_token: String,
    pub refresh_token: String,
}

impl ApiClient {
    /// Log in and store the new session.
    ///
    /// A 401 here means bad credentials, so the request bypasses the
    /// refresh protocol and the error reaches the caller as
    /// [`ClientError::Status`](crate::ClientError::Status).
    #[instrument(skip(self, password, captcha))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        captcha: Option<&CaptchaSolution>,
    ) -> Result<UserSummary> {
        let payload = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.authenticate(LOGIN_PATH, &payload, captcha).await
    }

    /// Create an account and store the new session.
    #[instrument(skip(self, password, captcha))]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        captcha: Option<&CaptchaSolution>,
    ) -> Result<UserSummary> {
        let payload = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.authenticate(REGISTER_PATH, &payload, captcha).await
    }

    /// Fetch the current user and merge it into the session.
    pub async fn me(&self) -> Result<UserSummary> {
        let user: UserSummary = self.get_json(ME_PATH).await?;
        self.session().update_user(UserPatch::from(user.clone()));
        Ok(user)
    }

    /// Drop the local session. The backend keeps no server-side session.
    pub fn logout(&self) {
        self.session().logout();
        info!("Logged out");
    }

    async fn authenticate<T: Serialize>(
        &self,
        path: &str,
        payload: &T,
        captcha: Option<&CaptchaSolution>,
    ) -> Result<UserSummary> {
        let request = match captcha {
            Some(solution) => ApiRequest::post(path).json(&solution.attach(payload)?)?,
            None => ApiRequest::post(path).json(payload)?,
        };

        let auth: AuthResponse = self
            .execute_json(request.without_session_refresh())
            .await?;

        self.session().set_auth(
            Some(auth.user.clone()),
            auth.access_token,
            auth.refresh_token,
        );
        info!(username = %auth.user.username, "Session established");
        Ok(auth.user)
    }
}
