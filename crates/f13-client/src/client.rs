//! Session-aware API client.
//!
//! Every call goes through two stages:
//!
//! 1. **Attach**: the access credential current at send time is attached as
//!    `Authorization: Bearer <token>`.
//! 2. **Continue**: a 401 on a request that has not been retried joins (or
//!    starts) the single in-flight refresh, then re-sends the request once
//!    with the new credential. A credential replaced since the request was
//!    sent is tried first; if that one is rejected too, the refresh still
//!    runs. The refresh is its own task and settles even when every waiter
//!    is dropped. When it fails the session is torn down inside the shared
//!    flight, so concurrent failures log out and redirect once.
//!
//! Any other failure is returned to the caller untouched.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, info, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, RefreshError, Result};
use crate::http::build_http_client;
use crate::navigator::{LogNavigator, LoginNavigator};
use crate::request::{ApiRequest, MultipartField, RequestBody};
use crate::session::SessionStore;
use crate::single_flight::{Role, SingleFlight};

type RefreshOutcome = std::result::Result<String, RefreshError>;

pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: Arc<SessionStore>,
    navigator: Arc<dyn LoginNavigator>,
    refresh: SingleFlight<RefreshOutcome>,
}

impl ApiClient {
    /// Create a client bound to `session`.
    pub fn new(config: ClientConfig, session: Arc<SessionStore>) -> Result<Self> {
        Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidRequest(format!("base URL `{}`: {e}", config.base_url)))?;

        let http = build_http_client(&config)?;
        Ok(Self {
            http,
            config,
            session,
            navigator: Arc::new(LogNavigator),
            refresh: SingleFlight::new(),
        })
    }

    /// Replace the navigator invoked when the session is torn down.
    pub fn with_navigator(mut self, navigator: Arc<dyn LoginNavigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Whether a refresh exchange is currently pending.
    pub fn refresh_in_flight(&self) -> bool {
        self.refresh.in_flight()
    }

    /// Send `request`, refreshing the session once on 401.
    ///
    /// Returns the successful response; non-success statuses become
    /// [`ClientError::Status`].
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn execute(&self, mut request: ApiRequest) -> Result<Response> {
        let (response, sent_with) = self.send(&request, None).await?;

        if response.status() != StatusCode::UNAUTHORIZED || !request.session_refresh() {
            return check_status(response).await;
        }

        if request.is_retried() {
            return Err(ClientError::Unauthorized {
                path: request.path.clone(),
            });
        }
        request.mark_retried();

        let (token, continuation) = self.continue_session(sent_with.as_deref()).await?;

        debug!("Retrying request with refreshed credential");
        let (mut response, _) = self.send(&request, Some(&token)).await?;
        if response.status() == StatusCode::UNAUTHORIZED && continuation == Continuation::Reused {
            debug!("Reused credential rejected as well; refreshing session");
            let token = self.join_refresh().await?;
            response = self.send(&request, Some(&token)).await?.0;
        }
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized {
                path: request.path.clone(),
            });
        }
        check_status(response).await
    }

    /// [`execute`](Self::execute) and decode the JSON body.
    pub async fn execute_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.execute(request).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute_json(ApiRequest::get(path)).await
    }

    /// Resolve a 401: reuse a credential replaced since the request was
    /// sent, otherwise wait for the shared refresh or start it.
    async fn continue_session(&self, sent_with: Option<&str>) -> Result<(String, Continuation)> {
        if !self.refresh.in_flight() {
            if let Some(current) = self.session.access_token() {
                if sent_with != Some(current.as_str()) {
                    debug!("Credential changed since the request was sent; reusing current one");
                    return Ok((current, Continuation::Reused));
                }
            }
        }

        let token = self.join_refresh().await?;
        Ok((token, Continuation::Refreshed))
    }

    async fn join_refresh(&self) -> Result<String> {
        let exchange = self.refresh_exchange();
        let on_abort = exchange.clone();
        let (flight, role) = self.refresh.acquire_or_join(
            move || exchange.run().in_current_span(),
            move |e| on_abort.fail(RefreshError::Aborted(e.to_string())),
        );
        match role {
            Role::Leader => info!("Access credential rejected; refreshing session"),
            Role::Follower => debug!("Joining in-flight session refresh"),
        }

        flight.await.map_err(ClientError::SessionExpired)
    }

    fn refresh_exchange(&self) -> RefreshExchange {
        RefreshExchange {
            http: self.http.clone(),
            url: self.endpoint(&self.config.refresh_path),
            login_route: self.config.login_route.clone(),
            timeout: self.config.refresh_timeout,
            session: Arc::clone(&self.session),
            navigator: Arc::clone(&self.navigator),
        }
    }

    /// Build and send one attempt. Returns the token that was attached.
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<(Response, Option<String>)> {
        let token = match bearer {
            Some(token) => Some(token.to_string()),
            None => self.session.access_token(),
        };
        let builder = self.build(request, token.as_deref())?;
        let response = builder.send().await?;
        Ok((response, token))
    }

    fn build(&self, request: &ApiRequest, token: Option<&str>) -> Result<reqwest::RequestBuilder> {
        let url = self
            .endpoint(&request.path)
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        let mut headers = self.config.headers.clone();
        for (name, value) in request.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(token) = token {
            headers.insert(header::AUTHORIZATION, bearer_value(token)?);
        }
        if request.body.derives_content_type() {
            headers.remove(header::CONTENT_TYPE);
        }

        let mut builder = self.http.request(request.method.clone(), url).headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(pairs) => builder.form(pairs),
            RequestBody::Multipart(fields) => builder.multipart(multipart_form(fields)?),
        };
        Ok(builder)
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, url::ParseError> {
        join_url(&self.config.base_url, path)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("session", &self.session)
            .field("refresh_in_flight", &self.refresh.in_flight())
            .finish_non_exhaustive()
    }
}

/// How a 401 was resolved before the retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Continuation {
    /// The session already held a newer credential.
    Reused,
    /// A refresh produced the credential.
    Refreshed,
}

/// Everything one refresh flight needs, owned so the flight is `'static`.
#[derive(Clone)]
struct RefreshExchange {
    http: reqwest::Client,
    url: std::result::Result<Url, url::ParseError>,
    login_route: String,
    timeout: Duration,
    session: Arc<SessionStore>,
    navigator: Arc<dyn LoginNavigator>,
}

impl RefreshExchange {
    async fn run(self) -> RefreshOutcome {
        let outcome = match self.session.refresh_token() {
            None => Err(RefreshError::NoRefreshCredential),
            Some(refresh_token) => {
                match tokio::time::timeout(self.timeout, self.exchange(&refresh_token)).await {
                    Ok(result) => result,
                    Err(_) => Err(RefreshError::Timeout),
                }
            }
        };

        match outcome {
            Ok(access_token) => {
                self.session.set_access_token(access_token.as_str());
                info!("Session refreshed");
                Ok(access_token)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Tear the session down and report `error` to every waiter.
    fn fail(&self, error: RefreshError) -> RefreshOutcome {
        warn!(error = %error, route = %self.login_route, "Session refresh failed; logging out");
        self.session.logout();
        self.navigator.redirect_to_login(&self.login_route);
        Err(error)
    }

    async fn exchange(&self, refresh_token: &str) -> RefreshOutcome {
        let url = self
            .url
            .clone()
            .map_err(|e| RefreshError::Transport(format!("invalid refresh URL: {e}")))?;

        let response = self
            .http
            .post(url)
            .header(header::ACCEPT, HeaderValue::from_static("application/json"))
            .bearer_auth(refresh_token)
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RefreshError::Malformed(e.to_string()))?;

        body.get("access_token")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or(RefreshError::MissingAccessToken)
    }
}

fn bearer_value(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| ClientError::InvalidRequest(format!("invalid bearer credential: {e}")))?;
    value.set_sensitive(true);
    Ok(value)
}

fn multipart_form(fields: &[MultipartField]) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for field in fields {
        form = match field {
            MultipartField::Text { name, value } => form.text(name.clone(), value.clone()),
            MultipartField::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let mut part =
                    reqwest::multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    part = part.mime_str(mime).map_err(|e| {
                        ClientError::InvalidRequest(format!("invalid mime type `{mime}`: {e}"))
                    })?;
                }
                form.part(name.clone(), part)
            }
        };
    }
    Ok(form)
}

/// Join `path` onto `base`, keeping the base path (`/api` + `/auth/me`).
pub(crate) fn join_url(base: &str, path: &str) -> std::result::Result<Url, url::ParseError> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Url::parse(path);
    }
    Url::parse(&format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}

/// Pass successful responses through; turn the rest into `Status` errors
/// carrying the backend's `{"error": "..."}` message when present.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body
            }
        });

    debug!(%status, %message, "Request failed");
    Err(ClientError::Status { status, message })
}
