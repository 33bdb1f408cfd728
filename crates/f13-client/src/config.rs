use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";
pub const DEFAULT_STORAGE_KEY: &str = "f13-auth";
pub const DEFAULT_USER_AGENT: &str = concat!("f13-client/", env!("CARGO_PKG_VERSION"));

/// Configurable options for [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every request path is joined onto, e.g. `https://host/api`.
    pub base_url: String,

    /// Path of the refresh-credential exchange, relative to `base_url`.
    pub refresh_path: String,

    /// Route handed to the login navigator when the session is torn down.
    pub login_route: String,

    /// Key the serialized session is persisted under.
    pub storage_key: String,

    /// Overall timeout for ordinary requests. Zero disables it.
    pub timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Upper bound for one refresh exchange. A refresh that does not settle
    /// in time fails the whole flight and every request waiting on it.
    pub refresh_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Headers sent with every request. `Content-Type` is dropped for
    /// multipart bodies.
    pub headers: HeaderMap,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            refresh_path: DEFAULT_REFRESH_PATH.to_owned(),
            login_route: DEFAULT_LOGIN_ROUTE.to_owned(),
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            refresh_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: ClientConfig::get_default_headers(),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );

        default_headers
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.config.refresh_path = path.into();
        self
    }

    pub fn login_route(mut self, route: impl Into<String>) -> Self {
        self.config.login_route = route.into();
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.config.storage_key = key.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.config.refresh_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a header; custom headers take precedence over defaults.
    pub fn header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.refresh_path, "/auth/refresh");
        assert_eq!(config.login_route, "/login");
        assert_eq!(config.storage_key, "f13-auth");
        assert_eq!(
            config.headers.get(reqwest::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::builder()
            .base_url("http://127.0.0.1:9000/api")
            .refresh_timeout(Duration::from_millis(250))
            .header(
                reqwest::header::ACCEPT_LANGUAGE,
                HeaderValue::from_static("uk"),
            )
            .build();

        assert_eq!(config.base_url, "http://127.0.0.1:9000/api");
        assert_eq!(config.refresh_timeout, Duration::from_millis(250));
        assert_eq!(
            config.headers.get(reqwest::header::ACCEPT_LANGUAGE).unwrap(),
            "uk"
        );
        assert!(config.headers.contains_key(reqwest::header::ACCEPT));
    }
}
