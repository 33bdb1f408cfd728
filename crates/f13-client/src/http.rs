use std::sync::OnceLock;
use std::time::Duration;

use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientError;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the transport used for every API call, refresh included.
pub fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client, ClientError> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connect_timeout);

    if config.timeout > Duration::ZERO {
        builder = builder.timeout(config.timeout);
    }

    Ok(builder.build()?)
}
