//! HTTP implementation of the header-fetch capability.

use async_trait::async_trait;
use http::HeaderMap;
use reqwest::Client;
use tracing::debug;

use super::HeaderFetcher;
use crate::config::{GlacierConfig, MastodonConfig};
use crate::{Error, Result};

const USER_AGENT: &str = concat!("glacier/", env!("CARGO_PKG_VERSION"));

/// Fetches response headers with `HEAD` requests on a shared `reqwest` client.
///
/// An error status is a failed fetch: a missing or broken page is never evidence that it may
/// be framed.
#[derive(Clone)]
pub struct HttpHeaderFetcher {
    client: Client,
}

impl HttpHeaderFetcher {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client with the configured timeouts.
    pub fn from_config(mastodon: &MastodonConfig, glacier: &GlacierConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(mastodon.connect_timeout())
            .timeout(glacier.embed_check_timeout())
            .danger_accept_invalid_certs(glacier.dev_mode)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl HeaderFetcher for HttpHeaderFetcher {
    async fn fetch_headers(&self, url: &str) -> Result<HeaderMap> {
        let fetch_error = |e: reqwest::Error| Error::HeaderFetch {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(fetch_error)?
            .error_for_status()
            .map_err(fetch_error)?;

        debug!(url = %url, status = %response.status(), "Fetched response headers");
        Ok(response.headers().clone())
    }
}
