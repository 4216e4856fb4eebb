use std::time::Duration;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::de::DeserializeOwned;

use crate::rails::RailError;

/// Thin JSON-over-HTTP client shared by the chain explorer integrations.
///
/// Every request is bounded by the client timeout. Transport failures, timeouts and non-success responses are all
/// reported as [`RailError::UpstreamUnavailable`] so that the poller simply retries on its next tick.
#[derive(Clone)]
pub struct ExplorerClient {
    name: &'static str,
    base_url: String,
    client: Client,
}

impl ExplorerClient {
    pub fn new(name: &'static str, base_url: &str, timeout: Duration) -> Result<Self, RailError> {
        Self::with_headers(name, base_url, timeout, HeaderMap::new())
    }

    /// Creates a client that sends an API key in the given header with every request.
    pub fn with_api_key(
        name: &'static str,
        base_url: &str,
        timeout: Duration,
        header: &'static str,
        api_key: &str,
    ) -> Result<Self, RailError> {
        let mut headers = HeaderMap::with_capacity(1);
        if !api_key.is_empty() {
            let val = HeaderValue::from_str(api_key)
                .map_err(|e| RailError::UpstreamUnavailable(format!("{name}: invalid API key header. {e}")))?;
            headers.insert(header, val);
        }
        Self::with_headers(name, base_url, timeout, headers)
    }

    fn with_headers(name: &'static str, base_url: &str, timeout: Duration, headers: HeaderMap) -> Result<Self, RailError> {
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RailError::UpstreamUnavailable(format!("{name}: could not build HTTP client. {e}")))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self { name, base_url, client })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RailError> {
        let url = self.url(path);
        trace!("🛰️ {} GET {url}", self.name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RailError::UpstreamUnavailable(format!("{} request to {url} failed. {e}", self.name)))?;
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| {
                RailError::MalformedSignal(format!("{} returned an unexpected response from {url}. {e}", self.name))
            })
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            debug!("🛰️ {} GET {url} returned {status}: {message}", self.name);
            Err(RailError::UpstreamUnavailable(format!("{} returned HTTP {status} for {url}", self.name)))
        }
    }
}
