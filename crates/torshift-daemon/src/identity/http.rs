//! HTTP probe routed through the local proxy.

use reqwest::Proxy;
use serde_json::Value;
use tracing::debug;

use torshift_core::{ProbeConfig, ProxyEndpoint};

use super::{AddressProbe, ProbeError};

/// Probe that GETs a JSON echo endpoint through the proxy.
///
/// The underlying `reqwest::Client` keeps its connection pool for the whole
/// process, so every verification reuses one session.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: reqwest::Client,
    url: String,
    address_field: String,
}

impl HttpProbe {
    /// Build a probe client that sends every request through `proxy`.
    pub fn new(proxy: &ProxyEndpoint, config: &ProbeConfig) -> Result<Self, ProbeError> {
        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .proxy(Proxy::all(proxy.to_string())?)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            url: config.url.clone(),
            address_field: config.address_field.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AddressProbe for HttpProbe {
    async fn fetch_address(&self) -> Result<String, ProbeError> {
        debug!(url = %self.url, "GET probe endpoint");
        let resp = self.http.get(&self.url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        extract_address(&body, &self.address_field)
    }
}

/// Pull the address out of a JSON body such as `{"origin": "203.0.113.9"}`.
pub fn extract_address(body: &str, field: &str) -> Result<String, ProbeError> {
    let value: Value = serde_json::from_str(body).map_err(|e| ProbeError::Decode(e.to_string()))?;
    value
        .get(field)
        .and_then(Value::as_str)
        .map(|addr| addr.trim().to_string())
        .filter(|addr| !addr.is_empty())
        .ok_or_else(|| ProbeError::MissingField(field.to_string()))
}
