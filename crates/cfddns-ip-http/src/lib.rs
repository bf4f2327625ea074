// # HTTP IP Source
//
// This crate provides the public-IP resolver for the DDNS daemon.
//
// ## Purpose
//
// A NAT'd host cannot see its public address on any interface, so the
// address is asked from an external echo service that answers a plain
// `GET` with the caller's IP as the body (e.g. `https://v4.ident.me/`).
//
// ## Architecture
//
// One request per `current()` call. No caching and no retry: the engine
// polls on its own schedule and treats every failure here as a skipped
// cycle.

use cfddns_core::traits::IpSource;
use cfddns_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Request timeout for the echo service
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-based IP source
#[derive(Debug, Clone)]
pub struct HttpIpSource {
    /// URL to fetch IP from
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a new HTTP IP source
    ///
    /// # Parameters
    ///
    /// - `url`: Echo service (e.g., "https://v4.ident.me/")
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// Create with a custom request timeout
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// The configured echo service
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl IpSource for HttpIpSource {
    async fn current(&self) -> Result<IpAddr> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::network(format!("Request to {} timed out", self.url))
            } else {
                Error::network(format!("Request to {} failed: {}", self.url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(format!(
                "{} answered HTTP {}",
                self.url, status
            )));
        }

        let body = response.text().await.map_err(|e| {
            Error::network(format!("Failed to read response from {}: {}", self.url, e))
        })?;

        let ip_text = body.trim();
        let ip: IpAddr = ip_text.parse().map_err(|_| {
            Error::network(format!(
                "{} answered '{}', which is not an IP address",
                self.url, ip_text
            ))
        })?;

        tracing::debug!("Public IP according to {}: {}", self.url, ip);
        Ok(ip)
    }

    fn source_name(&self) -> &str {
        &self.url
    }
}
