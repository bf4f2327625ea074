// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare API v4 client for the DDNS daemon.
//
// ## Scope
//
// - ✅ One HTTP request per trait call
// - ✅ Full error propagation to the engine (engine decides what to retry)
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ A and AAAA records
// - ✅ Zone and record lookup with ambiguity detection
// - ❌ NO retry or backoff (owned by DdnsEngine)
// - ❌ NO id caching (owned by DdnsEngine)
// - ❌ NO background tasks
//
// ### Trust Level: Untrusted (DNS Provider)
//
// See the `DnsProvider` trait in `cfddns-core` for the capability list.
//
// ## Security Requirements
//
// - API key NEVER appears in logs or Debug output
// - Auth headers are built from the credentials on every request
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...&status=active`
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=...&name=...`
// - DNS Record Details: GET `/zones/:zone_id/dns_records/:record_id`
// - Overwrite DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use cfddns_core::config::{Credentials, RecordTarget, Settings};
use cfddns_core::traits::{DnsProvider, DnsProviderFactory};
use cfddns_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER_NAME: &str = "cloudflare";

/// Uniform response wrapper of the v4 API
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,

    result: Option<T>,

    #[serde(default)]
    errors: Vec<ApiMessage>,

    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,

    #[serde(default)]
    message: String,

    #[serde(default)]
    error_chain: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,

    #[serde(default)]
    content: String,
}

/// Render API errors as `(code) message` lines, each followed by its
/// `error_chain` entries
fn describe_errors(errors: &[ApiMessage]) -> String {
    let mut lines = Vec::new();
    for error in errors {
        lines.push(format!("({}) {}", error.code, error.message));
        for cause in &error.error_chain {
            lines.push(format!("\t- ({}) {}", cause.code, cause.message));
        }
    }
    lines.join("\n")
}

/// Cloudflare DNS provider bound to one record
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API key.
pub struct CloudflareProvider {
    /// The record kept in sync
    target: RecordTarget,

    /// Account credentials
    /// ⚠️ NEVER log the key
    credentials: Credentials,

    /// API base URL (overridable for tests)
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("target", &self.target)
            .field("email", &self.credentials.email)
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a provider against the public API
    ///
    /// # Errors
    ///
    /// `Error::Config` if the credentials are unusable.
    pub fn new(target: RecordTarget, credentials: Credentials) -> Result<Self> {
        Self::with_base_url(target, credentials, CLOUDFLARE_API_BASE)
    }

    /// Create a provider against another API root
    pub fn with_base_url(
        target: RecordTarget,
        credentials: Credentials,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        credentials.validate()?;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            target,
            credentials,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// The fixed header set sent with every request, one value per name
    fn headers(&self) -> Result<HeaderMap> {
        let value = |name: &str, raw: &str| {
            HeaderValue::from_str(raw).map_err(|_| {
                Error::config(format!(
                    "[Cloudflare] {} contains characters not allowed in an HTTP header",
                    name
                ))
            })
        };

        let mut key = value("api-key", &self.credentials.api_key)?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-auth-email"),
            value("mail", &self.credentials.email)?,
        );
        headers.insert(HeaderName::from_static("x-auth-key"), key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Attach the header set, send, and decode the envelope
    ///
    /// # Returns
    ///
    /// - `Ok(Envelope)`: HTTP status < 304 and `success == true`
    /// - `Err(Error::Network)`: Transport failure or timeout
    /// - `Err(Error::Provider)`: Any other answer
    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        action: &str,
    ) -> Result<Envelope<T>> {
        // `headers` replaces what `.json()` already set instead of appending
        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::network(format!("{}: request timed out", action))
                } else {
                    Error::network(format!("{}: HTTP request failed: {}", action, e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("{}: failed to read response: {}", action, e)))?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if status.as_u16() >= 304 => {
                return Err(Error::provider(
                    PROVIDER_NAME,
                    format!("{}: HTTP {}: {}", action, status, body.trim()),
                ));
            }
            Err(e) => {
                return Err(Error::provider(
                    PROVIDER_NAME,
                    format!("{}: unexpected response: {}", action, e),
                ));
            }
        };

        if status.as_u16() >= 304 || !envelope.success {
            let message = if envelope.errors.is_empty() {
                format!("HTTP {}", status)
            } else {
                describe_errors(&envelope.errors)
            };
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("{} failed:\n{}", action, message),
            ));
        }

        Ok(envelope)
    }

    /// Exactly one match, or NotFound / Ambiguous
    fn single<T>(envelope: Envelope<Vec<T>>, what: &str) -> Result<T> {
        let total = envelope.result_info.and_then(|info| info.total_count);
        let mut matches = envelope.result.unwrap_or_default();

        if matches.len() > 1 || total.is_some_and(|count| count > 1) {
            return Err(Error::ambiguous(format!(
                "{} matches {} resources, expected exactly one",
                what,
                total.unwrap_or(matches.len() as u64)
            )));
        }

        matches
            .pop()
            .ok_or_else(|| Error::not_found(format!("{} not found", what)))
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com&status=active&page=1&per_page=1&match=all
    /// ```
    async fn resolve_zone(&self) -> Result<String> {
        let domain = self.target.domain.trim_end_matches('.');
        tracing::debug!("Looking up zone ID for domain: {}", domain);

        let request = self.client.get(self.url("zones")).query(&[
            ("name", domain),
            ("status", "active"),
            ("page", "1"),
            ("per_page", "1"),
            ("match", "all"),
        ]);

        let envelope = self.call::<Vec<Zone>>(request, "Zone lookup").await?;
        let zone = Self::single(envelope, &format!("Active zone '{}'", domain))?;

        tracing::debug!("Found zone ID: {}", zone.id);
        Ok(zone.id)
    }

    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?type=A&name=home.example.com&page=1&per_page=1
    /// ```
    async fn resolve_record(&self, zone_id: &str) -> Result<String> {
        let name = self.target.fqdn();
        let record_type = self.target.record_type.as_str();
        tracing::debug!("Looking up record ID: {} (type: {})", name, record_type);

        let request = self
            .client
            .get(self.url(&format!("zones/{}/dns_records", zone_id)))
            .query(&[
                ("type", record_type),
                ("name", name.as_str()),
                ("page", "1"),
                ("per_page", "1"),
            ]);

        let envelope = self.call::<Vec<DnsRecord>>(request, "Record lookup").await?;
        let record = Self::single(
            envelope,
            &format!("DNS record {} (type: {})", name, record_type),
        )?;

        tracing::debug!("Found record ID: {}", record.id);
        Ok(record.id)
    }

    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records/:record_id
    /// ```
    async fn get_record_ip(&self, zone_id: &str, record_id: &str) -> Result<IpAddr> {
        let request = self
            .client
            .get(self.url(&format!("zones/{}/dns_records/{}", zone_id, record_id)));

        let envelope = self.call::<DnsRecord>(request, "Record read").await?;
        let record = envelope.result.ok_or_else(|| {
            Error::provider(PROVIDER_NAME, "Record read: response carries no record")
        })?;

        record.content.trim().parse().map_err(|_| {
            Error::provider(
                PROVIDER_NAME,
                format!("Record {} holds '{}', which is not an IP address", record_id, record.content),
            )
        })
    }

    /// # API Call
    ///
    /// ```http
    /// PUT /zones/:zone_id/dns_records/:record_id
    /// {
    ///   "type": "A",
    ///   "name": "home.example.com",
    ///   "content": "203.0.113.7",
    ///   "ttl": 600,
    ///   "proxied": false
    /// }
    /// ```
    async fn update_record(&self, zone_id: &str, record_id: &str, new_ip: IpAddr) -> Result<()> {
        let name = self.target.fqdn();
        tracing::info!("Updating Cloudflare DNS record: {} -> {}", name, new_ip);

        let payload = serde_json::json!({
            "type": self.target.record_type.as_str(),
            "name": name,
            "content": new_ip.to_string(),
            "ttl": self.target.ttl,
            "proxied": self.target.proxied,
        });

        let request = self
            .client
            .put(self.url(&format!("zones/{}/dns_records/{}", zone_id, record_id)))
            .json(&payload);

        self.call::<serde_json::Value>(request, "Record update").await?;

        tracing::debug!("DNS record updated successfully: {} -> {}", name, new_ip);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Cloudflare providers
#[derive(Debug, Clone)]
pub struct CloudflareFactory {
    base_url: String,
}

impl CloudflareFactory {
    /// Factory for the public API
    pub fn new() -> Self {
        Self::with_base_url(CLOUDFLARE_API_BASE)
    }

    /// Factory for another API root
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for CloudflareFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, settings: &Settings) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(CloudflareProvider::with_base_url(
            settings.target.clone(),
            settings.credentials.clone(),
            self.base_url.clone(),
        )?))
    }
}
