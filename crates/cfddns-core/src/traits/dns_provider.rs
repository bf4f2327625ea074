// # DNS Provider Trait
//
// Defines the interface for reading and updating one DNS record via a
// provider API.
//
// ## Implementations
//
// - Cloudflare: `cfddns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use cfddns_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> Result<(), Box<dyn std::error::Error>> {
//     let provider = /* DnsProvider implementation */;
//
//     let zone = provider.resolve_zone().await?;
//     let record = provider.resolve_record(&zone).await?;
//     provider.update_record(&zone, &record, "203.0.113.7".parse()?).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::Settings;

/// Trait for DNS provider implementations
///
/// A provider instance is bound to one record target and one set of
/// credentials. After a configuration reload the engine builds a fresh
/// instance through a [`DnsProviderFactory`] instead of mutating this one.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure (engine decides what happens next)
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic or backoff (owned by the engine)
/// - ❌ Access the state store (owned by the engine)
/// - ❌ Cache zone/record identifiers (owned by the engine)
/// - ❌ Decide whether an update is needed (owned by the engine)
///
/// ## Error Contract
///
/// - Unreachable endpoint / timeout → `Error::Network`
/// - API rejected the request or reported `success=false` → `Error::Provider`
/// - Lookup matched nothing → `Error::NotFound`
/// - Lookup matched more than one resource → `Error::Ambiguous`
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up the zone id for the target's domain
    ///
    /// Read-only, safe to call every cycle.
    async fn resolve_zone(&self) -> Result<String, crate::Error>;

    /// Look up the record id for the target's name and type within `zone_id`
    ///
    /// Read-only, safe to call every cycle.
    async fn resolve_record(&self, zone_id: &str) -> Result<String, crate::Error>;

    /// Read the address currently published in the record
    async fn get_record_ip(&self, zone_id: &str, record_id: &str) -> Result<IpAddr, crate::Error>;

    /// Overwrite the record so it points at `new_ip`
    ///
    /// Every field of the record (type, name, content, ttl, proxied) is
    /// sent, never a partial patch.
    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        new_ip: IpAddr,
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from settings
///
/// The engine calls this at startup and again after every reload so a new
/// record target or new credentials take effect on the next cycle.
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance bound to `settings.target` and
    /// `settings.credentials`
    fn create(&self, settings: &Settings) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
