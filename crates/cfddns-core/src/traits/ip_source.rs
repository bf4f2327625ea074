// # IP Source Trait
//
// Defines the interface for discovering the host's public IP address.
//
// ## Implementations
//
// - HTTP "what is my IP" echo service: `cfddns-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use cfddns_core::IpSource;
//
// #[tokio::main]
// async fn main() -> Result<(), Box<dyn std::error::Error>> {
//     let source = /* IpSource implementation */;
//
//     // Get current IP
//     let current_ip = source.current().await?;
//     println!("public address: {}", current_ip);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for public IP discovery
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform one network request per call
/// - ✅ Parse the service's answer
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (the engine retries on its next cycle)
/// - ❌ Cache the answer between calls (a stale answer defeats the loop)
/// - ❌ Spawn tasks
/// - ❌ Decide whether DNS should be updated
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Get the current public IP address
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The address the outside world sees
    /// - `Err(Error::Network)`: The service was unreachable, timed out or
    ///   answered something that is not an IP address
    async fn current(&self) -> Result<IpAddr, crate::Error>;

    /// Name of the source (for logging/debugging)
    fn source_name(&self) -> &str;
}
