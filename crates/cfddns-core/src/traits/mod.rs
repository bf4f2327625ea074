//! Core traits for the DDNS daemon
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpSource`]: Discover the host's public IP
//! - [`DnsProvider`]: Read and update the record via the provider API
//! - [`StateStore`]: Settings and last-applied IP persistence

pub mod ip_source;
pub mod dns_provider;
pub mod state_store;

pub use ip_source::IpSource;
pub use dns_provider::{DnsProvider, DnsProviderFactory};
pub use state_store::StateStore;
