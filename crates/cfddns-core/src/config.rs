//! Configuration types for the DDNS daemon
//!
//! [`Settings`] is the fully parsed, validated view of the preferences
//! document. It is an ordinary value: the state store rebuilds it from
//! scratch on every reload and hands out clones, nothing caches individual
//! fields.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::Level;

use crate::error::{Error, Result};

/// TTL written to the record when none is configured
pub const DEFAULT_TTL: u32 = 600;

/// Polling interval when none is configured, in minutes
pub const DEFAULT_FREQUENCY_MINUTES: u64 = 5;

/// Longest accepted polling interval, in minutes (one year)
pub const MAX_FREQUENCY_MINUTES: u64 = 525_600;

/// Log level of the file sink when none is configured
pub const DEFAULT_FILE_LOG_LEVEL: Level = Level::WARN;

/// Main daemon settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// The record kept in sync
    pub target: RecordTarget,

    /// Cloudflare account credentials (decrypted)
    pub credentials: Credentials,

    /// Time between reconciliation cycles
    pub interval: Duration,

    /// Logging sinks
    pub logging: LoggingSettings,

    /// Operational paths and endpoints
    pub service: ServiceSettings,
}

impl Settings {
    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        self.target.validate()?;
        self.credentials.validate()?;

        if self.interval.is_zero() {
            return Err(Error::config("Polling interval must be > 0"));
        }
        if self.interval > Duration::from_secs(MAX_FREQUENCY_MINUTES * 60) {
            return Err(Error::config(format!(
                "[Cloudflare] frequency-minutes must be at most {}",
                MAX_FREQUENCY_MINUTES
            )));
        }
        if self.service.ip_service.is_empty() {
            return Err(Error::config("[Service] ip-service cannot be empty"));
        }

        Ok(())
    }
}

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordType {
    /// A record (IPv4)
    #[default]
    A,
    /// AAAA record (IPv6)
    Aaaa,
}

impl RecordType {
    /// Wire name used by the provider API
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }

    /// Whether `ip` is a valid content value for this record type
    pub fn accepts(&self, ip: &IpAddr) -> bool {
        match self {
            RecordType::A => ip.is_ipv4(),
            RecordType::Aaaa => ip.is_ipv6(),
        }
    }

    /// IP echo endpoint used when `[Service] ip-service` is not set
    pub fn default_ip_service(&self) -> &'static str {
        match self {
            RecordType::A => "https://v4.ident.me/",
            RecordType::Aaaa => "https://v6.ident.me/",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            other => Err(Error::config(format!(
                "Record type '{}' is not supported. Supported types: A, AAAA",
                other
            ))),
        }
    }
}

/// The DNS entry to keep in sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTarget {
    /// Zone name (e.g., "example.com")
    pub domain: String,

    /// Record name: a label ("home"), a full name ("home.example.com") or "@"
    pub name: String,

    /// Record type
    pub record_type: RecordType,

    /// Whether the record is proxied through Cloudflare
    pub proxied: bool,

    /// Time-to-live in seconds (1 = automatic)
    pub ttl: u32,
}

impl RecordTarget {
    /// Create a new A-record target with default TTL, not proxied
    pub fn new(domain: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            record_type: RecordType::A,
            proxied: false,
            ttl: DEFAULT_TTL,
        }
    }

    /// Set the record type
    pub fn with_record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = record_type;
        self
    }

    /// Enable or disable the Cloudflare proxy
    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Fully qualified record name as the provider stores it
    ///
    /// `"home"` under `"example.com"` becomes `"home.example.com"`; a name
    /// that already ends with the domain is kept, `"@"` means the apex.
    pub fn fqdn(&self) -> String {
        let domain = self.domain.trim_end_matches('.').to_ascii_lowercase();
        let name = self.name.trim().trim_end_matches('.').to_ascii_lowercase();

        if name.is_empty() || name == "@" || name == domain {
            return domain;
        }
        if name.ends_with(&format!(".{}", domain)) {
            return name;
        }
        format!("{}.{}", name, domain)
    }

    /// Validate the target
    pub fn validate(&self) -> Result<()> {
        validate_domain_name(&self.domain)
            .map_err(|e| Error::config(format!("[Cloudflare] domain: {}", e)))?;
        validate_domain_name(&self.fqdn())
            .map_err(|e| Error::config(format!("[Cloudflare] name: {}", e)))?;

        if self.ttl != 1 && !(60..=86400).contains(&self.ttl) {
            return Err(Error::config(format!(
                "[Cloudflare] ttl must be 1 (automatic) or between 60 and 86400 seconds. Got: {}",
                self.ttl
            )));
        }

        Ok(())
    }
}

/// Cloudflare account credentials
///
/// The Debug implementation intentionally does NOT expose the API key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login e-mail
    pub email: String,

    /// Global API key
    /// ⚠️ NEVER log this value
    pub api_key: String,
}

impl Credentials {
    /// Create new credentials
    pub fn new(email: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            api_key: api_key.into(),
        }
    }

    /// Validate the credentials
    pub fn validate(&self) -> Result<()> {
        if self.email.is_empty() || !self.email.contains('@') {
            return Err(Error::config(format!(
                "[Cloudflare] mail '{}' is not a valid e-mail address",
                self.email
            )));
        }
        if self.api_key.is_empty() {
            return Err(Error::config("[Cloudflare] api-key cannot be empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

/// Logging sinks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log file to append to
    pub file: PathBuf,

    /// Level of the file sink
    pub level: Level,
}

/// Operational settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    /// PID lock file
    pub pid_file: PathBuf,

    /// File holding the credential encryption key
    pub key_file: PathBuf,

    /// IP echo endpoint
    pub ip_service: String,
}

/// Values supplied by the process (command line) that take precedence over
/// the preferences document at startup
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub domain: Option<String>,
    pub name: Option<String>,
    pub record_type: Option<RecordType>,
    pub ttl: Option<u32>,
    pub frequency_minutes: Option<u64>,
    pub api_key: Option<String>,
    pub mail: Option<String>,
    pub proxied: Option<bool>,
    pub pid_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<Level>,
}

/// Parse a log level name
///
/// Accepts the tracing names plus the aliases older configuration files
/// use (`WARNING`, `CRITICAL`, `FATAL`, `NOTSET`).
pub fn parse_log_level(value: &str) -> Option<Level> {
    match value.trim().to_ascii_uppercase().as_str() {
        "TRACE" | "NOTSET" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" | "WARNING" => Some(Level::WARN),
        "ERROR" | "CRITICAL" | "FATAL" => Some(Level::ERROR),
        _ => None,
    }
}

/// Canonical name written back to the preferences document
pub fn log_level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

/// Validate that a string is a valid domain name
///
/// This implements basic DNS domain name validation per RFC 1035.
/// It's not comprehensive but catches common errors.
pub fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::config("Domain name cannot be empty"));
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        return Err(Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for label in domain.trim_end_matches('.').split('.') {
        if label.is_empty() {
            return Err(Error::config(format!("Domain name has empty label: '{}'", domain)));
        }

        if label.len() > 63 {
            return Err(Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        // Underscore is allowed for service-style labels
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(Error::config(format!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric, hyphen and underscore only.",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::config(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqdn_normalisation() {
        let target = RecordTarget::new("example.com", "home");
        assert_eq!(target.fqdn(), "home.example.com");

        let target = RecordTarget::new("example.com", "home.example.com");
        assert_eq!(target.fqdn(), "home.example.com");

        let target = RecordTarget::new("example.com", "@");
        assert_eq!(target.fqdn(), "example.com");

        let target = RecordTarget::new("Example.com.", "VPN.example.com.");
        assert_eq!(target.fqdn(), "vpn.example.com");

        // A name that merely ends with the domain text is still a label
        let target = RecordTarget::new("example.com", "myexample.com");
        assert_eq!(target.fqdn(), "myexample.com.example.com");
    }

    #[test]
    fn record_type_parsing() {
        assert_eq!("a".parse::<RecordType>().unwrap(), RecordType::A);
        assert_eq!("AAAA".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert!("CNAME".parse::<RecordType>().is_err());

        assert!(RecordType::A.accepts(&"203.0.113.7".parse().unwrap()));
        assert!(!RecordType::A.accepts(&"2001:db8::1".parse().unwrap()));
        assert!(RecordType::Aaaa.accepts(&"2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn target_validation() {
        assert!(RecordTarget::new("example.com", "home").validate().is_ok());
        assert!(RecordTarget::new("example.com", "home").with_ttl(1).validate().is_ok());
        assert!(RecordTarget::new("example.com", "home").with_ttl(30).validate().is_err());
        assert!(RecordTarget::new("", "home").validate().is_err());
        assert!(RecordTarget::new("example.com", "bad name").validate().is_err());
        assert!(RecordTarget::new("-example.com", "home").validate().is_err());
    }

    #[test]
    fn credentials_not_exposed_in_debug() {
        let credentials = Credentials::new("admin@example.com", "secret_key_12345");
        let debug_str = format!("{:?}", credentials);
        assert!(!debug_str.contains("secret_key_12345"));
        assert!(debug_str.contains("admin@example.com"));

        assert!(credentials.validate().is_ok());
        assert!(Credentials::new("not-an-email", "key").validate().is_err());
        assert!(Credentials::new("admin@example.com", "").validate().is_err());
    }

    #[test]
    fn log_level_aliases() {
        assert_eq!(parse_log_level("warning"), Some(Level::WARN));
        assert_eq!(parse_log_level("CRITICAL"), Some(Level::ERROR));
        assert_eq!(parse_log_level("NOTSET"), Some(Level::TRACE));
        assert_eq!(parse_log_level("verbose"), None);
        assert_eq!(log_level_name(Level::WARN), "WARNING");
    }
}
