// # Preferences State Store
//
// TOML-backed implementation of StateStore.
//
// ## Purpose
//
// The preferences document is both the operator's configuration and the
// daemon's durable state. This store reads it into a [`Settings`] value,
// keeps the credential sealed on disk and records the last applied IP.
//
// ## File Format
//
// ```toml
// [Logging]
// file = "/var/log/cloudflare-ddns.log"
// level = "WARNING"
//
// [Cloudflare]
// domain = "example.com"
// name = "home"
// api-key = "enc:v1:..."
// mail = "admin@example.com"
//
// [Service]
// last-ip = "203.0.113.7"
// last-update = "2025-01-09T12:00:00+00:00"
// ```
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename, a crash leaves the previous document
// - Reload of a broken document keeps the previous settings

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::crypt::{CredentialCipher, Unsealed};
use super::secret::KeyFile;
use crate::Error;
use crate::config::{
    self, Credentials, DEFAULT_FILE_LOG_LEVEL, DEFAULT_FREQUENCY_MINUTES, DEFAULT_TTL,
    LoggingSettings, MAX_FREQUENCY_MINUTES, Overrides, RecordTarget, RecordType, ServiceSettings, Settings,
};
use crate::paths;
use crate::traits::state_store::StateStore;

/// Document written by `--init-config`
pub const TEMPLATE: &str = r#"# cloudflare-ddns preferences
#
# Empty path values use the default location for the current user.

[Logging]
# Log file. Default: /var/log/cloudflare-ddns.log (root) or ~/log/cloudflare-ddns.log
file = ""
# Level of the log file: TRACE, DEBUG, INFO, WARNING, ERROR
level = "WARNING"

[Cloudflare]
# Zone the record belongs to, e.g. "example.com"
domain = ""
# Record to keep in sync: a label ("home"), a full name or "@" for the apex
name = ""
# A (IPv4) or AAAA (IPv6)
record-type = "A"
# Seconds, 1 = automatic
ttl = 600
# Minutes between checks
frequency-minutes = 5
# Global API key. Stored encrypted after the first start.
api-key = ""
# Cloudflare account e-mail
mail = ""
use-proxy = false

[Service]
# Default: /var/run/cloudflare-ddns.pid (root) or ~/.cache/cloudflare-ddns.pid
pid-file = ""
# Encryption key for api-key. Default: next to this file with a .key extension
key-file = ""
# Public IP echo service. Default: https://v4.ident.me/ (A) or https://v6.ident.me/ (AAAA)
ip-service = ""
"#;

#[derive(Debug, Clone, Copy)]
enum Section {
    Logging,
    Cloudflare,
    Service,
}

impl Section {
    fn name(self) -> &'static str {
        match self {
            Section::Logging => "Logging",
            Section::Cloudflare => "Cloudflare",
            Section::Service => "Service",
        }
    }
}

/// Outcome of looking a key up
enum Lookup {
    Absent,
    Empty,
    Value(String),
}

/// Serializable document layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Document {
    #[serde(rename = "Logging", default)]
    logging: toml::Table,

    #[serde(rename = "Cloudflare", default)]
    cloudflare: toml::Table,

    #[serde(rename = "Service", default)]
    service: toml::Table,
}

impl Document {
    fn parse(content: &str, origin: &Path) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| {
            Error::config(format!(
                "Failed to parse preferences file {}: {}",
                origin.display(),
                e
            ))
        })
    }

    async fn load(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to read preferences file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content, path)
    }

    async fn save(&self, path: &Path) -> Result<(), Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::state_store(format!("Failed to serialize preferences: {}", e)))?;
        write_atomic(path, &content).await
    }

    fn table(&self, section: Section) -> &toml::Table {
        match section {
            Section::Logging => &self.logging,
            Section::Cloudflare => &self.cloudflare,
            Section::Service => &self.service,
        }
    }

    fn table_mut(&mut self, section: Section) -> &mut toml::Table {
        match section {
            Section::Logging => &mut self.logging,
            Section::Cloudflare => &mut self.cloudflare,
            Section::Service => &mut self.service,
        }
    }

    fn set(&mut self, section: Section, key: &str, value: impl Into<toml::Value>) {
        self.table_mut(section).insert(key.to_string(), value.into());
    }

    fn lookup(&self, section: Section, key: &str) -> Result<Lookup, Error> {
        let Some(value) = self.table(section).get(key) else {
            return Ok(Lookup::Absent);
        };

        let text = match value {
            toml::Value::String(s) => s.trim().to_string(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::Datetime(d) => d.to_string(),
            toml::Value::Array(_) | toml::Value::Table(_) => {
                return Err(Error::config(format!(
                    "[{}] {} must be a single value",
                    section.name(),
                    key
                )));
            }
        };

        if text.is_empty() {
            Ok(Lookup::Empty)
        } else {
            Ok(Lookup::Value(text))
        }
    }

    /// A key without a default: absent and empty are both errors
    fn required(&self, section: Section, key: &str) -> Result<String, Error> {
        match self.lookup(section, key)? {
            Lookup::Value(v) => Ok(v),
            Lookup::Absent => Err(Error::config(format!(
                "[{}] {} is missing",
                section.name(),
                key
            ))),
            Lookup::Empty => Err(Error::config(format!(
                "[{}] {} is empty",
                section.name(),
                key
            ))),
        }
    }

    /// A key with a default: absent takes the default, present but empty is
    /// an error
    fn parsed_or<T>(&self, section: Section, key: &str, default: T) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.lookup(section, key)? {
            Lookup::Absent => Ok(default),
            Lookup::Empty => Err(Error::config(format!(
                "[{}] {} is present but empty. Remove the key to use the default",
                section.name(),
                key
            ))),
            Lookup::Value(v) => v.parse().map_err(|e| {
                Error::config(format!("[{}] {}: invalid value '{}': {}", section.name(), key, v, e))
            }),
        }
    }

    fn flag_or(&self, section: Section, key: &str, default: bool) -> Result<bool, Error> {
        let raw: String = self.parsed_or(section, key, default.to_string())?;
        parse_bool(&raw).ok_or_else(|| {
            Error::config(format!(
                "[{}] {}: '{}' is not a boolean",
                section.name(),
                key,
                raw
            ))
        })
    }

    /// A key whose default is computed by the process: absent and empty
    /// both fall back
    fn optional(&self, section: Section, key: &str) -> Result<Option<String>, Error> {
        match self.lookup(section, key)? {
            Lookup::Value(v) => Ok(Some(v)),
            Lookup::Absent | Lookup::Empty => Ok(None),
        }
    }

    fn path_or(&self, section: Section, key: &str, default: PathBuf) -> Result<PathBuf, Error> {
        Ok(self
            .optional(section, key)?
            .map(|v| paths::expand_home(&v))
            .unwrap_or(default))
    }

    fn key_file(&self, config_path: &Path) -> Result<PathBuf, Error> {
        self.path_or(
            Section::Service,
            "key-file",
            paths::default_key_file(config_path),
        )
    }

    fn last_ip(&self) -> Option<IpAddr> {
        let value = self.optional(Section::Service, "last-ip").ok().flatten()?;
        match value.parse() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::warn!("Ignoring invalid [Service] last-ip '{}'", value);
                None
            }
        }
    }

    /// Merge command line values; a new api-key stays plaintext until
    /// [`Document::seal_credentials`]
    fn apply_overrides(&mut self, overrides: &Overrides) -> Result<(), Error> {
        use Section::*;

        if let Some(domain) = &overrides.domain {
            self.set(Cloudflare, "domain", domain.as_str());
        }
        if let Some(name) = &overrides.name {
            self.set(Cloudflare, "name", name.as_str());
        }
        if let Some(record_type) = overrides.record_type {
            self.set(Cloudflare, "record-type", record_type.as_str());
        }
        if let Some(ttl) = overrides.ttl {
            self.set(Cloudflare, "ttl", i64::from(ttl));
        }
        if let Some(minutes) = overrides.frequency_minutes {
            let minutes = i64::try_from(minutes)
                .map_err(|_| Error::config("[Cloudflare] frequency-minutes is too large"))?;
            self.set(Cloudflare, "frequency-minutes", minutes);
        }
        if let Some(api_key) = &overrides.api_key {
            self.set(Cloudflare, "api-key", api_key.as_str());
        }
        if let Some(mail) = &overrides.mail {
            self.set(Cloudflare, "mail", mail.as_str());
        }
        if let Some(proxied) = overrides.proxied {
            self.set(Cloudflare, "use-proxy", proxied);
        }
        if let Some(pid_file) = &overrides.pid_file {
            self.set(Service, "pid-file", pid_file.display().to_string());
        }
        if let Some(log_file) = &overrides.log_file {
            self.set(Logging, "file", log_file.display().to_string());
        }
        if let Some(level) = overrides.log_level {
            self.set(Logging, "level", config::log_level_name(level));
        }

        Ok(())
    }

    /// Replace a plaintext api-key with its sealed form
    ///
    /// Returns whether the document changed.
    fn seal_credentials(&mut self, cipher: &CredentialCipher) -> Result<bool, Error> {
        let Lookup::Value(stored) = self.lookup(Section::Cloudflare, "api-key")? else {
            return Ok(false);
        };

        match cipher.open(&stored).map_err(undecryptable)? {
            Unsealed::Decrypted(_) => Ok(false),
            Unsealed::LegacyPlaintext(plain) => {
                self.set(Section::Cloudflare, "api-key", cipher.seal(&plain)?);
                tracing::info!("Encrypted plaintext [Cloudflare] api-key in preferences file");
                Ok(true)
            }
        }
    }

    /// Build the settings view of this document
    fn settings(&self, config_path: &Path, cipher: &CredentialCipher) -> Result<Settings, Error> {
        use Section::*;

        let record_type: RecordType = self.parsed_or(Cloudflare, "record-type", RecordType::A)?;
        let ttl: u32 = self.parsed_or(Cloudflare, "ttl", DEFAULT_TTL)?;
        let proxied = self.flag_or(Cloudflare, "use-proxy", false)?;

        let frequency: u64 =
            self.parsed_or(Cloudflare, "frequency-minutes", DEFAULT_FREQUENCY_MINUTES)?;
        if !(1..=MAX_FREQUENCY_MINUTES).contains(&frequency) {
            return Err(Error::config(format!(
                "[Cloudflare] frequency-minutes must be between 1 and {}. Got: {}",
                MAX_FREQUENCY_MINUTES, frequency
            )));
        }

        let target = RecordTarget {
            domain: self.required(Cloudflare, "domain")?,
            name: self.required(Cloudflare, "name")?,
            record_type,
            proxied,
            ttl,
        };

        let sealed = self.required(Cloudflare, "api-key")?;
        let api_key = cipher
            .open(&sealed)
            .map_err(undecryptable)?
            .into_secret();
        let credentials = Credentials::new(self.required(Cloudflare, "mail")?, api_key);

        let level = match self.lookup(Logging, "level")? {
            Lookup::Absent => DEFAULT_FILE_LOG_LEVEL,
            Lookup::Empty => {
                return Err(Error::config(
                    "[Logging] level is present but empty. Remove the key to use the default",
                ));
            }
            Lookup::Value(v) => config::parse_log_level(&v).ok_or_else(|| {
                Error::config(format!("[Logging] level: unknown level '{}'", v))
            })?,
        };

        let settings = Settings {
            target,
            credentials,
            interval: Duration::from_secs(frequency * 60),
            logging: LoggingSettings {
                file: self.path_or(Logging, "file", paths::default_log_file())?,
                level,
            },
            service: ServiceSettings {
                pid_file: self.path_or(Service, "pid-file", paths::default_pid_file())?,
                key_file: self.key_file(config_path)?,
                ip_service: self
                    .optional(Service, "ip-service")?
                    .unwrap_or_else(|| record_type.default_ip_service().to_string()),
            },
        };

        settings.validate()?;
        Ok(settings)
    }
}

fn undecryptable(err: Error) -> Error {
    Error::config(format!(
        "[Cloudflare] api-key cannot be decrypted ({}). Set it again with --key",
        err
    ))
}

/// Boolean spellings accepted in the document
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Write `content` to `path` through a temporary file and a rename
async fn write_atomic(path: &Path, content: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let mut temp_path = path.to_path_buf();
    temp_path.set_extension("tmp");

    {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&temp_path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to create temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.write_all(content.as_bytes()).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to write temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.sync_all().await.map_err(|e| {
            Error::state_store(format!(
                "Failed to flush temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
    }

    fs::rename(&temp_path, path).await.map_err(|e| {
        Error::state_store(format!(
            "Failed to rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        ))
    })?;

    tracing::trace!("Preferences written to {}", path.display());
    Ok(())
}

/// Preferences merged in memory, not yet written back
///
/// Produced by [`PreferencesStore::load`].
#[derive(Debug)]
pub struct LoadedPreferences {
    path: PathBuf,
    document: Document,
    existed: bool,
}

impl LoadedPreferences {
    /// PID lock guarding the document
    pub fn pid_file(&self) -> Result<PathBuf, Error> {
        self.document
            .path_or(Section::Service, "pid-file", paths::default_pid_file())
    }

    /// Validate the merged document and write it back
    ///
    /// This will:
    /// 1. Load or generate the key file
    /// 2. Seal a plaintext api-key
    /// 3. Build and validate the settings
    /// 4. Write the document back
    ///
    /// If validation fails nothing merged is persisted. A missing document
    /// is still created from [`TEMPLATE`] so the operator has a file to
    /// fill in.
    pub async fn commit(self) -> Result<PreferencesStore, Error> {
        let Self {
            path,
            mut document,
            existed,
        } = self;

        let cipher = KeyFile::load_or_create(document.key_file(&path)?)?.cipher()?;
        document.seal_credentials(&cipher)?;

        let settings = match document.settings(&path, &cipher) {
            Ok(settings) => settings,
            Err(e) => {
                if !existed {
                    tracing::info!("Preferences file {} not found, creating it", path.display());
                    write_atomic(&path, TEMPLATE).await?;
                }
                return Err(e);
            }
        };

        if !existed {
            tracing::info!("Preferences file {} not found, creating it", path.display());
        }
        document.save(&path).await?;
        tracing::debug!(
            "Loaded preferences from {} for {}",
            path.display(),
            settings.target.fqdn()
        );

        Ok(PreferencesStore {
            path,
            cipher,
            inner: RwLock::new(Inner {
                document,
                settings,
                dirty: false,
            }),
        })
    }
}

/// Preferences-file state store
///
/// # Example
///
/// ```rust,no_run
/// use cfddns_core::config::Overrides;
/// use cfddns_core::state::PreferencesStore;
/// use cfddns_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = PreferencesStore::open("/etc/cloudflare-ddns.toml", &Overrides::default()).await?;
///
///     let settings = store.settings().await?;
///     println!("keeping {} in sync", settings.target.fqdn());
///
///     store.set_last_ip("203.0.113.7".parse()?).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    /// Key loaded at startup; reloads never touch the key file
    cipher: CredentialCipher,
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    document: Document,
    settings: Settings,
    dirty: bool,
}

impl PreferencesStore {
    /// Open the document at `path`, merging `overrides` into it
    ///
    /// Shorthand for [`PreferencesStore::load`] followed by
    /// [`LoadedPreferences::commit`], for callers that already own the file.
    pub async fn open(path: impl AsRef<Path>, overrides: &Overrides) -> Result<Self, Error> {
        Self::load(path, overrides).await?.commit().await
    }

    /// Read the document at `path` and merge `overrides` in memory
    ///
    /// Nothing is written: neither the document nor the key file. The
    /// caller takes the PID lock named by [`LoadedPreferences::pid_file`]
    /// before committing.
    pub async fn load(
        path: impl AsRef<Path>,
        overrides: &Overrides,
    ) -> Result<LoadedPreferences, Error> {
        let path = path.as_ref().to_path_buf();

        let existed = path.exists();
        let mut document = if existed {
            Document::load(&path).await?
        } else {
            Document::parse(TEMPLATE, &path)?
        };
        document.apply_overrides(overrides)?;

        Ok(LoadedPreferences {
            path,
            document,
            existed,
        })
    }

    /// Write the commented template to `path`
    ///
    /// Fails if the file already exists.
    pub async fn create_template(path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        if path.exists() {
            return Err(Error::config(format!(
                "Preferences file {} already exists",
                path.display()
            )));
        }
        write_atomic(path, TEMPLATE).await
    }

    /// Path of the preferences document
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for PreferencesStore {
    async fn settings(&self) -> Result<Settings, Error> {
        Ok(self.inner.read().await.settings.clone())
    }

    async fn last_ip(&self) -> Result<Option<IpAddr>, Error> {
        Ok(self.inner.read().await.document.last_ip())
    }

    async fn set_last_ip(&self, ip: IpAddr) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.document.set(Section::Service, "last-ip", ip.to_string());
        guard.document.set(
            Section::Service,
            "last-update",
            chrono::Utc::now().to_rfc3339(),
        );
        guard.dirty = true;

        // Immediate write for durability
        guard.document.save(&self.path).await?;
        guard.dirty = false;
        Ok(())
    }

    async fn reload(&self) -> Result<(), Error> {
        let mut document = Document::load(&self.path).await?;
        let resealed = document.seal_credentials(&self.cipher)?;
        let settings = document.settings(&self.path, &self.cipher)?;

        let mut guard = self.inner.write().await;
        if guard.dirty {
            // Keep an update the previous write failed to persist
            for key in ["last-ip", "last-update"] {
                if let Some(value) = guard.document.service.get(key).cloned() {
                    document.set(Section::Service, key, value);
                }
            }
        }

        if resealed || guard.dirty {
            document.save(&self.path).await?;
            guard.dirty = false;
        }

        guard.document = document;
        guard.settings = settings;
        tracing::info!("Reloaded preferences from {}", self.path.display());
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if guard.dirty {
            guard.document.save(&self.path).await?;
            guard.dirty = false;
        }
        Ok(())
    }
}
