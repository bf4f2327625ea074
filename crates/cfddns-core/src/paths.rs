use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "cloudflare-ddns";

pub const CONFIG_FILE: &str = "cloudflare-ddns.toml";
pub const LOG_FILE: &str = "cloudflare-ddns.log";
pub const PID_FILE: &str = "cloudflare-ddns.pid";

/// Whether the process runs with an effective uid of 0
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_config_file() -> PathBuf {
    home_dir().join(".config").join(CONFIG_FILE)
}

pub fn default_log_file() -> PathBuf {
    if is_root() {
        PathBuf::from("/var/log").join(LOG_FILE)
    } else {
        home_dir().join("log").join(LOG_FILE)
    }
}

pub fn default_pid_file() -> PathBuf {
    if is_root() {
        PathBuf::from("/var/run").join(PID_FILE)
    } else {
        home_dir().join(".cache").join(PID_FILE)
    }
}

/// The key file lives next to the preferences document it protects
pub fn default_key_file(config_file: &Path) -> PathBuf {
    config_file.with_extension("key")
}

/// Expand a leading `~` to the home directory
pub fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix('~') {
        Some("") => home_dir(),
        Some(rest) if rest.starts_with('/') => home_dir().join(rest.trim_start_matches('/')),
        _ => PathBuf::from(value),
    }
}
