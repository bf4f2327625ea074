//! Command line interface

use std::path::PathBuf;

use cfddns_core::config::{Overrides, RecordType, parse_log_level};
use cfddns_core::paths;
use clap::Parser;
use tracing::Level;

/// Keep a Cloudflare DNS record pointed at this host's public IP
#[derive(Debug, Parser)]
#[command(name = "cfddnsd", version, about)]
pub struct Cli {
    /// Zone the record lives in (e.g. example.com)
    #[arg(long, value_name = "DOMAIN")]
    pub domain: Option<String>,

    /// Record name: a label, a full name or "@" for the apex
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Record type to keep in sync
    #[arg(long, value_name = "A|AAAA")]
    pub record_type: Option<RecordType>,

    /// Record TTL in seconds (1 = automatic)
    #[arg(long, value_name = "SECONDS")]
    pub ttl: Option<u32>,

    /// Minutes between two checks
    #[arg(long = "time", value_name = "MINUTES", value_parser = clap::value_parser!(u64).range(1..))]
    pub frequency_minutes: Option<u64>,

    /// Cloudflare global API key (stored encrypted)
    #[arg(long, value_name = "API-KEY")]
    pub key: Option<String>,

    /// Cloudflare sign-in e-mail
    #[arg(long, value_name = "EMAIL")]
    pub mail: Option<String>,

    /// Put the record behind the Cloudflare proxy
    #[arg(long)]
    pub proxied: bool,

    /// Run one cycle and exit
    #[arg(long, visible_alias = "no-daemonize")]
    pub single_run: bool,

    /// Write an empty preferences file and exit
    #[arg(long)]
    pub init_config: bool,

    /// Preferences file location
    #[arg(long, value_name = "PATH", default_value_os_t = paths::default_config_file())]
    pub config_file: PathBuf,

    /// PID lock file location
    #[arg(long, value_name = "PATH")]
    pub pid_file: Option<PathBuf>,

    /// Log file location
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log level for the console and the log file
    #[arg(long, value_name = "LEVEL", value_parser = level_arg)]
    pub log_level: Option<Level>,

    /// Run as this user
    #[arg(long, value_name = "USERNAME")]
    pub user: Option<String>,

    /// Run as this group
    #[arg(long, value_name = "GROUP-NAME")]
    pub group: Option<String>,
}

fn level_arg(value: &str) -> Result<Level, String> {
    parse_log_level(value).ok_or_else(|| {
        format!(
            "'{}' is not a log level (TRACE, DEBUG, INFO, WARNING, ERROR)",
            value
        )
    })
}

impl Cli {
    /// Values that take precedence over the preferences file at startup
    pub fn overrides(&self) -> Overrides {
        Overrides {
            domain: self.domain.clone(),
            name: self.name.clone(),
            record_type: self.record_type,
            ttl: self.ttl,
            frequency_minutes: self.frequency_minutes,
            api_key: self.key.clone(),
            mail: self.mail.clone(),
            // The flag can only switch the proxy on; the file keeps an explicit `false`
            proxied: self.proxied.then_some(true),
            pid_file: self.pid_file.clone(),
            log_file: self.log_file.clone(),
            log_level: self.log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_follow_flags() {
        let cli = Cli::parse_from([
            "cfddnsd",
            "--domain",
            "example.com",
            "--name",
            "home",
            "--record-type",
            "aaaa",
            "--time",
            "10",
            "--key",
            "0123456789abcdef",
            "--proxied",
            "--log-level",
            "warning",
        ]);

        let overrides = cli.overrides();
        assert_eq!(overrides.domain.as_deref(), Some("example.com"));
        assert_eq!(overrides.record_type, Some(RecordType::Aaaa));
        assert_eq!(overrides.frequency_minutes, Some(10));
        assert_eq!(overrides.api_key.as_deref(), Some("0123456789abcdef"));
        assert_eq!(overrides.proxied, Some(true));
        assert_eq!(overrides.log_level, Some(Level::WARN));
        assert!(overrides.mail.is_none());
    }

    #[test]
    fn absent_proxied_flag_leaves_file_value() {
        let cli = Cli::parse_from(["cfddnsd"]);
        assert!(cli.overrides().proxied.is_none());
        assert!(!cli.single_run);
        assert_eq!(cli.config_file, paths::default_config_file());
    }

    #[test]
    fn no_daemonize_is_single_run() {
        assert!(Cli::parse_from(["cfddnsd", "--no-daemonize"]).single_run);
        assert!(Cli::parse_from(["cfddnsd", "--single-run"]).single_run);
    }

    #[test]
    fn zero_minutes_rejected() {
        assert!(Cli::try_parse_from(["cfddnsd", "--time", "0"]).is_err());
        assert!(Cli::try_parse_from(["cfddnsd", "--record-type", "CNAME"]).is_err());
        assert!(Cli::try_parse_from(["cfddnsd", "--log-level", "loud"]).is_err());
    }
}
