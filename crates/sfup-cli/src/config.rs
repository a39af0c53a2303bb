//! Configuration system for the SFUP server.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sfup_core::EngineConfig;

/// SFUP configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Ticket policy
    #[serde(default)]
    pub tickets: TicketConfig,
    /// Notification delivery
    #[serde(default)]
    pub mail: MailConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Public base URL used in links; derived from the request when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Directory holding the ticket database and encrypted blobs
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Largest download held in memory so a failed integrity check can
    /// still answer 599; bigger files stream and abort the connection instead
    #[serde(default = "default_download_buffer_limit")]
    pub download_buffer_limit: u64,
}

/// Ticket policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketConfig {
    /// Addresses allowed to reserve tickets
    #[serde(default)]
    pub allowed_emails: Vec<String>,
    /// Largest accepted upload in bytes (0 = unlimited)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Hours a ticket may sit idle before it is swept
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    /// Seconds between expiry sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Notification delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// `log` to only log instructions, `sendmail` to pipe them to a command
    #[serde(default = "default_mail_backend")]
    pub backend: String,
    /// Sendmail-compatible command
    #[serde(default = "default_sendmail_path")]
    pub sendmail_path: PathBuf,
    /// Sender address
    #[serde(default = "default_from")]
    pub from: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_download_buffer_limit() -> u64 {
    crate::state::DEFAULT_DOWNLOAD_BUFFER_LIMIT
}

fn default_max_file_size() -> u64 {
    sfup_core::config::DEFAULT_MAX_FILE_SIZE
}

fn default_ttl_hours() -> u64 {
    7 * 24
}

fn default_sweep_interval() -> u64 {
    60 * 60
}

fn default_mail_backend() -> String {
    "log".to_string()
}

fn default_sendmail_path() -> PathBuf {
    PathBuf::from("/usr/sbin/sendmail")
}

fn default_from() -> String {
    "sfup@localhost".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            base_url: None,
            data_dir: default_data_dir(),
            download_buffer_limit: default_download_buffer_limit(),
        }
    }
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            allowed_emails: Vec::new(),
            max_file_size: default_max_file_size(),
            ttl_hours: default_ttl_hours(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            backend: default_mail_backend(),
            sendmail_path: default_sendmail_path(),
            from: default_from(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Parse listen address as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_listen_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Interval between expiry sweeps
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.tickets.sweep_interval_secs)
    }

    /// Engine settings derived from this configuration
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            allowed_emails: self.tickets.allowed_emails.clone(),
            max_file_size: (self.tickets.max_file_size > 0).then_some(self.tickets.max_file_size),
            ticket_ttl: Duration::from_secs(self.tickets.ttl_hours.saturating_mul(60 * 60)),
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_listen_addr()?;

        if let Some(base_url) = &self.server.base_url {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                anyhow::bail!("Base URL must start with http:// or https://: {}", base_url);
            }
        }

        if self.server.data_dir.as_os_str().is_empty() {
            anyhow::bail!("Data directory must not be empty");
        }

        for email in &self.tickets.allowed_emails {
            let email = email.trim();
            if email.is_empty() || !email.contains('@') || email.chars().any(char::is_control) {
                anyhow::bail!("Invalid allow-listed address: {:?}", email);
            }
        }

        if self.tickets.ttl_hours == 0 {
            anyhow::bail!("Ticket TTL must be at least one hour");
        }

        if self.tickets.sweep_interval_secs == 0 {
            anyhow::bail!("Sweep interval must be at least one second");
        }

        let valid_backends = ["log", "sendmail"];
        if !valid_backends.contains(&self.mail.backend.as_str()) {
            anyhow::bail!(
                "Invalid mail backend: {}. Must be one of: {}",
                self.mail.backend,
                valid_backends.join(", ")
            );
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.server.data_dir, PathBuf::from("files"));
        assert_eq!(config.tickets.max_file_size, 1024 * 1024 * 1024);
        assert_eq!(config.server.download_buffer_limit, 64 * 1024 * 1024);
        assert_eq!(config.mail.backend, "log");
        assert!(config.tickets.allowed_emails.is_empty());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.mail.backend = "smtp".to_string();
        assert!(config.validate().is_err());

        config.mail.backend = "sendmail".to_string();
        config.server.listen_addr = "not-an-addr".to_string();
        assert!(config.validate().is_err());

        config.server.listen_addr = "127.0.0.1:9000".to_string();
        config.server.base_url = Some("ftp://files".to_string());
        assert!(config.validate().is_err());

        config.server.base_url = Some("https://drop.example.com".to_string());
        config.tickets.allowed_emails = vec!["nobody".to_string()];
        assert!(config.validate().is_err());

        config.tickets.allowed_emails = vec!["alice@example.com".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [tickets]
            allowed_emails = ["alice@example.com"]
            max_file_size = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.tickets.ttl_hours, 168);

        let engine = config.engine_config();
        assert_eq!(engine.max_file_size, None);
        assert_eq!(engine.ticket_ttl, Duration::from_secs(168 * 3600));
        assert!(engine.is_allowed("alice@example.com"));
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/sfup.toml");

        let mut config = Config::default();
        config.server.base_url = Some("https://drop.example.com".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.base_url, config.server.base_url);
        assert_eq!(loaded.tickets.max_file_size, config.tickets.max_file_size);
    }
}
