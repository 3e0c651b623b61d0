//! Configuration file support for the relay.
//!
//! Loads settings from `~/.config/wavelog-relay/config.toml` on Linux
//! (or platform-appropriate location on other OSes). When the file does not
//! exist yet, a commented template is written there for the operator to fill
//! in.

use anyhow::{Context, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adif::EncoderOptions;
use crate::delivery::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT, RetryPolicy, WavelogTarget,
};
use crate::listener::DEFAULT_UDP_PORT;

/// Placeholder URL written to new config files.
pub const PLACEHOLDER_URL: &str = "https://your-wavelog-url.com";

/// Placeholder API key written to new config files.
pub const PLACEHOLDER_API_KEY: &str = "your-api-key-here";

/// Template written when no config file exists.
pub const CONFIG_TEMPLATE: &str = r#"# wavelog-relay configuration

# UDP port the logger sends contact broadcasts to
udp_port = 2333

# Address to listen on; 0.0.0.0 listens on every interface
listen_address = "0.0.0.0"

# Base URL of your Wavelog installation
wavelog_url = "https://your-wavelog-url.com"

# Wavelog API key (read/write)
api_key = "your-api-key-here"

# Station profile the QSOs are logged against
station_profile_id = "1"

# Per-request timeout in seconds
request_timeout = 15

# Upload attempts per record, including the first
max_attempts = 3

# Send a <band> tag along with the frequency
emit_band = false

# Also write the log to this file
# log_file = "wavelog-relay.log"

# Log statistics every N seconds (0 = disabled)
stats_interval = 0

# Prometheus metrics endpoint
metrics_enabled = false
metrics_port = 9090
"#;

/// Problems found by [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing or invalid config keys: {}", .0.join(", "))]
    InvalidKeys(Vec<&'static str>),
}

/// Accept the station profile id as either a string or an integer.
fn deserialize_profile_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct ProfileIdVisitor;

    impl Visitor<'_> for ProfileIdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer station profile id")
        }

        fn visit_str<E>(self, value: &str) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(ProfileIdVisitor)
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP port to listen on.
    pub udp_port: u16,

    /// Address to listen on.
    pub listen_address: String,

    /// Base URL of the Wavelog installation.
    pub wavelog_url: String,

    /// Wavelog API key.
    pub api_key: String,

    /// Wavelog station profile id.
    #[serde(deserialize_with = "deserialize_profile_id")]
    pub station_profile_id: String,

    /// Per-request timeout in seconds.
    pub request_timeout: u64,

    /// Upload attempts per record.
    pub max_attempts: u32,

    /// Emit the band tag in converted records.
    pub emit_band: bool,

    /// Optional log file, written in addition to the console.
    pub log_file: Option<PathBuf>,

    /// Log statistics every N seconds (0 = disabled).
    pub stats_interval: u64,

    /// Enable Prometheus metrics HTTP endpoint.
    pub metrics_enabled: bool,

    /// Port for Prometheus metrics HTTP endpoint.
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            udp_port: DEFAULT_UDP_PORT,
            listen_address: "0.0.0.0".to_string(),
            wavelog_url: PLACEHOLDER_URL.to_string(),
            api_key: PLACEHOLDER_API_KEY.to_string(),
            station_profile_id: "1".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            emit_band: false,
            log_file: None,
            stats_interval: 0,
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// If the file doesn't exist, writes [`CONFIG_TEMPLATE`] there and
    /// returns `None` so the caller can ask the operator to edit it.
    /// Returns an error if the file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            Self::write_template(path)?;
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))?;
        Ok(Some(config))
    }

    /// Write the config template, creating parent directories as needed.
    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write config template: {}", path.display()))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("wavelog-relay/config.toml"))
    }

    /// Validate all configuration settings.
    ///
    /// Reports every missing, placeholder, or out-of-range key at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut invalid = Vec::new();

        if self.udp_port == 0 {
            invalid.push("udp_port");
        }
        if self.listen_address.trim().is_empty() {
            invalid.push("listen_address");
        }
        let url = self.wavelog_url.trim();
        if url == PLACEHOLDER_URL || !(url.starts_with("http://") || url.starts_with("https://"))
        {
            invalid.push("wavelog_url");
        }
        if self.api_key.trim().is_empty() || self.api_key == PLACEHOLDER_API_KEY {
            invalid.push("api_key");
        }
        if self.station_profile_id.trim().is_empty() {
            invalid.push("station_profile_id");
        }
        if self.request_timeout == 0 {
            invalid.push("request_timeout");
        }
        if self.max_attempts == 0 {
            invalid.push("max_attempts");
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::InvalidKeys(invalid))
        }
    }

    /// The `host:port` string to bind the UDP socket to.
    pub fn listen_addr(&self) -> String {
        if self.listen_address.contains(':') {
            format!("[{}]:{}", self.listen_address, self.udp_port)
        } else {
            format!("{}:{}", self.listen_address, self.udp_port)
        }
    }

    /// Upload target.
    pub fn target(&self) -> WavelogTarget {
        WavelogTarget {
            base_url: self.wavelog_url.trim().to_string(),
            api_key: self.api_key.clone(),
            station_profile_id: self.station_profile_id.clone(),
        }
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Retry policy for uploads.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// ADIF encoder options.
    pub fn encoder_options(&self) -> EncoderOptions {
        EncoderOptions {
            emit_band: self.emit_band,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            wavelog_url: "https://log.example.com".to_string(),
            api_key: "wl1234".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.udp_port, 2333);
        assert_eq!(config.listen_address, "0.0.0.0");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert!(!config.emit_band);
        assert!(!config.metrics_enabled);
    }

    #[test]
    fn test_template_matches_defaults() {
        let config: Config = toml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_template_does_not_validate() {
        let config: Config = toml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidKeys(vec!["wavelog_url", "api_key"]))
        );
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
            wavelog_url = "https://log.example.com"
            api_key = "wl1234"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.wavelog_url, "https://log.example.com");
        assert_eq!(config.udp_port, 2333);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            udp_port = 12060
            listen_address = "127.0.0.1"
            wavelog_url = "http://wavelog.lan/"
            api_key = "wl1234"
            station_profile_id = "4"
            request_timeout = 5
            max_attempts = 5
            emit_band = true
            log_file = "/var/log/wavelog-relay.log"
            stats_interval = 60
            metrics_enabled = true
            metrics_port = 9091
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:12060");
        assert_eq!(config.target().qso_url(), "http://wavelog.lan/api/qso");
        assert_eq!(config.target().station_profile_id, "4");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert!(config.encoder_options().emit_band);
        assert_eq!(
            config.log_file,
            Some(PathBuf::from("/var/log/wavelog-relay.log"))
        );
        assert_eq!(config.stats_interval, 60);
        assert!(config.metrics_enabled);
        assert_eq!(config.metrics_port, 9091);
    }

    #[test]
    fn test_profile_id_as_integer() {
        let config: Config = toml::from_str("station_profile_id = 3").unwrap();
        assert_eq!(config.station_profile_id, "3");
    }

    #[test]
    fn test_validate_reports_every_bad_key() {
        let config = Config {
            udp_port: 0,
            wavelog_url: "wavelog.lan".to_string(),
            api_key: String::new(),
            station_profile_id: " ".to_string(),
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidKeys(vec![
                "udp_port",
                "wavelog_url",
                "api_key",
                "station_profile_id",
                "max_attempts"
            ]))
        );
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_ipv6_listen_addr() {
        let config = Config {
            listen_address: "::".to_string(),
            ..valid()
        };
        assert_eq!(config.listen_addr(), "[::]:2333");
    }

    #[test]
    fn test_missing_file_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        assert!(Config::load_from(&path).unwrap().is_none());
        assert_eq!(fs::read_to_string(&path).unwrap(), CONFIG_TEMPLATE);

        // Second load reads the template back
        let config = Config::load_from(&path).unwrap().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "udp_port = \"not a number\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid TOML"));
    }
}
