//! Configuration management
//!
//! Settings come from built-in defaults, an optional TOML file and
//! `MESHINVITE_<SECTION>_<KEY>` environment variables, in that order.

use crate::core_identity::check_netname;
use crate::core_proto::DEFAULT_PORT;
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;
mod paths;

pub use error::ConfigError;
pub use paths::{
    ConfigPaths, CONF_FILE, ENCRYPTION_KEY_FILE, HOSTS_DIR, INVITATIONS_DIR, SIGNING_KEY_FILE,
};

/// How long an invitation stays redeemable.
pub const DEFAULT_INVITATION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub invitation: InvitationConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
    /// Whether prompts may be shown on the terminal
    pub interactive: bool,
}

/// Where configuration roots live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding one sub-directory per named network
    pub confdir: PathBuf,

    /// Network namespace; selects `confdir/<netname>`
    pub netname: Option<String>,

    /// Explicit configuration root, bypassing `confdir`/`netname`
    pub confbase: Option<PathBuf>,
}

/// Invitation issuing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvitationConfig {
    /// Age after which an outstanding invitation is discarded
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Port assumed when an invitation URL names none
    pub default_port: u16,

    /// `host:port` answering `GET /host` with our external hostname
    pub discovery_endpoint: Option<String>,
}

/// Socket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Longest wait for a single read from the peer
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,

    /// Address the invitation responder listens on
    pub listen_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub json_format: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { confdir: PathBuf::from("/etc/mesh"), netname: None, confbase: None }
    }
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_INVITATION_TTL,
            default_port: DEFAULT_PORT,
            discovery_endpoint: Some("ifconfig.me:80".to_string()),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            listen_address: format!("0.0.0.0:{}", DEFAULT_PORT),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Example: `MESHINVITE_PATHS_NETNAME=office`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|var| env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        let mut config: Self = toml::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

        config.apply_overrides(|var| env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MESHINVITE_<SECTION>_<KEY>` overrides found through `lookup`.
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("MESHINVITE_PATHS_CONFDIR") {
            self.paths.confdir = PathBuf::from(dir);
        }
        if let Some(net) = lookup("MESHINVITE_PATHS_NETNAME") {
            self.paths.netname = Some(net);
        }
        if let Some(base) = lookup("MESHINVITE_PATHS_CONFBASE") {
            self.paths.confbase = Some(PathBuf::from(base));
        }

        if let Some(ttl) = lookup("MESHINVITE_INVITATION_TTL") {
            self.invitation.ttl = parse_duration("MESHINVITE_INVITATION_TTL", &ttl)?;
        }
        if let Some(port) = lookup("MESHINVITE_INVITATION_DEFAULT_PORT") {
            self.invitation.default_port = port.parse().map_err(|e| ConfigError::Env {
                var: "MESHINVITE_INVITATION_DEFAULT_PORT",
                reason: format!("{}", e),
            })?;
        }
        if let Some(endpoint) = lookup("MESHINVITE_INVITATION_DISCOVERY_ENDPOINT") {
            // Empty turns discovery off.
            self.invitation.discovery_endpoint = Some(endpoint).filter(|e| !e.is_empty());
        }

        if let Some(timeout) = lookup("MESHINVITE_NETWORK_CONNECT_TIMEOUT") {
            self.network.connect_timeout =
                parse_duration("MESHINVITE_NETWORK_CONNECT_TIMEOUT", &timeout)?;
        }
        if let Some(timeout) = lookup("MESHINVITE_NETWORK_IO_TIMEOUT") {
            self.network.io_timeout = parse_duration("MESHINVITE_NETWORK_IO_TIMEOUT", &timeout)?;
        }
        if let Some(addr) = lookup("MESHINVITE_NETWORK_LISTEN_ADDRESS") {
            self.network.listen_address = addr;
        }

        if let Some(level) = lookup("MESHINVITE_LOGGING_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("MESHINVITE_LOGGING_JSON_FORMAT") {
            self.logging.json_format = parse_bool("MESHINVITE_LOGGING_JSON_FORMAT", &json)?;
        }

        if let Some(interactive) = lookup("MESHINVITE_INTERACTIVE") {
            self.interactive = parse_bool("MESHINVITE_INTERACTIVE", &interactive)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(net) = &self.paths.netname {
            if !check_netname(net) {
                return Err(ConfigError::Invalid(format!("Invalid netname: {}", net)));
            }
        }

        if self.invitation.ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "invitation ttl must be greater than 0".to_string(),
            ));
        }

        if self.invitation.default_port == 0 {
            return Err(ConfigError::Invalid(
                "default_port must be greater than 0".to_string(),
            ));
        }

        if self.network.connect_timeout.is_zero() || self.network.io_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "network timeouts must be greater than 0".to_string(),
            ));
        }

        self.logging.level.parse::<LogLevel>().map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(())
    }

    /// Configuration root selected by `paths`
    pub fn config_paths(&self) -> ConfigPaths {
        match &self.paths.confbase {
            Some(base) => ConfigPaths::new(base.clone()),
            None => ConfigPaths::resolve(&self.paths.confdir, self.paths.netname.as_deref()),
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents)
            .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })?;

        Ok(())
    }
}

fn parse_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| ConfigError::Env { var, reason: e.to_string() })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Env { var, reason: format!("expected a boolean, got '{}'", other) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.invitation.ttl, Duration::from_secs(604_800));
        assert_eq!(config.invitation.default_port, 655);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.invitation.default_port = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.network.io_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config = Config::default();
        config.paths.netname = Some("../escape".to_string());
        assert!(config.validate().is_err());

        config = Config::default();
        config.logging.level = "chatty".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_paths_precedence() {
        let mut config = Config::default();
        config.paths.confdir = PathBuf::from("/srv/mesh");
        config.paths.netname = Some("lab".to_string());
        assert_eq!(config.config_paths().confbase(), Path::new("/srv/mesh/lab"));

        config.paths.confbase = Some(PathBuf::from("/opt/override"));
        assert_eq!(config.config_paths().confbase(), Path::new("/opt/override"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("meshinvite.toml");
        std::fs::write(
            &file,
            "interactive = false\n[invitation]\nttl = \"2days\"\n[network]\nio_timeout = \"5s\"\n",
        )
        .unwrap();

        let config = Config::from_file(&file).unwrap();
        assert_eq!(config.invitation.ttl, Duration::from_secs(2 * 86_400));
        assert_eq!(config.network.io_timeout, Duration::from_secs(5));
        assert_eq!(config.network.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.invitation.default_port, 655);
    }

    #[test]
    fn test_unparseable_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("broken.toml");
        std::fs::write(&file, "[network\nio_timeout = ").unwrap();
        match Config::from_file(&file) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("absent.toml");
        let err = Config::from_file(&file).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_env_overrides_every_section() {
        let mut config = Config::default();
        config
            .apply_overrides(overrides(&[
                ("MESHINVITE_PATHS_NETNAME", "lab"),
                ("MESHINVITE_INVITATION_TTL", "1h"),
                ("MESHINVITE_INVITATION_DISCOVERY_ENDPOINT", ""),
                ("MESHINVITE_NETWORK_CONNECT_TIMEOUT", "3s"),
                ("MESHINVITE_NETWORK_IO_TIMEOUT", "500ms"),
                ("MESHINVITE_LOGGING_LEVEL", "debug"),
                ("MESHINVITE_LOGGING_JSON_FORMAT", "true"),
                ("MESHINVITE_INTERACTIVE", "yes"),
            ]))
            .unwrap();

        assert_eq!(config.paths.netname.as_deref(), Some("lab"));
        assert_eq!(config.invitation.ttl, Duration::from_secs(3600));
        assert_eq!(config.invitation.discovery_endpoint, None);
        assert_eq!(config.network.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.network.io_timeout, Duration::from_millis(500));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert!(config.interactive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_env_override_names_the_variable() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(overrides(&[("MESHINVITE_NETWORK_IO_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "MESHINVITE_NETWORK_IO_TIMEOUT", .. }));

        let err = config
            .apply_overrides(overrides(&[("MESHINVITE_INTERACTIVE", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "MESHINVITE_INTERACTIVE", .. }));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        // Only this test touches this variable.
        std::env::set_var("MESHINVITE_INVITATION_DISCOVERY_ENDPOINT", "198.51.100.7:8080");
        let config = Config::from_env();
        std::env::remove_var("MESHINVITE_INVITATION_DISCOVERY_ENDPOINT");

        let config = config.unwrap();
        assert_eq!(config.invitation.discovery_endpoint.as_deref(), Some("198.51.100.7:8080"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("saved.toml");

        let mut config = Config::default();
        config.paths.netname = Some("office".to_string());
        config.invitation.ttl = Duration::from_secs(90 * 60);
        config.network.io_timeout = Duration::from_secs(12);
        config.logging.level = "warn".to_string();
        config.save_to_file(&file).unwrap();

        let loaded = Config::from_file(&file).unwrap();
        assert_eq!(loaded.paths.netname.as_deref(), Some("office"));
        assert_eq!(loaded.invitation.ttl, Duration::from_secs(90 * 60));
        assert_eq!(loaded.network.io_timeout, Duration::from_secs(12));
        assert_eq!(loaded.logging.level, "warn");
    }

    #[test]
    fn test_level_spellings_match_logging() {
        let mut config = Config::default();
        config.logging.level = "WARNING".to_string();
        assert!(config.validate().is_ok());
    }
}
