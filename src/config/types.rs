//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default port for the stream server.
pub const DEFAULT_PORT: u16 = 8214;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    /// Storage adapter settings.
    pub storage: StorageConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

/// Settings for the session log storage adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the session log files. Defaults to `~/.claude`.
    pub dir: Option<PathBuf>,
    /// Maximum time a long-poll read stays parked, in milliseconds.
    pub long_poll_timeout_ms: u64,
    /// Debounce window for filesystem events, in milliseconds.
    pub debounce_ms: u64,
    /// Scan interval of the polling fallback, in milliseconds.
    pub poll_interval_ms: u64,
    /// Interval between full directory reconciles, in milliseconds.
    pub rescan_interval_ms: u64,
    /// Maximum number of bytes returned by a single read.
    pub max_read_bytes: u64,
    /// Skip native notifications and always poll.
    pub force_polling: bool,
}

fn default_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            long_poll_timeout_ms: 30_000,
            debounce_ms: 100,
            poll_interval_ms: 1_000,
            rescan_interval_ms: 30_000,
            max_read_bytes: 4 * 1024 * 1024,
            force_polling: false,
        }
    }
}

impl StorageConfig {
    /// Resolve the watched directory, falling back to `~/.claude`.
    ///
    /// # Errors
    ///
    /// Returns an error if no directory is configured and the home
    /// directory cannot be determined.
    pub fn resolved_dir(&self) -> Result<PathBuf, ConfigError> {
        self.dir
            .clone()
            .or_else(default_dir)
            .ok_or(ConfigError::NoHomeDir)
    }

    #[must_use]
    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.long_poll_timeout_ms)
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[must_use]
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms.max(1))
    }
}

/// Settings for the HTTP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to. Loopback unless configured; use `0.0.0.0`
    /// (or `--addr :PORT`) to accept remote connections.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Path prefix for all routes (e.g. `/proxy/8214`).
    pub base_path: String,
    /// Enable CORS for browser development.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            base_path: String::new(),
            cors_permissive: false,
        }
    }
}

impl ServerConfig {
    /// Apply a listen address of the form `host:port` or `:port`.
    ///
    /// An empty host binds all interfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the address has no port or the port is invalid.
    pub fn set_listen_addr(&mut self, addr: &str) -> Result<(), ConfigError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidAddress(addr.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidAddress(addr.to_string()))?;

        self.host = if host.is_empty() {
            "0.0.0.0".to_string()
        } else {
            host.trim_start_matches('[').trim_end_matches(']').to_string()
        };
        self.port = port;
        Ok(())
    }

    /// Base path normalized to start and end with `/`, or empty.
    #[must_use]
    pub fn normalized_base_path(&self) -> String {
        let base = self.base_path.trim().trim_matches('/');
        if base.is_empty() {
            String::new()
        } else {
            format!("/{base}/")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert!(config.dir.is_none());
        assert_eq!(config.long_poll_timeout(), Duration::from_secs(30));
        assert_eq!(config.debounce(), Duration::from_millis(100));
        assert_eq!(config.max_read_bytes, 4 * 1024 * 1024);
        assert!(!config.force_polling);
    }

    #[test]
    fn test_resolved_dir_prefers_configured() {
        let config = StorageConfig {
            dir: Some(PathBuf::from("/tmp/sessions")),
            ..StorageConfig::default()
        };
        assert_eq!(
            config.resolved_dir().unwrap(),
            PathBuf::from("/tmp/sessions")
        );
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let config = StorageConfig {
            poll_interval_ms: 0,
            rescan_interval_ms: 0,
            ..StorageConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
        assert_eq!(config.rescan_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_port_only_addr_binds_all_interfaces() {
        let mut config = ServerConfig::default();
        config.set_listen_addr(":8214").unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8214);
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8214);
        assert!(config.base_path.is_empty());
        assert!(!config.cors_permissive);
    }

    #[test]
    fn test_set_listen_addr() {
        let mut config = ServerConfig::default();

        config.set_listen_addr(":9000").unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);

        config.set_listen_addr("localhost:8080").unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8080);

        config.set_listen_addr("[::1]:7000").unwrap();
        assert_eq!(config.host, "::1");
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn test_set_listen_addr_invalid() {
        let mut config = ServerConfig::default();
        assert!(matches!(
            config.set_listen_addr("8080"),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(
            config.set_listen_addr("host:port"),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_normalized_base_path() {
        let mut config = ServerConfig::default();
        assert_eq!(config.normalized_base_path(), "");

        config.base_path = "proxy/8214".to_string();
        assert_eq!(config.normalized_base_path(), "/proxy/8214/");

        config.base_path = "/proxy/8214/".to_string();
        assert_eq!(config.normalized_base_path(), "/proxy/8214/");

        config.base_path = "/".to_string();
        assert_eq!(config.normalized_base_path(), "");
    }
}
