use config::{Config, File};
pub use config::ConfigError;
use serde::Deserialize;

use crate::grid::errors::{GridError, GridResult};
use crate::grid::planner::DEFAULT_MIN_NOTIONAL_FLOOR;

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Settings {
    /// Exchange credentials and connection settings
    #[serde(default)]
    pub binance: BinanceSettings,
    /// Tracked grid persistence
    #[serde(default)]
    pub state: StateConfig,
    /// Grid planning defaults
    #[serde(default)]
    pub grid: GridDefaults,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceSettings {
    #[serde(default)]
    pub api_key: String,
    /// Also accepted as `secret_key`
    #[serde(default, alias = "secret_key")]
    pub api_secret: String,
    /// REST base url (default https://fapi.binance.com)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    /// Per-request network timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Minimum spacing between two requests
    #[serde(default = "default_min_request_interval")]
    pub min_request_interval_ms: u64,
    /// Attempts for read-only requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            base_url: default_base_url(),
            recv_window_ms: default_recv_window(),
            timeout_secs: default_timeout(),
            min_request_interval_ms: default_min_request_interval(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
        }
    }
}

impl BinanceSettings {
    /// Credentials must be present before anything talks to the exchange
    pub fn validate(&self) -> GridResult<()> {
        if self.api_key.trim().is_empty() || self.api_secret.trim().is_empty() {
            return Err(GridError::Configuration(
                "missing binance api_key or api_secret".into(),
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_recv_window() -> u64 {
    5000
}

fn default_timeout() -> u64 {
    10
}

fn default_min_request_interval() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    200
}

#[derive(Debug, Deserialize)]
pub struct StateConfig {
    /// JSON file holding tracked grids
    #[serde(default = "default_state_file")]
    pub file: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            file: default_state_file(),
        }
    }
}

fn default_state_file() -> String {
    "grid_state.json".to_string()
}

#[derive(Debug, Deserialize)]
pub struct GridDefaults {
    /// Leverage used when a request does not name one
    #[serde(default = "default_leverage")]
    pub default_leverage: u32,
    /// Notional floor applied on top of the exchange minimum
    #[serde(default = "default_min_notional_floor")]
    pub min_notional_floor: f64,
}

impl Default for GridDefaults {
    fn default() -> Self {
        Self {
            default_leverage: default_leverage(),
            min_notional_floor: default_min_notional_floor(),
        }
    }
}

fn default_leverage() -> u32 {
    20
}

fn default_min_notional_floor() -> f64 {
    DEFAULT_MIN_NOTIONAL_FLOOR
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Server port (default 5000)
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Server host (default 127.0.0.1)
    #[serde(default = "default_server_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            host: default_server_host(),
        }
    }
}

fn default_server_port() -> u16 {
    5000
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

impl Settings {
    /// Load settings from a configuration file
    ///
    /// Environment variables override the file, e.g.
    /// `APP_BINANCE__API_KEY=...`; `BINANCE_API_KEY` and `BINANCE_API_SECRET`
    /// are honoured as well.
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .set_override_option("binance.api_key", std::env::var("BINANCE_API_KEY").ok())?
            .set_override_option(
                "binance.api_secret",
                std::env::var("BINANCE_API_SECRET").ok(),
            )?
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.binance.base_url, "https://fapi.binance.com");
        assert_eq!(settings.state.file, "grid_state.json");
        assert_eq!(settings.grid.default_leverage, 20);
        assert_eq!(settings.grid.min_notional_floor, 5.0);
        assert_eq!(settings.server.port, 5000);
    }

    #[test]
    fn test_missing_credentials() {
        let settings = BinanceSettings::default();
        assert!(matches!(
            settings.validate(),
            Err(GridError::Configuration(_))
        ));

        let settings = BinanceSettings {
            api_key: "key".into(),
            api_secret: "secret".into(),
            ..BinanceSettings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("grid_settings_{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"
[binance]
api_key = "abc"
secret_key = "def"

[state]
file = "/tmp/tracked.json"

[grid]
default_leverage = 10

[server]
port = 8080
"#,
        )
        .unwrap();

        let settings = Settings::new(path.to_str().unwrap()).unwrap();
        if std::env::var("BINANCE_API_KEY").is_err() {
            assert_eq!(settings.binance.api_key, "abc");
        }
        if std::env::var("BINANCE_API_SECRET").is_err() {
            assert_eq!(settings.binance.api_secret, "def");
        }
        assert_eq!(settings.state.file, "/tmp/tracked.json");
        assert_eq!(settings.grid.default_leverage, 10);
        assert_eq!(settings.grid.min_notional_floor, 5.0);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "127.0.0.1");

        std::fs::remove_file(&path).unwrap();
    }
}
