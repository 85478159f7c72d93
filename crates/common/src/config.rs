//! Server configuration types.

use serde::{Deserialize, Serialize};

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface both listeners bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Line-RPC (service resource) port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Binary-RPC (weather resource) port. Defaults to `port + 1`.
    #[serde(default)]
    pub binary_port: Option<u16>,

    /// Deployment label, only logged.
    #[serde(default = "default_env")]
    pub env: String,

    /// Fallback tracing filter level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deadline applied to every inbound request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upstream weather provider settings.
    #[serde(default)]
    pub weather: WeatherApiConfig,
}

/// Which fetcher backs the weather cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherProvider {
    OpenWeatherMap,
    /// Deterministic offline data, no network.
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherApiConfig {
    #[serde(default = "default_provider")]
    pub provider: WeatherProvider,

    /// OpenWeatherMap `appid`.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP client timeout per upstream call.
    #[serde(default = "default_weather_timeout")]
    pub timeout_secs: u64,

    /// Time-to-live of cached weather entries.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl ServerConfig {
    pub fn binary_port(&self) -> u16 {
        self.binary_port.unwrap_or_else(|| self.port.saturating_add(1))
    }

    pub fn line_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn binary_addr(&self) -> String {
        format!("{}:{}", self.host, self.binary_port())
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    1234
}
fn default_env() -> String {
    "development".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_request_timeout() -> u64 {
    30
}

fn default_provider() -> WeatherProvider {
    WeatherProvider::OpenWeatherMap
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_weather_timeout() -> u64 {
    10
}
fn default_cache_ttl() -> u64 {
    15 * 60
}

impl Default for WeatherApiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            base_url: default_base_url(),
            timeout_secs: default_weather_timeout(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            binary_port: None,
            env: default_env(),
            log_level: default_log_level(),
            request_timeout_secs: default_request_timeout(),
            weather: WeatherApiConfig::default(),
        }
    }
}
