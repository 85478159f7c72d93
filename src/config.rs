//! Configuration loader: merges `.env`, `config.toml` and environment variables.

use std::path::Path;

use common::config::{ServerConfig, WeatherProvider};
use common::Error;

fn parse_port(raw: &str, env_name: &str) -> Result<u16, Error> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| Error::Config(format!("{env_name} must be a port number (0-65535)")))
}

fn parse_secs(raw: &str, env_name: &str) -> Result<u64, Error> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a whole number of seconds")))
}

fn parse_provider(raw: &str) -> Result<WeatherProvider, Error> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "openweathermap" | "owm" => Ok(WeatherProvider::OpenWeatherMap),
        "mock" | "offline" => Ok(WeatherProvider::Mock),
        _ => Err(Error::Config(
            "WEATHER_PROVIDER must be one of: openweathermap, mock".into(),
        )),
    }
}

/// Apply environment overrides read through `var`.
fn apply_env<F>(config: &mut ServerConfig, var: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = var("HOST") {
        config.host = host;
    }
    if let Some(raw) = var("PORT") {
        config.port = parse_port(&raw, "PORT")?;
    }
    if let Some(raw) = var("BINARY_PORT") {
        config.binary_port = Some(parse_port(&raw, "BINARY_PORT")?);
    }
    if let Some(env) = var("ENV") {
        config.env = env;
    }
    if let Some(level) = var("LOG_LEVEL") {
        config.log_level = level;
    }
    if let Some(raw) = var("REQUEST_TIMEOUT") {
        config.request_timeout_secs = parse_secs(&raw, "REQUEST_TIMEOUT")?;
    }

    if let Some(raw) = var("WEATHER_PROVIDER") {
        config.weather.provider = parse_provider(&raw)?;
    }
    if let Some(key) = var("WEATHER_API_KEY") {
        config.weather.api_key = key;
    }
    if let Some(url) = var("WEATHER_API_URL") {
        config.weather.base_url = url;
    }
    if let Some(raw) = var("WEATHER_TIMEOUT") {
        config.weather.timeout_secs = parse_secs(&raw, "WEATHER_TIMEOUT")?;
    }
    if let Some(raw) = var("WEATHER_CACHE_TTL") {
        config.weather.cache_ttl_secs = parse_secs(&raw, "WEATHER_CACHE_TTL")?;
    }

    Ok(())
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.host.trim().is_empty() {
        issues.push("host must not be empty".into());
    }
    if config.binary_port() == config.port {
        issues.push("binary_port must differ from port".into());
    }
    if config.request_timeout_secs == 0 {
        issues.push("request_timeout_secs must be > 0".into());
    }
    if config.weather.timeout_secs == 0 {
        issues.push("weather.timeout_secs must be > 0".into());
    }
    if config.weather.provider == WeatherProvider::OpenWeatherMap {
        if config.weather.api_key.trim().is_empty() {
            issues.push(
                "WEATHER_API_KEY is required for the openweathermap provider (or use --offline)"
                    .into(),
            );
        }
        if !config.weather.base_url.starts_with("http://")
            && !config.weather.base_url.starts_with("https://")
        {
            issues.push("weather.base_url must be an http(s) URL".into());
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load server configuration from defaults, `config.toml` and the environment.
///
/// Validation is left to the caller so command-line overrides can be applied first.
pub fn load_config() -> Result<ServerConfig, Error> {
    // 1. Load .env file from the working directory or its parents.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults, replaced wholesale by config.toml if present.
    let mut config = ServerConfig::default();

    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 3. Environment variables take priority.
    apply_env(&mut config, |name| std::env::var(name).ok())?;

    Ok(config)
}
