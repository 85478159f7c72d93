//! rpc-service: service registry and cached weather lookups over two TCP
//! transports.
//!
//! - Line RPC (JSON per line) on `port` for the service resource
//! - Binary RPC (length-prefixed bitcode) on `binary_port` for weather queries

mod config;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use application::{ServiceApp, WeatherApp};
use common::config::WeatherProvider;
use common::ServerConfig;
use entity_store::InMemoryServiceStore;
use openweather_client::{MockWeatherClient, OpenWeatherClient};
use weather_cache::{WeatherCache, WeatherFetcher};

#[derive(Parser)]
#[command(name = "rpc-service", about = "Service registry and weather RPC server")]
struct Cli {
    /// Interface to bind, overrides HOST.
    #[arg(long)]
    host: Option<String>,

    /// Line-RPC port, overrides PORT. The binary port follows unless set.
    #[arg(long)]
    port: Option<u16>,

    /// Serve deterministic mock weather instead of calling OpenWeatherMap.
    #[arg(long)]
    offline: bool,

    /// Validate the configuration, print it and exit.
    #[arg(long)]
    check_config: bool,
}

const STATS_INTERVAL: Duration = Duration::from_secs(60);
const WORKSPACE_TARGETS: [&str; 6] = [
    "rpc_service",
    "common",
    "entity_store",
    "weather_cache",
    "openweather_client",
    "application",
];

/// Fallback filter when `RUST_LOG` is unset. A bare level applies to the
/// workspace crates only; anything else is taken as a full directive string.
fn default_filter(log_level: &str) -> String {
    if log_level.contains('=') || log_level.contains(',') {
        return log_level.to_string();
    }
    WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, log_level))
        .collect::<Vec<_>>()
        .join(",")
}

fn build_fetcher(cfg: &ServerConfig) -> Result<Arc<dyn WeatherFetcher>, common::Error> {
    match cfg.weather.provider {
        WeatherProvider::OpenWeatherMap => {
            Ok(Arc::new(OpenWeatherClient::new(&cfg.weather)?))
        }
        WeatherProvider::Mock => Ok(Arc::new(MockWeatherClient::new())),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration before logging so LOG_LEVEL can seed the filter.
    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(host) = cli.host {
        cfg.host = host;
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    if cli.offline {
        cfg.weather.provider = WeatherProvider::Mock;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(&cfg.log_level).into()),
        )
        .with_target(true)
        .init();

    if let Err(e) = config::validate_config(&cfg) {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    if cli.check_config {
        let mut shown = cfg.clone();
        if !shown.weather.api_key.is_empty() {
            shown.weather.api_key = "********".into();
        }
        match toml::to_string_pretty(&shown) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => println!("{:#?} ({})", shown, e),
        }
        return;
    }

    info!("rpc-service starting up...");
    info!("Environment: {}", cfg.env);
    info!(
        "Weather: provider={:?}, timeout={}s, cache_ttl={}s",
        cfg.weather.provider, cfg.weather.timeout_secs, cfg.weather.cache_ttl_secs
    );

    let fetcher = match build_fetcher(&cfg) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to build weather client: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(InMemoryServiceStore::new());
    let cache = Arc::new(WeatherCache::new(
        fetcher,
        Duration::from_secs(cfg.weather.cache_ttl_secs),
    ));
    let service_app = ServiceApp::new(store);
    let weather_app = WeatherApp::new(cache.clone());

    let line_listener = match TcpListener::bind(cfg.line_addr()).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind line-rpc on {}: {}", cfg.line_addr(), e);
            std::process::exit(1);
        }
    };
    let binary_listener = match TcpListener::bind(cfg.binary_addr()).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind binary-rpc on {}: {}", cfg.binary_addr(), e);
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let request_timeout = Duration::from_secs(cfg.request_timeout_secs);

    let line_handle = tokio::spawn(transport::line::serve(
        line_listener,
        service_app,
        request_timeout,
        shutdown.clone(),
    ));
    let binary_handle = tokio::spawn(transport::binary::serve(
        binary_listener,
        weather_app,
        request_timeout,
        shutdown.clone(),
    ));

    // Periodic cache stats at debug level.
    let stats_handle = {
        let cache = cache.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATS_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let stats = cache.stats();
                        tracing::debug!(
                            "Cache: entries={} hits={} misses={} expired={} fetches={} failures={}",
                            stats.entries, stats.hits, stats.misses, stats.expired,
                            stats.fetches, stats.fetch_failures
                        );
                    }
                }
            }
        })
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
    shutdown.cancel();

    for (name, handle) in [("line-rpc", line_handle), ("binary-rpc", binary_handle)] {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("{} listener failed: {}", name, e),
            Err(e) => error!("{} listener task panicked: {}", name, e),
        }
    }
    let _ = stats_handle.await;

    info!("rpc-service stopped");
}
