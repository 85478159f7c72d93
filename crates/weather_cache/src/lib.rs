//! Weather data access: the upstream fetcher contract and the TTL cache in
//! front of it.

pub mod cache;
pub mod key;

use async_trait::async_trait;
use common::{CurrentWeather, Location, RequestContext, Result, WeatherForecast, WeatherReport};

pub use cache::{CacheStats, WeatherCache, DEFAULT_CACHE_TTL};
pub use key::{CacheKey, LocationKey, QueryKind};

/// Something that can retrieve live weather data, usually over the network.
///
/// Implementations may fail with any error; the cache treats every failure
/// the same way and never stores it.
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    async fn fetch_current(
        &self,
        ctx: &RequestContext,
        location: &Location,
    ) -> Result<CurrentWeather>;

    async fn fetch_forecast(
        &self,
        ctx: &RequestContext,
        location: &Location,
        days: u32,
    ) -> Result<WeatherForecast>;
}

/// Repository view of weather data used by the application layer.
#[async_trait]
pub trait WeatherRepository: Send + Sync {
    async fn get_current_weather(
        &self,
        ctx: &RequestContext,
        location: &Location,
    ) -> Result<CurrentWeather>;

    async fn get_forecast(
        &self,
        ctx: &RequestContext,
        location: &Location,
        days: u32,
    ) -> Result<WeatherForecast>;

    /// Read-only probe of the "current" slot; never fetches.
    async fn get_cached_weather(
        &self,
        ctx: &RequestContext,
        location: &Location,
    ) -> Result<WeatherReport>;

    /// Overwrite the "current" slot for the report's location.
    async fn cache_weather(&self, ctx: &RequestContext, report: WeatherReport) -> Result<()>;
}
