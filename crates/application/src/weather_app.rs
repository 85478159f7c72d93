//! Weather resource use cases.

use std::sync::Arc;

use common::{
    CurrentWeather, Error, Location, RequestContext, Result, WeatherForecast, WeatherReport,
};
use tracing::debug;
use weather_cache::WeatherRepository;

use crate::dto::{CurrentWeatherRequest, ForecastRequest};
use crate::validator::{current_weather_issues, effective_days, first_issue, forecast_issues};

/// Re-qualify a repository not-found with the resource kind and the city asked for.
fn qualify_not_found(err: Error, resource: &str, location: &Location) -> Error {
    if err.is_not_found() {
        Error::not_found(resource, location.label())
    } else {
        err
    }
}

#[derive(Clone)]
pub struct WeatherApp {
    repo: Arc<dyn WeatherRepository>,
}

impl WeatherApp {
    pub fn new(repo: Arc<dyn WeatherRepository>) -> Self {
        Self { repo }
    }

    pub async fn get_current_weather(
        &self,
        ctx: &RequestContext,
        req: CurrentWeatherRequest,
    ) -> Result<CurrentWeather> {
        first_issue("request", current_weather_issues(&req))?;

        let location = req.location();
        self.repo
            .get_current_weather(ctx, &location)
            .await
            .map_err(|e| qualify_not_found(e, "weather", &location))
    }

    pub async fn get_forecast(
        &self,
        ctx: &RequestContext,
        req: ForecastRequest,
    ) -> Result<WeatherForecast> {
        first_issue("request", forecast_issues(&req))?;

        let days = effective_days(req.days);
        let location = req.location();
        debug!("Forecast for {} over {} days", location.label(), days);

        self.repo
            .get_forecast(ctx, &location, days)
            .await
            .map_err(|e| qualify_not_found(e, "weather_forecast", &location))
    }

    /// Cached "current" report, without fetching.
    pub async fn get_cached_weather(
        &self,
        ctx: &RequestContext,
        location: &Location,
    ) -> Result<WeatherReport> {
        self.repo.get_cached_weather(ctx, location).await
    }

    pub async fn cache_weather(&self, ctx: &RequestContext, report: WeatherReport) -> Result<()> {
        self.repo.cache_weather(ctx, report).await
    }
}
