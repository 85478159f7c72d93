//! Deterministic offline fetcher for `--offline` runs and tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{
    CurrentWeather, DailyForecast, Error, Location, RequestContext, Result, WeatherCondition,
    WeatherForecast,
};
use weather_cache::WeatherFetcher;

#[derive(Debug, Default)]
pub struct MockWeatherClient {
    should_fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockWeatherClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose every fetch fails with `UpstreamUnavailable`.
    pub fn failing() -> Self {
        let client = Self::default();
        client.set_failing(true);
        client
    }

    pub fn set_failing(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Fetches attempted so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::UpstreamUnavailable("simulated upstream failure".into()));
        }
        Ok(())
    }
}

fn clear_sky() -> WeatherCondition {
    WeatherCondition {
        code: 800,
        main: "Clear".into(),
        description: "clear sky".into(),
        icon: "01d".into(),
    }
}

fn mock_current(location: &Location) -> CurrentWeather {
    CurrentWeather {
        location: location.clone(),
        temperature: 20.5,
        feels_like: 19.2,
        humidity: 60,
        pressure: 1015,
        wind_speed: 3.0,
        wind_direction: 180,
        cloudiness: 20,
        visibility: 10_000,
        condition: clear_sky(),
        timestamp: Utc::now(),
    }
}

#[async_trait]
impl WeatherFetcher for MockWeatherClient {
    async fn fetch_current(
        &self,
        _ctx: &RequestContext,
        location: &Location,
    ) -> Result<CurrentWeather> {
        self.begin()?;
        Ok(mock_current(location))
    }

    async fn fetch_forecast(
        &self,
        _ctx: &RequestContext,
        location: &Location,
        days: u32,
    ) -> Result<WeatherForecast> {
        self.begin()?;

        let now = Utc::now();
        let forecasts = (0..days)
            .map(|i| {
                let step = i as f64;
                DailyForecast {
                    date: now + chrono::Duration::days(i as i64 + 1),
                    temp_min: 15.0 + step,
                    temp_max: 25.0 + step,
                    temp_morning: 16.0 + step,
                    temp_day: 24.0 + step,
                    temp_evening: 20.0 + step,
                    temp_night: 17.0 + step,
                    humidity: 60 + i as i32 * 5,
                    pressure: 1010 + i as i32,
                    wind_speed: 3.0 + step,
                    wind_direction: 180 + i as i32 * 10,
                    cloudiness: 20 + i as i32 * 10,
                    precipitation: 0.0,
                    condition: clear_sky(),
                    pop: 0.1,
                }
            })
            .collect();

        Ok(WeatherForecast {
            location: location.clone(),
            current: mock_current(location),
            forecasts,
            generated_at: now,
        })
    }
}
