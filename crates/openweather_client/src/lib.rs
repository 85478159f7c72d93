//! OpenWeatherMap API client.
//!
//! Fetches current conditions from `/weather` and the 3-hourly forecast from
//! `/forecast`, converting both to the shared weather types. Forecast rows are
//! folded into one [`DailyForecast`] per calendar day (UTC).

pub mod mock;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use common::config::WeatherApiConfig;
use common::{
    CurrentWeather, DailyForecast, Error, Location, RequestContext, Result, WeatherCondition,
    WeatherForecast,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use weather_cache::WeatherFetcher;

pub use mock::MockWeatherClient;

const KELVIN_OFFSET: f64 = 273.15;
const DEFAULT_FORECAST_DAYS: u32 = 5;
const MAX_FORECAST_DAYS: u32 = 7;
/// The forecast endpoint returns one row every three hours.
const ROWS_PER_DAY: u32 = 8;

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

// ── OpenWeatherMap response types ─────────────────────────────────────

/// Response from `/weather`.
#[derive(Debug, Deserialize)]
pub struct CurrentResponse {
    #[serde(default)]
    pub weather: Vec<ConditionDto>,
    #[serde(default)]
    pub main: MainDto,
    #[serde(default)]
    pub visibility: i32,
    #[serde(default)]
    pub wind: WindDto,
    #[serde(default)]
    pub clouds: CloudsDto,
    #[serde(default)]
    pub dt: i64,
    #[serde(default)]
    pub sys: SysDto,
    #[serde(default)]
    pub name: String,
}

/// Response from `/forecast`.
#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub city: CityDto,
    #[serde(default)]
    pub list: Vec<ForecastItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConditionDto {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

/// Temperatures in Kelvin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MainDto {
    #[serde(default)]
    pub temp: f64,
    #[serde(default)]
    pub feels_like: f64,
    #[serde(default)]
    pub temp_min: f64,
    #[serde(default)]
    pub temp_max: f64,
    #[serde(default)]
    pub pressure: i32,
    #[serde(default)]
    pub humidity: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindDto {
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub deg: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudsDto {
    #[serde(default)]
    pub all: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SysDto {
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CityDto {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RainDto {
    #[serde(rename = "3h", default)]
    pub three_hours: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastItem {
    pub dt: i64,
    #[serde(default)]
    pub main: MainDto,
    #[serde(default)]
    pub weather: Vec<ConditionDto>,
    #[serde(default)]
    pub clouds: CloudsDto,
    #[serde(default)]
    pub wind: WindDto,
    #[serde(default)]
    pub pop: f64,
    #[serde(default)]
    pub rain: Option<RainDto>,
}

/// Error payload; `message` explains a 404.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

// ── Implementation ────────────────────────────────────────────────────

impl OpenWeatherClient {
    pub fn new(config: &WeatherApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("rpc-service/0.1")
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Config(format!("failed to build weather HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn location_query(&self, location: &Location) -> Vec<(&'static str, String)> {
        let mut query = if location.city.is_empty() {
            vec![
                ("lat", location.lat.to_string()),
                ("lon", location.lon.to_string()),
            ]
        } else {
            vec![("q", location.city.clone())]
        };
        query.push(("appid", self.api_key.clone()));
        query
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        path: &str,
        query: &[(&'static str, String)],
        location: &Location,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("Fetching OpenWeatherMap {} for {}", url, location.label());

        let mut req = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(query);
        // Never wait past the caller's deadline, even if the client timeout is longer.
        if let Some(remaining) = ctx.remaining() {
            req = req.timeout(remaining);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| {
                Error::UpstreamUnavailable(format!("HTTP error for {}: {}", location.label(), e))
            })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| {
            Error::UpstreamUnavailable(format!(
                "failed to read response for {}: {}",
                location.label(),
                e
            ))
        })?;

        if status != 200 {
            return Err(status_error(status, &body, location));
        }

        serde_json::from_str(&body).map_err(|e| {
            Error::UpstreamUnavailable(format!(
                "malformed response for {}: {}",
                location.label(),
                e
            ))
        })
    }
}

#[async_trait]
impl WeatherFetcher for OpenWeatherClient {
    async fn fetch_current(
        &self,
        ctx: &RequestContext,
        location: &Location,
    ) -> Result<CurrentWeather> {
        let query = self.location_query(location);
        let resp: CurrentResponse = self.get_json(ctx, "weather", &query, location).await?;
        Ok(map_current(resp, location.clone()))
    }

    async fn fetch_forecast(
        &self,
        ctx: &RequestContext,
        location: &Location,
        days: u32,
    ) -> Result<WeatherForecast> {
        let days = clamp_days(days);
        let mut query = self.location_query(location);
        query.push(("cnt", (days * ROWS_PER_DAY).to_string()));

        let resp: ForecastResponse = self.get_json(ctx, "forecast", &query, location).await?;
        Ok(map_forecast(resp, location.clone(), days, Utc::now()))
    }
}

/// Out-of-range day counts fall back to the default instead of failing.
fn clamp_days(days: u32) -> u32 {
    if (1..=MAX_FORECAST_DAYS).contains(&days) {
        days
    } else {
        DEFAULT_FORECAST_DAYS
    }
}

fn status_error(status: u16, body: &str, location: &Location) -> Error {
    match status {
        401 => Error::Unauthorized,
        429 => Error::RateLimited,
        404 => {
            let detail = serde_json::from_str::<ApiErrorBody>(body)
                .map(|b| b.message)
                .unwrap_or_default();
            debug!("OpenWeatherMap 404 for {}: {}", location.label(), detail);
            Error::not_found("location", location.label())
        }
        _ => {
            let snippet: String = body.chars().take(500).collect();
            Error::UpstreamUnavailable(format!(
                "OpenWeatherMap returned {} for {}: {}",
                status,
                location.label(),
                snippet
            ))
        }
    }
}

fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

fn map_condition(conditions: &[ConditionDto]) -> WeatherCondition {
    conditions
        .first()
        .map(|c| WeatherCondition {
            code: c.id,
            main: c.main.clone(),
            description: c.description.clone(),
            icon: c.icon.clone(),
        })
        .unwrap_or_default()
}

fn map_current(resp: CurrentResponse, mut location: Location) -> CurrentWeather {
    if location.city.is_empty() {
        location.city = resp.name.clone();
    }
    if location.country.is_empty() {
        location.country = resp.sys.country.clone();
    }

    CurrentWeather {
        location,
        temperature: kelvin_to_celsius(resp.main.temp),
        feels_like: kelvin_to_celsius(resp.main.feels_like),
        humidity: resp.main.humidity,
        pressure: resp.main.pressure,
        wind_speed: resp.wind.speed,
        wind_direction: resp.wind.deg,
        cloudiness: resp.clouds.all,
        visibility: resp.visibility,
        condition: map_condition(&resp.weather),
        timestamp: from_unix(resp.dt),
    }
}

fn map_forecast(
    resp: ForecastResponse,
    mut location: Location,
    days: u32,
    now: DateTime<Utc>,
) -> WeatherForecast {
    if location.city.is_empty() {
        location.city = resp.city.name.clone();
    }
    location.country = resp.city.country.clone();

    // First midday row stands in for "current"; otherwise the earliest row.
    let current_temp = resp
        .list
        .iter()
        .find(|item| (12..=14).contains(&from_unix(item.dt).hour()))
        .or_else(|| resp.list.first())
        .map(|item| kelvin_to_celsius(item.main.temp))
        .unwrap_or_default();

    let mut current = CurrentWeather::basic(location.clone(), current_temp);
    current.timestamp = now;

    let forecasts = aggregate_daily(&resp.list)
        .into_iter()
        .take(days as usize)
        .collect();

    WeatherForecast {
        location,
        current,
        forecasts,
        generated_at: now,
    }
}

/// Fold 3-hourly rows into per-day summaries, oldest day first.
fn aggregate_daily(items: &[ForecastItem]) -> Vec<DailyForecast> {
    let mut by_day: BTreeMap<NaiveDate, Vec<&ForecastItem>> = BTreeMap::new();
    for item in items {
        by_day
            .entry(from_unix(item.dt).date_naive())
            .or_default()
            .push(item);
    }

    by_day
        .into_iter()
        .map(|(date, rows)| summarize_day(date, &rows))
        .collect()
}

fn summarize_day(date: NaiveDate, rows: &[&ForecastItem]) -> DailyForecast {
    let n = rows.len() as f64;
    let temps: Vec<(u32, f64)> = rows
        .iter()
        .map(|r| (from_unix(r.dt).hour(), kelvin_to_celsius(r.main.temp)))
        .collect();
    let mean_temp = temps.iter().map(|(_, t)| t).sum::<f64>() / n;

    // Mean of the rows whose hour falls in [from, to), or the daily mean.
    let period = |from: u32, to: u32| {
        let hits: Vec<f64> = temps
            .iter()
            .filter(|(h, _)| *h >= from && *h < to)
            .map(|(_, t)| *t)
            .collect();
        if hits.is_empty() {
            mean_temp
        } else {
            hits.iter().sum::<f64>() / hits.len() as f64
        }
    };

    let avg_i32 = |f: fn(&ForecastItem) -> i32| {
        (rows.iter().map(|r| f(r) as f64).sum::<f64>() / n).round() as i32
    };

    // Wind direction and condition come from the row closest to midday.
    let midday = rows
        .iter()
        .min_by_key(|r| (from_unix(r.dt).hour() as i32 - 12).abs())
        .copied();

    DailyForecast {
        date: date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now),
        temp_min: rows
            .iter()
            .map(|r| kelvin_to_celsius(r.main.temp_min))
            .fold(f64::INFINITY, f64::min),
        temp_max: rows
            .iter()
            .map(|r| kelvin_to_celsius(r.main.temp_max))
            .fold(f64::NEG_INFINITY, f64::max),
        temp_morning: period(6, 12),
        temp_day: period(12, 18),
        temp_evening: period(18, 24),
        temp_night: period(0, 6),
        humidity: avg_i32(|r| r.main.humidity),
        pressure: avg_i32(|r| r.main.pressure),
        wind_speed: rows.iter().map(|r| r.wind.speed).sum::<f64>() / n,
        wind_direction: midday.map(|r| r.wind.deg).unwrap_or_default(),
        cloudiness: avg_i32(|r| r.clouds.all),
        precipitation: rows
            .iter()
            .filter_map(|r| r.rain.as_ref())
            .map(|rain| rain.three_hours)
            .sum(),
        condition: midday
            .map(|r| map_condition(&r.weather))
            .unwrap_or_default(),
        pop: rows.iter().map(|r| r.pop).fold(0.0, f64::max),
    }
}
