//! Domain types shared across the service.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

pub const MAX_SERVICE_NAME_LENGTH: usize = 100;
pub const MAX_SERVICE_DATA_LENGTH: usize = 10_000;

// ── Service entity ────────────────────────────────────────────────────

/// The generic named resource with a mutable payload and audit timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Timestamp-derived id, `<unix-nanos>-<sequence>`.
///
/// The sequence makes ids distinct even when two calls land on the same tick.
pub fn generate_id() -> String {
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros() * 1000);
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", nanos, seq)
}

impl Service {
    /// Build a new entity with a fresh id; fails if the name is invalid.
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        validate_service_name(&name)?;

        let now = Utc::now();
        Ok(Self {
            id: generate_id(),
            name,
            data: data.into(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the payload. `id` and `created_at` never change.
    pub fn update_data(&mut self, data: impl Into<String>) {
        self.data = data.into();
        self.updated_at = Utc::now();
    }

    /// Rename in place. Validated first, so a bad name leaves the entity untouched.
    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), Error> {
        let name = name.into();
        validate_service_name(&name)?;
        self.name = name;
        self.updated_at = Utc::now();
        Ok(())
    }
}

pub fn validate_service_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::validation("name", "service name cannot be empty"));
    }
    if name.chars().count() > MAX_SERVICE_NAME_LENGTH {
        return Err(Error::validation(
            "name",
            format!(
                "service name exceeds maximum length of {}",
                MAX_SERVICE_NAME_LENGTH
            ),
        ));
    }
    Ok(())
}

// ── Weather types ─────────────────────────────────────────────────────

/// A place to query, either by city name or by coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
}

impl Location {
    pub fn city(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            ..Default::default()
        }
    }

    pub fn coordinates(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ..Default::default()
        }
    }

    /// Human-readable label for logs and not-found errors.
    pub fn label(&self) -> String {
        if self.city.is_empty() {
            format!("({:.4},{:.4})", self.lat, self.lon)
        } else {
            self.city.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub code: i32,
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub location: Location,
    /// Degrees Celsius.
    pub temperature: f64,
    pub feels_like: f64,
    /// Percent.
    pub humidity: i32,
    /// hPa.
    pub pressure: i32,
    /// m/s.
    pub wind_speed: f64,
    /// Degrees.
    pub wind_direction: i32,
    pub cloudiness: i32,
    /// Metres.
    pub visibility: i32,
    pub condition: WeatherCondition,
    pub timestamp: DateTime<Utc>,
}

impl CurrentWeather {
    /// A reading with only location and temperature populated.
    pub fn basic(location: Location, temperature: f64) -> Self {
        Self {
            location,
            temperature,
            feels_like: temperature,
            humidity: 0,
            pressure: 0,
            wind_speed: 0.0,
            wind_direction: 0,
            cloudiness: 0,
            visibility: 0,
            condition: WeatherCondition::default(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: DateTime<Utc>,
    pub temp_min: f64,
    pub temp_max: f64,
    pub temp_morning: f64,
    pub temp_day: f64,
    pub temp_evening: f64,
    pub temp_night: f64,
    pub humidity: i32,
    pub pressure: i32,
    pub wind_speed: f64,
    pub wind_direction: i32,
    pub cloudiness: i32,
    /// Millimetres.
    pub precipitation: f64,
    pub condition: WeatherCondition,
    /// Probability of precipitation, 0..=1.
    pub pop: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecast {
    pub location: Location,
    pub current: CurrentWeather,
    pub forecasts: Vec<DailyForecast>,
    pub generated_at: DateTime<Utc>,
}

/// What the cache stores: current conditions and/or a forecast for one location.
///
/// Only the half that the populating query fetched is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub id: String,
    pub location: Location,
    pub current: Option<CurrentWeather>,
    pub forecast: Option<WeatherForecast>,
    pub requested_at: DateTime<Utc>,
    pub cached_at: Option<DateTime<Utc>>,
}

impl WeatherReport {
    pub fn from_current(location: Location, current: CurrentWeather) -> Self {
        Self {
            id: generate_id(),
            location,
            current: Some(current),
            forecast: None,
            requested_at: Utc::now(),
            cached_at: None,
        }
    }

    pub fn from_forecast(location: Location, forecast: WeatherForecast) -> Self {
        Self {
            id: generate_id(),
            location,
            current: None,
            forecast: Some(forecast),
            requested_at: Utc::now(),
            cached_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_service_populates_fields() {
        let service = Service::new("test-service", "test data").unwrap();
        assert!(!service.id.is_empty());
        assert_eq!(service.name, "test-service");
        assert_eq!(service.data, "test data");
        assert_eq!(service.created_at, service.updated_at);
    }

    #[test]
    fn test_service_name_validation() {
        assert!(Service::new("valid-name", "data").is_ok());
        assert!(Service::new("", "data").is_err());
        assert!(Service::new("a".repeat(101), "data").is_err());
        assert!(Service::new("a".repeat(100), "data").is_ok());
    }

    #[test]
    fn test_update_data_keeps_identity() {
        let mut service = Service::new("test", "initial data").unwrap();
        let id = service.id.clone();
        let created_at = service.created_at;

        service.update_data("updated data");

        assert_eq!(service.id, id);
        assert_eq!(service.created_at, created_at);
        assert_eq!(service.data, "updated data");
        assert!(service.updated_at >= service.created_at);
    }

    #[test]
    fn test_rename_rejects_empty_and_leaves_name() {
        let mut service = Service::new("original", "data").unwrap();
        assert!(service.rename("").is_err());
        assert_eq!(service.name, "original");

        service.rename("updated").unwrap();
        assert_eq!(service.name, "updated");
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_location_label() {
        assert_eq!(Location::city("Paris").label(), "Paris");
        assert_eq!(
            Location::coordinates(48.85661, 2.35222).label(),
            "(48.8566,2.3522)"
        );
    }
}
