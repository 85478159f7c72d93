//! Input validation.
//!
//! Each validator collects every problem it finds; callers surface only the
//! first one.

use common::{Error, MAX_SERVICE_DATA_LENGTH, MAX_SERVICE_NAME_LENGTH};

use crate::dto::{CurrentWeatherRequest, ForecastRequest};

pub const MAX_CITY_LENGTH: usize = 100;
pub const DEFAULT_FORECAST_DAYS: u32 = 5;
pub const MAX_FORECAST_DAYS: i32 = 7;

pub fn service_name_issues(name: &str) -> Vec<String> {
    let mut issues: Vec<String> = Vec::new();

    if name.is_empty() {
        issues.push("service name cannot be empty".into());
    }
    if name.chars().count() > MAX_SERVICE_NAME_LENGTH {
        issues.push(format!(
            "service name exceeds maximum length of {} characters",
            MAX_SERVICE_NAME_LENGTH
        ));
    }

    issues
}

pub fn service_data_issues(data: &str) -> Vec<String> {
    let mut issues: Vec<String> = Vec::new();

    if data.chars().count() > MAX_SERVICE_DATA_LENGTH {
        issues.push(format!(
            "service data exceeds maximum length of {} characters",
            MAX_SERVICE_DATA_LENGTH
        ));
    }

    issues
}

pub fn location_issues(city: &str, lat: f64, lon: f64) -> Vec<String> {
    let mut issues: Vec<String> = Vec::new();

    if city.is_empty() && (lat == 0.0 || lon == 0.0) {
        issues.push("either city name or coordinates (lat, lon) must be provided".into());
    }
    if !(-90.0..=90.0).contains(&lat) {
        issues.push("latitude must be between -90 and 90".into());
    }
    if !(-180.0..=180.0).contains(&lon) {
        issues.push("longitude must be between -180 and 180".into());
    }
    if city.chars().count() > MAX_CITY_LENGTH {
        issues.push(format!(
            "city name exceeds maximum length of {} characters",
            MAX_CITY_LENGTH
        ));
    }

    issues
}

pub fn current_weather_issues(req: &CurrentWeatherRequest) -> Vec<String> {
    location_issues(&req.city, req.lat, req.lon)
}

/// Location problems win; the day count is only judged for a valid location.
pub fn forecast_issues(req: &ForecastRequest) -> Vec<String> {
    let issues = location_issues(&req.city, req.lat, req.lon);
    if !issues.is_empty() {
        return issues;
    }

    if req.days > MAX_FORECAST_DAYS {
        return vec![format!("days must be between 1 and {}", MAX_FORECAST_DAYS)];
    }
    Vec::new()
}

/// Zero or negative selects the default; callers validate the upper bound first.
pub fn effective_days(days: i32) -> u32 {
    if days < 1 {
        DEFAULT_FORECAST_DAYS
    } else {
        days.min(MAX_FORECAST_DAYS) as u32
    }
}

/// First issue as a validation error on `field`, if any.
pub fn first_issue(field: &str, issues: Vec<String>) -> Result<(), Error> {
    match issues.into_iter().next() {
        Some(message) => Err(Error::validation(field, message)),
        None => Ok(()),
    }
}
