//! Request payloads accepted by the application layer.
//!
//! Every field is optional on the wire; missing fields take their zero value
//! and are then judged by the validators.

use common::Location;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: String,
}

/// Absent or empty fields leave the stored value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateServiceRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl UpdateServiceRequest {
    pub fn new_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    pub fn new_data(&self) -> Option<&str> {
        self.data.as_deref().filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeatherRequest {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
}

impl CurrentWeatherRequest {
    pub fn location(&self) -> Location {
        Location {
            city: self.city.clone(),
            lat: self.lat,
            lon: self.lon,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    /// Zero or negative selects the default day count.
    #[serde(default)]
    pub days: i32,
}

impl ForecastRequest {
    pub fn location(&self) -> Location {
        Location {
            city: self.city.clone(),
            lat: self.lat,
            lon: self.lon,
            ..Default::default()
        }
    }
}
