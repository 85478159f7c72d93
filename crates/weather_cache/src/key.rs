//! Cache key normalisation.
//!
//! A non-empty city wins: the key is the lower-cased city name and the
//! coordinates are ignored. Otherwise the coordinates are rounded to four
//! decimals. The same place asked for by name once and by coordinates once
//! produces two different keys.

use std::fmt;

use common::Location;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocationKey {
    City(String),
    /// Pre-formatted `lat_lon` so the key never hashes a float.
    Coordinates(String),
}

impl From<&Location> for LocationKey {
    fn from(location: &Location) -> Self {
        if !location.city.is_empty() {
            LocationKey::City(location.city.to_lowercase())
        } else {
            LocationKey::Coordinates(format!("{:.4}_{:.4}", location.lat, location.lon))
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKey::City(city) => f.write_str(city),
            LocationKey::Coordinates(coords) => f.write_str(coords),
        }
    }
}

/// Which query populated an entry. Forecasts for different day counts never
/// share an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Current,
    Forecast { days: u32 },
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::Current => f.write_str("current"),
            QueryKind::Forecast { days } => write!(f, "forecast_{}", days),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: QueryKind,
    pub location: LocationKey,
}

impl CacheKey {
    pub fn new(kind: QueryKind, location: &Location) -> Self {
        Self {
            kind,
            location: LocationKey::from(location),
        }
    }

    pub fn current(location: &Location) -> Self {
        Self::new(QueryKind::Current, location)
    }

    pub fn forecast(location: &Location, days: u32) -> Self {
        Self::new(QueryKind::Forecast { days }, location)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.location)
    }
}
