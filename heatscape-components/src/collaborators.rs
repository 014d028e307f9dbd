//! Contracts of the external services the engine consumes
//!
//! Only the minimal inputs and outputs are modelled here; transport is left to the
//! implementations supplied by the host.

use async_trait::async_trait;
use heatscape_core::errors::HeatscapeResult;
use heatscape_core::geo::GeoCoordinate;
use heatscape_core::FloatValue;
use serde::{Deserialize, Serialize};

use crate::narrative::{NarrativeReply, NarrativeRequest};
use crate::regions::RegionBoundary;

/// A city to request weather for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CityQuery {
    /// City name, also the key of the city across components
    pub name: String,
    /// Country hint for disambiguation, e.g. `"PH"`
    pub country: Option<String>,
}

impl CityQuery {
    pub fn new(name: impl Into<String>, country: Option<&str>) -> Self {
        Self {
            name: name.into(),
            country: country.map(str::to_string),
        }
    }
}

/// Fields of a weather response used by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub location: GeoCoordinate,
    /// unit: °C
    pub temperature_c: FloatValue,
    /// unit: %
    pub humidity_pct: FloatValue,
    /// unit: km / h
    pub wind_speed_kph: FloatValue,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Current conditions for a single city
    ///
    /// Errors affect only this city; a batch refresh carries on with the others.
    async fn current(&self, city: &CityQuery) -> HeatscapeResult<WeatherObservation>;
}

#[async_trait]
pub trait NarrativeProvider: Send + Sync {
    async fn narrate(&self, request: &NarrativeRequest) -> HeatscapeResult<NarrativeReply>;
}

#[async_trait]
pub trait RegionBoundaryProvider: Send + Sync {
    /// Boundary polygons of a named region
    async fn boundary(&self, region: &str) -> HeatscapeResult<RegionBoundary>;
}
