//! Engine configuration
//!
//! Every section is optional in the TOML file; missing values take their defaults.
//!
//! ```toml
//! initial_year = 2020
//!
//! [horizon]
//! start = 2015
//! end = 2030
//!
//! [refresh]
//! interval_secs = 600
//!
//! [[cities]]
//! name = "Manila"
//! country = "PH"
//! ```

use heatscape_core::errors::{HeatscapeError, HeatscapeResult};
use heatscape_core::projection::{HorizonRange, ProjectionParameters};
use heatscape_core::scenario::BASELINE_RATE_PERCENT;
use heatscape_core::{FloatValue, Year};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::collaborators::CityQuery;
use crate::heat_field::PulseParameters;
use crate::jitter::{GeoJitterSampler, JitterParameters};
use crate::narrative::NarrativeParameters;
use crate::overlay::OverlayParameters;
use crate::regions::RegionSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshParameters {
    /// Time between weather refreshes
    ///
    /// unit: s
    ///
    /// Default: 600
    pub interval_secs: u64,
}

impl Default for RefreshParameters {
    fn default() -> Self {
        Self { interval_secs: 600 }
    }
}

impl RefreshParameters {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub projection: ProjectionParameters,
    pub horizon: HorizonRange,
    /// Year selected when the session starts
    pub initial_year: Year,
    /// unit: %
    pub initial_rate: FloatValue,
    pub cities: Vec<CityQuery>,
    pub refresh: RefreshParameters,
    pub jitter: JitterParameters,
    pub pulse: PulseParameters,
    pub overlay: OverlayParameters,
    pub narrative: NarrativeParameters,
    /// Regions of the choropleth; empty disables it
    pub regions: Vec<RegionSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cities = ["Manila", "Cebu City", "Davao City", "Baguio", "Iloilo City"]
            .into_iter()
            .map(|name| CityQuery::new(name, Some("PH")))
            .collect();
        Self {
            projection: ProjectionParameters::default(),
            horizon: HorizonRange::default(),
            initial_year: 2020,
            initial_rate: BASELINE_RATE_PERCENT,
            cities,
            refresh: RefreshParameters::default(),
            jitter: JitterParameters::default(),
            pulse: PulseParameters::default(),
            overlay: OverlayParameters::default(),
            narrative: NarrativeParameters::default(),
            regions: vec![],
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML configuration
    pub fn from_toml_str(contents: &str) -> HeatscapeResult<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| HeatscapeError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> HeatscapeResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            HeatscapeError::ConfigError(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> HeatscapeResult<String> {
        toml::to_string(self).map_err(|e| HeatscapeError::ConfigError(e.to_string()))
    }

    /// Check the values that parsing alone cannot
    pub fn validate(&self) -> HeatscapeResult<()> {
        self.horizon
            .validate()
            .map_err(|e| HeatscapeError::ConfigError(e.to_string()))?;
        self.pulse.validate()?;
        GeoJitterSampler::new(self.jitter)?;

        let growth = self.projection.co2_growth_factor;
        if !growth.is_finite() || growth <= 0.0 {
            return Err(HeatscapeError::ConfigError(format!(
                "CO2 growth factor must be positive, got {}",
                growth
            )));
        }
        if !(0.0..=100.0).contains(&self.initial_rate) {
            return Err(HeatscapeError::ConfigError(format!(
                "Initial rate must be within [0, 100], got {}",
                self.initial_rate
            )));
        }
        if self.refresh.interval_secs == 0 {
            return Err(HeatscapeError::ConfigError(
                "Refresh interval must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for city in &self.cities {
            if !seen.insert(city.name.as_str()) {
                return Err(HeatscapeError::ConfigError(format!(
                    "City {} is configured more than once",
                    city.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::JitterWeight;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cities.len(), 5);
        assert_eq!(config.horizon, HorizonRange::new(2015, 2030).unwrap());
        assert_eq!(config.refresh.period(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            initial_rate = 40.0

            [projection]
            co2_growth_factor = 1.02

            [jitter]
            radius_meters = 5000.0
            weight = "inherit_temperature"

            [[cities]]
            name = "Zamboanga City"
            country = "PH"

            [[regions]]
            name = "Metro Manila"
            fill = [255, 140, 0, 80]
            stroke = [180, 60, 0, 255]
            "#,
        )
        .unwrap();

        assert_eq!(config.initial_rate, 40.0);
        assert_eq!(config.projection.co2_growth_factor, 1.02);
        assert_eq!(config.projection.baseline_rate_percent, 70.0);
        assert_eq!(config.jitter.radius_meters, 5000.0);
        assert_eq!(config.jitter.weight, JitterWeight::InheritTemperature);
        assert_eq!(config.jitter.count_multiplier, 40);
        assert_eq!(config.cities, vec![CityQuery::new("Zamboanga City", Some("PH"))]);
        assert_eq!(config.regions[0].stroke, [180, 60, 0, 255]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for contents in [
            "initial_rate = 120.0",
            "[horizon]\nstart = 2030\nend = 2015",
            "[refresh]\ninterval_secs = 0",
            "[jitter]\nradius_meters = -5.0",
            "[projection]\nco2_growth_factor = 0.0",
            "[[cities]]\nname = \"Manila\"\n[[cities]]\nname = \"Manila\"",
            "initial_year = \"soon\"",
        ] {
            assert!(
                matches!(
                    EngineConfig::from_toml_str(contents),
                    Err(HeatscapeError::ConfigError(_))
                ),
                "accepted {:?}",
                contents
            );
        }
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = EngineConfig::default();
        let serialised = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&serialised).unwrap(), config);
    }
}
