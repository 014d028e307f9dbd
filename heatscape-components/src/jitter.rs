//! Jittered density clouds around city samples
//!
//! A handful of city readings is far too sparse for a heat map, so every sample is
//! expanded into a cloud of synthetic points scattered around it. This is a visual
//! approximation of a continuous field, not an interpolation.
//!
//! Offsets are drawn independently and uniformly in $[-r, r]$ along each axis and then
//! converted to degrees. Candidates falling outside the disc of radius $r$ are redrawn,
//! so no point lands farther than $r$ from its source.

use heatscape_core::errors::{HeatscapeError, HeatscapeResult};
use heatscape_core::geo::GeoCoordinate;
use heatscape_core::FloatValue;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::city_store::{CityBatch, CityWeatherSample};

/// Weight given to synthetic points
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterWeight {
    /// Uniform random weight in `[0, 1)`, unrelated to the measured value
    Random,
    /// The temperature measured at the source city
    InheritTemperature,
}

/// Parameters of the jitter sampler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterParameters {
    /// Synthetic points generated per city sample
    ///
    /// Default: 40
    pub count_multiplier: usize,

    /// Maximum distance of a synthetic point from its source
    ///
    /// unit: m
    ///
    /// Default: 20000.0
    pub radius_meters: FloatValue,

    /// Weight assigned to synthetic points
    ///
    /// Default: [`JitterWeight::Random`]
    pub weight: JitterWeight,
}

impl Default for JitterParameters {
    fn default() -> Self {
        Self {
            count_multiplier: 40,
            radius_meters: 20_000.0,
            weight: JitterWeight::Random,
        }
    }
}

/// A weighted point of the heat field
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DensitySample {
    pub coordinate: GeoCoordinate,
    pub weight: FloatValue,
    /// False for the measured city sample itself
    pub synthetic: bool,
}

/// Expands city samples into jittered clouds
#[derive(Debug, Clone)]
pub struct GeoJitterSampler {
    parameters: JitterParameters,
}

impl GeoJitterSampler {
    pub fn new(parameters: JitterParameters) -> HeatscapeResult<Self> {
        if !parameters.radius_meters.is_finite() || parameters.radius_meters < 0.0 {
            return Err(HeatscapeError::ConfigError(format!(
                "Jitter radius must be a non-negative distance, got {} m",
                parameters.radius_meters
            )));
        }
        Ok(Self { parameters })
    }

    pub fn parameters(&self) -> &JitterParameters {
        &self.parameters
    }

    /// The measured sample followed by `count_multiplier` synthetic points around it
    pub fn expand<R: Rng>(
        &self,
        sample: &CityWeatherSample,
        rng: &mut R,
    ) -> Vec<DensitySample> {
        let mut points = Vec::with_capacity(self.parameters.count_multiplier + 1);
        points.push(DensitySample {
            coordinate: sample.location,
            weight: sample.temperature_c,
            synthetic: false,
        });

        let radius = self.parameters.radius_meters;
        for _ in 0..self.parameters.count_multiplier {
            let (east, north) = disc_offset(radius, rng);
            let weight = match self.parameters.weight {
                JitterWeight::Random => rng.gen::<FloatValue>(),
                JitterWeight::InheritTemperature => sample.temperature_c,
            };
            points.push(DensitySample {
                coordinate: sample.location.offset_by_meters(east, north),
                weight,
                synthetic: true,
            });
        }
        points
    }

    /// Expand every sample of a batch
    pub fn expand_batch<R: Rng>(
        &self,
        batch: &CityBatch,
        rng: &mut R,
    ) -> Vec<DensitySample> {
        batch
            .samples()
            .iter()
            .flat_map(|sample| self.expand(sample, rng))
            .collect()
    }
}

/// Independent uniform offsets along each axis, redrawn until they fall inside the disc
fn disc_offset<R: Rng>(radius: FloatValue, rng: &mut R) -> (FloatValue, FloatValue) {
    if radius == 0.0 {
        return (0.0, 0.0);
    }
    loop {
        let east = rng.gen_range(-radius..=radius);
        let north = rng.gen_range(-radius..=radius);
        if east * east + north * north <= radius * radius {
            return (east, north);
        }
    }
}
