//! CO₂ emission-rate scenario
//!
//! A scenario adds a percentage of a baseline emission value on top of that baseline:
//!
//! $$ active = base \cdot \frac{rate}{100}, \quad result = base + active $$
//!
//! Fields are private and recomputed on every edit so that the derived values are
//! always consistent with the inputs.
//!
//! ```rust
//! use heatscape_core::scenario::EmissionScenario;
//!
//! let scenario = EmissionScenario::new(155.38, 70.0).unwrap();
//! assert!((scenario.active_mt_co2() - 108.766).abs() < 1e-9);
//! assert!((scenario.result_mt_co2() - 264.146).abs() < 1e-9);
//! ```

use crate::errors::{HeatscapeError, HeatscapeResult};
use crate::regression::RegressionModel;
use crate::{FloatValue, Year};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use tracing::warn;

/// Years for which a regression-derived base is considered reliable
///
/// Years outside this range are still extrapolated.
pub const ADVISORY_YEARS: RangeInclusive<Year> = 2015..=2030;

/// Reference emission rate against which scenario deltas are measured
pub const BASELINE_RATE_PERCENT: FloatValue = 70.0;

/// A user-steered emission scenario
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionScenario {
    rate_percent: FloatValue,
    base_mt_co2: FloatValue,
    active_mt_co2: FloatValue,
    result_mt_co2: FloatValue,
}

impl EmissionScenario {
    /// Create a scenario from a base emission value and a rate
    ///
    /// The rate is clamped to `[0, 100]`.
    ///
    /// # Errors
    ///
    /// [`HeatscapeError::ValidationError`] if the base is not a positive finite value or the
    /// rate is NaN.
    pub fn new(base_mt_co2: FloatValue, rate_percent: FloatValue) -> HeatscapeResult<Self> {
        validate_base(base_mt_co2)?;
        let rate_percent = clamp_rate(rate_percent)?;
        Ok(Self::derive(base_mt_co2, rate_percent))
    }

    /// Create a scenario whose base is predicted by a CO₂ regression at `year`
    pub fn from_regression(
        year_to_co2: &RegressionModel,
        year: Year,
        rate_percent: FloatValue,
    ) -> HeatscapeResult<Self> {
        if !ADVISORY_YEARS.contains(&year) {
            warn!(
                year,
                "Scenario year is outside the advisory range; the base is extrapolated"
            );
        }
        Self::new(year_to_co2.predict(year as FloatValue), rate_percent)
    }

    fn derive(base_mt_co2: FloatValue, rate_percent: FloatValue) -> Self {
        let active_mt_co2 = base_mt_co2 * rate_percent / 100.0;
        Self {
            rate_percent,
            base_mt_co2,
            active_mt_co2,
            result_mt_co2: base_mt_co2 + active_mt_co2,
        }
    }

    /// Set the emission rate, clamping to `[0, 100]`
    ///
    /// Returns the rate that was applied.
    pub fn set_rate(&mut self, rate_percent: FloatValue) -> HeatscapeResult<FloatValue> {
        let rate_percent = clamp_rate(rate_percent)?;
        *self = Self::derive(self.base_mt_co2, rate_percent);
        Ok(rate_percent)
    }

    /// Replace the base emission value
    ///
    /// On error the previous base is kept.
    pub fn set_base(&mut self, base_mt_co2: FloatValue) -> HeatscapeResult<()> {
        validate_base(base_mt_co2)?;
        *self = Self::derive(base_mt_co2, self.rate_percent);
        Ok(())
    }

    pub fn rate_percent(&self) -> FloatValue {
        self.rate_percent
    }

    pub fn base_mt_co2(&self) -> FloatValue {
        self.base_mt_co2
    }

    /// Emissions added on top of the base by the chosen rate
    pub fn active_mt_co2(&self) -> FloatValue {
        self.active_mt_co2
    }

    /// Base plus active emissions
    pub fn result_mt_co2(&self) -> FloatValue {
        self.result_mt_co2
    }

    pub fn is_active(&self) -> bool {
        self.rate_percent != 0.0
    }
}

fn validate_base(base_mt_co2: FloatValue) -> HeatscapeResult<()> {
    if base_mt_co2.is_finite() && base_mt_co2 > 0.0 {
        Ok(())
    } else {
        Err(HeatscapeError::ValidationError(format!(
            "Base emissions must be positive, got {} MtCO2",
            base_mt_co2
        )))
    }
}

fn clamp_rate(rate_percent: FloatValue) -> HeatscapeResult<FloatValue> {
    if rate_percent.is_nan() {
        return Err(HeatscapeError::ValidationError(
            "Emission rate must be a number".to_string(),
        ));
    }
    Ok(rate_percent.clamp(0.0, 100.0))
}
