//! Ordinary least-squares regression
//!
//! Fits a straight line $y = a x + b$ through a set of points using the closed form
//!
//! $$ a = \frac{\sum (x - \bar{x})(y - \bar{y})}{\sum (x - \bar{x})^2}, \quad b = \bar{y} - a \bar{x} $$
//!
//! The fit is linear in the number of points and fully deterministic.
//!
//! # Examples
//!
//! ```rust
//! use heatscape_core::regression::fit;
//!
//! let model = fit(&[(2000.0, 27.0), (2010.0, 27.5)]).unwrap();
//! assert!((model.predict(2020.0) - 28.0).abs() < 1e-9);
//! ```

use crate::errors::{HeatscapeError, HeatscapeResult};
use crate::FloatValue;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A fitted linear model
///
/// Models are immutable once fit. `r_squared` is a diagnostic and never gates prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionModel {
    pub slope: FloatValue,
    pub intercept: FloatValue,
    /// Coefficient of determination of the fit
    pub r_squared: FloatValue,
    /// Smallest x value seen during the fit
    pub x_min: FloatValue,
    /// Largest x value seen during the fit
    pub x_max: FloatValue,
}

impl RegressionModel {
    /// Evaluate the model at `x`
    ///
    /// Any finite `x` is accepted, including values outside the fitted domain.
    pub fn predict(&self, x: FloatValue) -> FloatValue {
        if self.is_extrapolation(x) {
            debug!(
                x,
                x_min = self.x_min,
                x_max = self.x_max,
                "Extrapolating beyond the fitted domain"
            );
        }
        self.slope * x + self.intercept
    }

    /// Whether `x` lies outside the domain the model was fitted on
    pub fn is_extrapolation(&self, x: FloatValue) -> bool {
        x < self.x_min || x > self.x_max
    }

    /// Evaluate the model at each of `xs`
    pub fn predict_many(&self, xs: &[FloatValue]) -> Vec<FloatValue> {
        xs.iter().map(|x| self.slope * x + self.intercept).collect()
    }
}

/// Fit a model to `(x, y)` pairs
///
/// # Errors
///
/// * [`HeatscapeError::InsufficientData`] if fewer than two points, or fewer than two
///   distinct x values, are supplied
/// * [`HeatscapeError::DataError`] if any coordinate is not finite
pub fn fit(points: &[(FloatValue, FloatValue)]) -> HeatscapeResult<RegressionModel> {
    if points.len() < 2 {
        return Err(HeatscapeError::InsufficientData {
            required: 2,
            found: points.len(),
        });
    }

    let n = points.len() as FloatValue;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut x_min = FloatValue::INFINITY;
    let mut x_max = FloatValue::NEG_INFINITY;

    for &(x, y) in points {
        if !x.is_finite() || !y.is_finite() {
            return Err(HeatscapeError::DataError(format!(
                "Non-finite point ({}, {}) cannot be fitted",
                x, y
            )));
        }
        sum_x += x;
        sum_y += y;
        x_min = x_min.min(x);
        x_max = x_max.max(x);
    }

    if x_min == x_max {
        return Err(HeatscapeError::InsufficientData {
            required: 2,
            found: 1,
        });
    }

    let mean_x = sum_x / n;
    let mean_y = sum_y / n;

    // Sums are taken about the means, calendar years would otherwise lose precision
    let (s_xx, s_xy, s_yy) = points
        .iter()
        .fold((0.0, 0.0, 0.0), |(s_xx, s_xy, s_yy), &(x, y)| {
            let dx = x - mean_x;
            let dy = y - mean_y;
            (s_xx + dx * dx, s_xy + dx * dy, s_yy + dy * dy)
        });

    let slope = s_xy / s_xx;
    let intercept = mean_y - slope * mean_x;

    let r_squared = if s_yy == 0.0 {
        // A constant target is explained perfectly by a flat line
        1.0
    } else {
        (s_xy * s_xy / (s_xx * s_yy)).clamp(0.0, 1.0)
    };

    Ok(RegressionModel {
        slope,
        intercept,
        r_squared,
        x_min,
        x_max,
    })
}

/// Fit a model to parallel slices of predictor and target values
///
/// # Errors
///
/// [`HeatscapeError::DataError`] if the slices differ in length, otherwise as [`fit`].
pub fn fit_xy(xs: &[FloatValue], ys: &[FloatValue]) -> HeatscapeResult<RegressionModel> {
    if xs.len() != ys.len() {
        return Err(HeatscapeError::DataError(format!(
            "Predictor and target lengths differ ({} != {})",
            xs.len(),
            ys.len()
        )));
    }
    let points: Vec<_> = xs.iter().copied().zip(ys.iter().copied()).collect();
    fit(&points)
}
