//! Historical reference table
//!
//! The table is the static input to every regression in the engine. It is validated
//! once on construction and never mutated afterwards.

use crate::errors::{HeatscapeError, HeatscapeResult};
use crate::regression::{fit_xy, RegressionModel};
use crate::{FloatValue, Year};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Tonnes of CO₂ per megatonne
pub const TONS_PER_MT: FloatValue = 1.0e6;

/// A single year of observations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub year: Year,
    pub population: u64,
    /// Total CO₂ emissions
    /// unit: t CO2 / yr
    pub co2_emissions_tons: FloatValue,
    /// Annual mean surface temperature
    /// unit: °C
    pub mean_temperature_c: FloatValue,
}

impl HistoricalPoint {
    pub fn co2_mt(&self) -> FloatValue {
        self.co2_emissions_tons / TONS_PER_MT
    }

    fn value(&self, variable: TableVariable) -> FloatValue {
        match variable {
            TableVariable::Year => self.year as FloatValue,
            TableVariable::Population => self.population as FloatValue,
            TableVariable::Co2Mt => self.co2_mt(),
            TableVariable::Temperature => self.mean_temperature_c,
        }
    }
}

/// Columns of the historical table usable as a predictor or target
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableVariable {
    Year,
    Population,
    /// CO₂ emissions in MtCO2
    Co2Mt,
    Temperature,
}

impl fmt::Display for TableVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableVariable::Year => "Year",
            TableVariable::Population => "Population",
            TableVariable::Co2Mt => "Emissions|CO2",
            TableVariable::Temperature => "Surface Temperature",
        };
        write!(f, "{}", name)
    }
}

/// Ordered, immutable table of historical observations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalTable {
    points: Vec<HistoricalPoint>,
}

#[derive(Deserialize)]
struct TableFile {
    points: Vec<HistoricalPoint>,
}

impl HistoricalTable {
    /// Build a table, checking that it is non-empty, strictly ascending by year and finite
    pub fn from_points(points: Vec<HistoricalPoint>) -> HeatscapeResult<Self> {
        if points.is_empty() {
            return Err(HeatscapeError::DataError(
                "Historical table must contain at least one year".to_string(),
            ));
        }
        for pair in points.windows(2) {
            if pair[1].year <= pair[0].year {
                return Err(HeatscapeError::DataError(format!(
                    "Historical years must be strictly ascending ({} follows {})",
                    pair[1].year, pair[0].year
                )));
            }
        }
        if let Some(bad) = points
            .iter()
            .find(|p| !p.co2_emissions_tons.is_finite() || !p.mean_temperature_c.is_finite())
        {
            return Err(HeatscapeError::DataError(format!(
                "Historical values for {} are not finite",
                bad.year
            )));
        }
        Ok(Self { points })
    }

    /// Load a table from TOML with a `[[points]]` array
    pub fn from_toml_str(contents: &str) -> HeatscapeResult<Self> {
        let file: TableFile =
            toml::from_str(contents).map_err(|e| HeatscapeError::DataError(e.to_string()))?;
        Self::from_points(file.points)
    }

    pub fn from_path(path: impl AsRef<Path>) -> HeatscapeResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            HeatscapeError::DataError(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// The built-in reference table (2000-2014)
    pub fn reference() -> Self {
        Self {
            points: REFERENCE_POINTS.to_vec(),
        }
    }

    pub fn points(&self) -> &[HistoricalPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> &HistoricalPoint {
        &self.points[0]
    }

    pub fn last(&self) -> &HistoricalPoint {
        &self.points[self.points.len() - 1]
    }

    /// Look up the observations recorded for `year`
    pub fn get(&self, year: Year) -> Option<&HistoricalPoint> {
        self.points
            .binary_search_by_key(&year, |p| p.year)
            .ok()
            .map(|i| &self.points[i])
    }

    /// All values of a single column, in year order
    pub fn column(&self, variable: TableVariable) -> Vec<FloatValue> {
        self.points.iter().map(|p| p.value(variable)).collect()
    }

    /// Fit `target` against `predictor` over the whole table
    pub fn regression(
        &self,
        predictor: TableVariable,
        target: TableVariable,
    ) -> HeatscapeResult<RegressionModel> {
        fit_xy(&self.column(predictor), &self.column(target))
    }

    /// Descriptors of the historical trends, as consumed by narrative generation
    pub fn trend_summary(&self) -> HeatscapeResult<TrendSummary> {
        let year_to_temp = self.regression(TableVariable::Year, TableVariable::Temperature)?;
        let year_to_co2 = self.regression(TableVariable::Year, TableVariable::Co2Mt)?;
        Ok(TrendSummary {
            first_year: self.first().year,
            last_year: self.last().year,
            temperature_slope_per_year: year_to_temp.slope,
            temperature_r_squared: year_to_temp.r_squared,
            co2_slope_mt_per_year: year_to_co2.slope,
            co2_r_squared: year_to_co2.r_squared,
        })
    }
}

/// Summary of the historical trends in the table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub first_year: Year,
    pub last_year: Year,
    /// unit: °C / yr
    pub temperature_slope_per_year: FloatValue,
    pub temperature_r_squared: FloatValue,
    /// unit: MtCO2 / yr
    pub co2_slope_mt_per_year: FloatValue,
    pub co2_r_squared: FloatValue,
}

macro_rules! point {
    ($year:expr, $population:expr, $co2_mt:expr, $temperature:expr) => {
        HistoricalPoint {
            year: $year,
            population: $population,
            co2_emissions_tons: $co2_mt * TONS_PER_MT,
            mean_temperature_c: $temperature,
        }
    };
}

const REFERENCE_POINTS: [HistoricalPoint; 15] = [
    point!(2000, 77_991_569, 86.2, 27.12),
    point!(2001, 79_672_873, 88.9, 27.05),
    point!(2002, 81_365_258, 92.7, 27.21),
    point!(2003, 83_051_971, 97.4, 27.18),
    point!(2004, 84_710_542, 100.3, 27.30),
    point!(2005, 86_326_250, 104.8, 27.26),
    point!(2006, 87_888_675, 108.1, 27.35),
    point!(2007, 89_405_482, 113.6, 27.41),
    point!(2008, 90_901_965, 117.9, 27.29),
    point!(2009, 92_414_158, 121.0, 27.47),
    point!(2010, 93_966_780, 126.4, 27.62),
    point!(2011, 95_570_047, 130.2, 27.44),
    point!(2012, 97_212_638, 134.9, 27.55),
    point!(2013, 98_871_552, 139.1, 27.60),
    point!(2014, 100_513_138, 143.8, 27.68),
];
