//! Year-by-year temperature and CO₂ projections
//!
//! The projection blends two regressions fitted on the historical table:
//! temperature against year and temperature against CO₂ emissions.
//! For each year after the last historical observation, emissions are compounded from the
//! last observed value at a fixed annual growth factor $g$:
//!
//! $$ E_y = E_{last} \cdot g^{y - y_{last}} $$
//!
//! and the projected temperature is the mean of the two regression predictions
//!
//! $$ T_y = \frac{T_{year}(y) + T_{CO_2}(E_y)}{2} + (r - r_0) \cdot k $$
//!
//! where the final term is only applied when an emission scenario with rate $r$ is supplied.
//! $r_0$ is the baseline rate and $k$ the temperature adjustment factor.
//!
//! Years covered by the historical table always report the recorded values.

use crate::errors::{HeatscapeError, HeatscapeResult};
use crate::historical::{HistoricalTable, TableVariable};
use crate::regression::RegressionModel;
use crate::scenario::{EmissionScenario, BASELINE_RATE_PERCENT};
use crate::{FloatValue, Year};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Policy constants of the projection
///
/// These are policy choices, not values derived from data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionParameters {
    /// Annual growth factor applied to the last observed CO₂ emissions
    ///
    /// Default: 1.015 (1.5% per year)
    pub co2_growth_factor: FloatValue,

    /// Emission rate at which a scenario leaves projected temperatures unchanged
    ///
    /// unit: %
    ///
    /// Default: 70.0
    pub baseline_rate_percent: FloatValue,

    /// Temperature change per percentage point of emission rate above the baseline
    ///
    /// unit: °C / %
    ///
    /// Default: 0.05
    pub temperature_adjustment_per_percent: FloatValue,
}

impl Default for ProjectionParameters {
    fn default() -> Self {
        Self {
            co2_growth_factor: 1.015,
            baseline_rate_percent: BASELINE_RATE_PERCENT,
            temperature_adjustment_per_percent: 0.05,
        }
    }
}

impl ProjectionParameters {
    /// Temperature offset implied by an emission rate
    pub fn temperature_offset(&self, rate_percent: FloatValue) -> FloatValue {
        (rate_percent - self.baseline_rate_percent) * self.temperature_adjustment_per_percent
    }
}

/// Inclusive range of years covered by a projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizonRange {
    pub start: Year,
    /// The horizon year, the last year included
    pub end: Year,
}

impl Default for HorizonRange {
    fn default() -> Self {
        Self {
            start: 2015,
            end: 2030,
        }
    }
}

impl HorizonRange {
    pub fn new(start: Year, end: Year) -> HeatscapeResult<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> HeatscapeResult<()> {
        if self.end < self.start {
            return Err(HeatscapeError::ValidationError(format!(
                "Horizon ends ({}) before it starts ({})",
                self.end, self.start
            )));
        }
        Ok(())
    }

    /// Number of years in the range
    pub fn len(&self) -> usize {
        (i64::from(self.end) - i64::from(self.start) + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, year: Year) -> bool {
        (self.start..=self.end).contains(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = Year> {
        self.start..=self.end
    }
}

/// Where a value in a projection series came from
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSource {
    /// Recorded in the historical table
    Observed,
    /// Within the historical span but missing from the table
    Fitted,
    /// Outside the historical span
    Projected,
}

/// Temperatures and emissions for a contiguous run of years
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSeries {
    years: Vec<Year>,
    /// unit: °C
    temperatures: Array1<FloatValue>,
    /// unit: MtCO2
    co2_mt: Array1<FloatValue>,
    sources: Vec<ValueSource>,
}

impl ProjectionSeries {
    pub fn years(&self) -> &[Year] {
        &self.years
    }

    pub fn temperatures(&self) -> &Array1<FloatValue> {
        &self.temperatures
    }

    pub fn co2_mt(&self) -> &Array1<FloatValue> {
        &self.co2_mt
    }

    pub fn sources(&self) -> &[ValueSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    fn index_of(&self, year: Year) -> Option<usize> {
        let first = *self.years.first()?;
        let index = usize::try_from(year - first).ok()?;
        (index < self.years.len()).then_some(index)
    }

    pub fn temperature_at(&self, year: Year) -> Option<FloatValue> {
        self.index_of(year).map(|i| self.temperatures[i])
    }

    pub fn co2_at(&self, year: Year) -> Option<FloatValue> {
        self.index_of(year).map(|i| self.co2_mt[i])
    }

    pub fn source_at(&self, year: Year) -> Option<ValueSource> {
        self.index_of(year).map(|i| self.sources[i])
    }

    /// Iterate over `(year, temperature, co2)` rows
    pub fn rows(&self) -> impl Iterator<Item = (Year, FloatValue, FloatValue)> + '_ {
        self.years
            .iter()
            .zip(self.temperatures.iter())
            .zip(self.co2_mt.iter())
            .map(|((year, temperature), co2)| (*year, *temperature, *co2))
    }
}

/// Regressions fitted on a historical table, ready to project
#[derive(Debug, Clone)]
pub struct ProjectionModel {
    table: HistoricalTable,
    parameters: ProjectionParameters,
    year_to_temp: RegressionModel,
    co2_to_temp: RegressionModel,
    year_to_co2: RegressionModel,
}

impl ProjectionModel {
    /// Fit the regressions used for projection
    ///
    /// # Errors
    ///
    /// [`HeatscapeError::InsufficientData`] if the table holds fewer than two years.
    pub fn fit(table: HistoricalTable, parameters: ProjectionParameters) -> HeatscapeResult<Self> {
        let year_to_temp = table.regression(TableVariable::Year, TableVariable::Temperature)?;
        let co2_to_temp = table.regression(TableVariable::Co2Mt, TableVariable::Temperature)?;
        let year_to_co2 = table.regression(TableVariable::Year, TableVariable::Co2Mt)?;
        Ok(Self {
            table,
            parameters,
            year_to_temp,
            co2_to_temp,
            year_to_co2,
        })
    }

    pub fn table(&self) -> &HistoricalTable {
        &self.table
    }

    pub fn parameters(&self) -> &ProjectionParameters {
        &self.parameters
    }

    pub fn year_to_temp(&self) -> &RegressionModel {
        &self.year_to_temp
    }

    pub fn co2_to_temp(&self) -> &RegressionModel {
        &self.co2_to_temp
    }

    /// Regression used to predict the baseline emissions of a scenario
    pub fn year_to_co2(&self) -> &RegressionModel {
        &self.year_to_co2
    }

    /// Baseline emissions predicted for `year`
    pub fn predicted_base_mt_co2(&self, year: Year) -> FloatValue {
        self.year_to_co2.predict(year as FloatValue)
    }

    /// Emissions estimated for a year after the last historical observation
    pub fn estimated_co2(&self, year: Year) -> FloatValue {
        let last = self.table.last();
        let elapsed = year - last.year;
        last.co2_mt() * self.parameters.co2_growth_factor.powi(elapsed)
    }

    /// Unadjusted blend of the two temperature regressions
    fn blended_temperature(&self, year: Year, co2_mt: FloatValue) -> FloatValue {
        let by_year = self.year_to_temp.predict(year as FloatValue);
        let by_co2 = self.co2_to_temp.predict(co2_mt);
        (by_year + by_co2) / 2.0
    }

    /// Project temperatures and emissions over `horizon`
    ///
    /// The scenario adjustment only affects years outside the historical table.
    pub fn project(
        &self,
        horizon: HorizonRange,
        scenario: Option<&EmissionScenario>,
    ) -> HeatscapeResult<ProjectionSeries> {
        horizon.validate()?;

        let offset = scenario
            .map(|s| self.parameters.temperature_offset(s.rate_percent()))
            .unwrap_or(0.0);
        let first_year = self.table.first().year;
        let last_year = self.table.last().year;

        let n = horizon.len();
        let mut years = Vec::with_capacity(n);
        let mut temperatures = Vec::with_capacity(n);
        let mut co2_mt = Vec::with_capacity(n);
        let mut sources = Vec::with_capacity(n);

        for year in horizon.years() {
            let (temperature, co2, source) = if let Some(point) = self.table.get(year) {
                (point.mean_temperature_c, point.co2_mt(), ValueSource::Observed)
            } else if year > last_year {
                let co2 = self.estimated_co2(year);
                (
                    self.blended_temperature(year, co2) + offset,
                    co2,
                    ValueSource::Projected,
                )
            } else if year < first_year {
                let co2 = self.predicted_base_mt_co2(year);
                (self.blended_temperature(year, co2), co2, ValueSource::Projected)
            } else {
                (
                    self.year_to_temp.predict(year as FloatValue),
                    self.predicted_base_mt_co2(year),
                    ValueSource::Fitted,
                )
            };
            years.push(year);
            temperatures.push(temperature);
            co2_mt.push(co2);
            sources.push(source);
        }

        Ok(ProjectionSeries {
            years,
            temperatures: Array1::from(temperatures),
            co2_mt: Array1::from(co2_mt),
            sources,
        })
    }
}

/// Fit a projection model on `table` and project it over `horizon`
pub fn project(
    table: &HistoricalTable,
    horizon: HorizonRange,
    scenario: Option<&EmissionScenario>,
) -> HeatscapeResult<ProjectionSeries> {
    ProjectionModel::fit(table.clone(), ProjectionParameters::default())?
        .project(horizon, scenario)
}
