//! Projection state and its controller
//!
//! [`ProjectionState`] is a plain value: every edit goes through a pure update function
//! that returns a fully recomputed state, or an error leaving the original untouched.
//! [`ProjectionController`] owns the current state and tells its subscribers about every
//! successful edit.

use crate::errors::{HeatscapeError, HeatscapeResult};
use crate::historical::HistoricalTable;
use crate::projection::{HorizonRange, ProjectionModel, ProjectionParameters, ProjectionSeries};
use crate::scenario::{EmissionScenario, BASELINE_RATE_PERCENT};
use crate::{FloatValue, Year};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// What changed in a [`ProjectionState`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionEvent {
    /// Rate or base emissions changed
    ScenarioChanged,
    /// The selected year changed, which may also move the base emissions
    SelectedYearChanged(Year),
}

/// The complete, consistent projection state shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionState {
    horizon: HorizonRange,
    selected_year: Year,
    /// Base emissions entered by the user, replacing the regression prediction
    base_override: Option<FloatValue>,
    predicted_base_mt_co2: FloatValue,
    scenario: EmissionScenario,
    series: ProjectionSeries,
}

impl ProjectionState {
    /// Build the initial state for `selected_year`
    pub fn initial(
        model: &ProjectionModel,
        horizon: HorizonRange,
        selected_year: Year,
        rate_percent: FloatValue,
    ) -> HeatscapeResult<Self> {
        let predicted_base_mt_co2 = model.predicted_base_mt_co2(selected_year);
        let scenario =
            EmissionScenario::from_regression(model.year_to_co2(), selected_year, rate_percent)?;
        let series = model.project(horizon, Some(&scenario))?;
        Ok(Self {
            horizon,
            selected_year,
            base_override: None,
            predicted_base_mt_co2,
            scenario,
            series,
        })
    }

    pub fn horizon(&self) -> HorizonRange {
        self.horizon
    }

    pub fn selected_year(&self) -> Year {
        self.selected_year
    }

    pub fn base_override(&self) -> Option<FloatValue> {
        self.base_override
    }

    /// Regression-predicted base emissions for the selected year
    pub fn predicted_base_mt_co2(&self) -> FloatValue {
        self.predicted_base_mt_co2
    }

    pub fn scenario(&self) -> &EmissionScenario {
        &self.scenario
    }

    pub fn series(&self) -> &ProjectionSeries {
        &self.series
    }

    /// Temperature for the selected year, if the horizon covers it
    pub fn selected_temperature(&self) -> Option<FloatValue> {
        self.series.temperature_at(self.selected_year)
    }

    /// Observed temperature shifted by the scenario offset
    pub fn adjusted_temperature(
        &self,
        parameters: &ProjectionParameters,
        observed_c: FloatValue,
    ) -> FloatValue {
        observed_c + parameters.temperature_offset(self.scenario.rate_percent())
    }

    pub fn with_rate(
        &self,
        model: &ProjectionModel,
        rate_percent: FloatValue,
    ) -> HeatscapeResult<Self> {
        let mut scenario = self.scenario;
        scenario.set_rate(rate_percent)?;
        self.rebuild(model, scenario, self.selected_year, self.base_override)
    }

    pub fn with_base_override(
        &self,
        model: &ProjectionModel,
        base_mt_co2: FloatValue,
    ) -> HeatscapeResult<Self> {
        let mut scenario = self.scenario;
        scenario.set_base(base_mt_co2)?;
        self.rebuild(model, scenario, self.selected_year, Some(base_mt_co2))
    }

    /// Return to the regression-predicted base for the selected year
    pub fn without_base_override(&self, model: &ProjectionModel) -> HeatscapeResult<Self> {
        let mut scenario = self.scenario;
        scenario.set_base(model.predicted_base_mt_co2(self.selected_year))?;
        self.rebuild(model, scenario, self.selected_year, None)
    }

    /// Select a new year, moving the base with it unless it is overridden
    pub fn with_selected_year(
        &self,
        model: &ProjectionModel,
        year: Year,
    ) -> HeatscapeResult<Self> {
        let mut scenario = self.scenario;
        if self.base_override.is_none() {
            scenario.set_base(model.predicted_base_mt_co2(year))?;
        }
        self.rebuild(model, scenario, year, self.base_override)
    }

    fn rebuild(
        &self,
        model: &ProjectionModel,
        scenario: EmissionScenario,
        selected_year: Year,
        base_override: Option<FloatValue>,
    ) -> HeatscapeResult<Self> {
        let series = model.project(self.horizon, Some(&scenario))?;
        Ok(Self {
            horizon: self.horizon,
            selected_year,
            base_override,
            predicted_base_mt_co2: model.predicted_base_mt_co2(selected_year),
            scenario,
            series,
        })
    }
}

/// Receives notifications of changes to a [`ProjectionState`]
pub trait ProjectionObserver {
    fn on_change(&mut self, event: ProjectionEvent, state: &ProjectionState);
}

impl<F> ProjectionObserver for F
where
    F: FnMut(ProjectionEvent, &ProjectionState),
{
    fn on_change(&mut self, event: ProjectionEvent, state: &ProjectionState) {
        self(event, state)
    }
}

/// Handle returned by [`ProjectionController::subscribe`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Owner of the projection state
///
/// All edits are applied synchronously: a subscriber only ever sees a state in which the
/// scenario and the projected series agree.
pub struct ProjectionController {
    model: Arc<ProjectionModel>,
    state: ProjectionState,
    observers: Vec<(SubscriptionId, Box<dyn ProjectionObserver>)>,
    next_subscription: u64,
}

impl std::fmt::Debug for ProjectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionController")
            .field("state", &self.state)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ProjectionController {
    pub fn new(
        model: Arc<ProjectionModel>,
        horizon: HorizonRange,
        selected_year: Year,
        rate_percent: FloatValue,
    ) -> HeatscapeResult<Self> {
        let state = ProjectionState::initial(&model, horizon, selected_year, rate_percent)?;
        Ok(Self {
            model,
            state,
            observers: vec![],
            next_subscription: 0,
        })
    }

    /// Fit a model on `table` and start at the baseline rate
    pub fn from_table(
        table: HistoricalTable,
        parameters: ProjectionParameters,
        horizon: HorizonRange,
        selected_year: Year,
    ) -> HeatscapeResult<Self> {
        let model = ProjectionModel::fit(table, parameters)?;
        Self::new(Arc::new(model), horizon, selected_year, BASELINE_RATE_PERCENT)
    }

    pub fn state(&self) -> &ProjectionState {
        &self.state
    }

    pub fn model(&self) -> &Arc<ProjectionModel> {
        &self.model
    }

    pub fn subscribe(&mut self, observer: impl ProjectionObserver + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Detach a subscriber, returning whether it was attached
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(other, _)| *other != id);
        self.observers.len() != before
    }

    pub fn clear_subscribers(&mut self) {
        self.observers.clear();
    }

    pub fn set_rate(&mut self, rate_percent: FloatValue) -> HeatscapeResult<()> {
        let next = self.state.with_rate(&self.model, rate_percent)?;
        self.apply(next, ProjectionEvent::ScenarioChanged);
        Ok(())
    }

    pub fn set_base_override(&mut self, base_mt_co2: FloatValue) -> HeatscapeResult<()> {
        let next = self.state.with_base_override(&self.model, base_mt_co2)?;
        self.apply(next, ProjectionEvent::ScenarioChanged);
        Ok(())
    }

    pub fn clear_base_override(&mut self) -> HeatscapeResult<()> {
        let next = self.state.without_base_override(&self.model)?;
        self.apply(next, ProjectionEvent::ScenarioChanged);
        Ok(())
    }

    pub fn set_selected_year(&mut self, year: Year) -> HeatscapeResult<()> {
        if !(1..=9999).contains(&year) {
            return Err(HeatscapeError::ValidationError(format!(
                "Year {} is not a calendar year",
                year
            )));
        }
        let next = self.state.with_selected_year(&self.model, year)?;
        self.apply(next, ProjectionEvent::SelectedYearChanged(year));
        Ok(())
    }

    fn apply(&mut self, next: ProjectionState, event: ProjectionEvent) {
        self.state = next;
        debug!(
            ?event,
            rate = self.state.scenario.rate_percent(),
            base = self.state.scenario.base_mt_co2(),
            "Projection state updated"
        );
        for (_, observer) in self.observers.iter_mut() {
            observer.on_change(event, &self.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn controller() -> ProjectionController {
        ProjectionController::from_table(
            HistoricalTable::reference(),
            ProjectionParameters::default(),
            HorizonRange::default(),
            2020,
        )
        .unwrap()
    }

    #[test]
    fn test_initial_state_is_consistent() {
        let controller = controller();
        let state = controller.state();

        assert_eq!(state.scenario().rate_percent(), 70.0);
        assert_eq!(state.scenario().base_mt_co2(), state.predicted_base_mt_co2());
        assert_eq!(
            state.series(),
            &controller
                .model()
                .project(state.horizon(), Some(state.scenario()))
                .unwrap()
        );
    }

    #[test]
    fn test_rate_edit_updates_series() {
        let mut controller = controller();
        let before = controller.state().selected_temperature().unwrap();

        controller.set_rate(90.0).unwrap();
        let after = controller.state().selected_temperature().unwrap();
        assert_relative_eq!(after - before, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_edit_keeps_state() {
        let mut controller = controller();
        let before = controller.state().clone();

        assert!(controller.set_base_override(-1.0).is_err());
        assert!(controller.set_rate(f64::NAN).is_err());
        assert_eq!(controller.state(), &before);
    }

    #[test]
    fn test_year_moves_base_unless_overridden() {
        let mut controller = controller();

        controller.set_selected_year(2025).unwrap();
        let predicted = controller.model().predicted_base_mt_co2(2025);
        assert_eq!(controller.state().scenario().base_mt_co2(), predicted);

        controller.set_base_override(155.38).unwrap();
        controller.set_selected_year(2030).unwrap();
        assert_eq!(controller.state().scenario().base_mt_co2(), 155.38);
        assert_eq!(
            controller.state().predicted_base_mt_co2(),
            controller.model().predicted_base_mt_co2(2030)
        );

        controller.clear_base_override().unwrap();
        assert_eq!(
            controller.state().scenario().base_mt_co2(),
            controller.model().predicted_base_mt_co2(2030)
        );
    }

    #[test]
    fn test_observers_see_consistent_state() {
        let mut controller = controller();
        let seen = Rc::new(RefCell::new(vec![]));

        let sink = seen.clone();
        let id = controller.subscribe(move |event: ProjectionEvent, state: &ProjectionState| {
            let scenario = state.scenario();
            assert_relative_eq!(
                scenario.result_mt_co2(),
                scenario.base_mt_co2() * (1.0 + scenario.rate_percent() / 100.0),
                max_relative = 1e-12
            );
            sink.borrow_mut().push(event);
        });

        controller.set_rate(40.0).unwrap();
        controller.set_selected_year(2022).unwrap();
        assert!(controller.set_rate(f64::NAN).is_err());
        assert!(controller.unsubscribe(id));
        controller.set_rate(10.0).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                ProjectionEvent::ScenarioChanged,
                ProjectionEvent::SelectedYearChanged(2022)
            ]
        );
        assert!(!controller.unsubscribe(id));
    }
}
