//! Interactive per-city overlays
//!
//! One overlay is kept per city sample. Hovering is debounced: pointer moves only record
//! the latest target, and [`OverlayController::flush`] applies it once the pointer has
//! rested for the debounce delay. Clicking captures a [`DetailSnapshot`] which is never
//! updated afterwards, whatever happens to the scenario.

use heatscape_core::geo::GeoCoordinate;
use heatscape_core::projection::ProjectionParameters;
use heatscape_core::state::ProjectionState;
use heatscape_core::{FloatValue, Year};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::city_store::CityBatch;

/// Interaction parameters of the overlays
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayParameters {
    /// Time the pointer must rest before the hovered overlay changes
    ///
    /// Default: 50
    pub hover_debounce_millis: u64,

    /// Maximum distance between the pointer and an anchor for a hit
    ///
    /// unit: px
    ///
    /// Default: 12.0
    pub hit_tolerance_px: FloatValue,
}

impl Default for OverlayParameters {
    fn default() -> Self {
        Self {
            hover_debounce_millis: 50,
            hit_tolerance_px: 12.0,
        }
    }
}

/// A position on screen, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: FloatValue,
    pub y: FloatValue,
}

impl ScreenPoint {
    pub fn distance(&self, other: &ScreenPoint) -> FloatValue {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Maps map coordinates to screen pixels; implemented by the host's map view
pub trait ScreenProjector {
    fn project(&self, coordinate: &GeoCoordinate) -> ScreenPoint;
}

/// Scenario-dependent part of an overlay
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdjustedReading {
    /// unit: °C
    pub temperature_c: FloatValue,
    /// unit: MtCO2
    pub active_mt_co2: FloatValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayContent {
    pub city: String,
    /// unit: °C
    pub observed_temperature_c: FloatValue,
    /// Present only while the scenario rate is nonzero
    pub adjusted: Option<AdjustedReading>,
}

impl OverlayContent {
    /// Text shown in the overlay label
    pub fn label(&self) -> String {
        let mut label = format!("{}\n{:.1} °C", self.city, self.observed_temperature_c);
        if let Some(adjusted) = self.adjusted {
            label.push_str(&format!(
                "\nScenario: {:.1} °C (+{:.2} MtCO2)",
                adjusted.temperature_c, adjusted.active_mt_co2
            ));
        }
        label
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub city_key: String,
    pub anchor: GeoCoordinate,
    pub content: OverlayContent,
    pub active: bool,
}

/// Fixed detail fields captured when an overlay is clicked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailSnapshot {
    pub city: String,
    /// unit: °C
    pub temperature_c: FloatValue,
    /// unit: °C
    pub adjusted_temperature_c: FloatValue,
    /// unit: %
    pub rate_percent: FloatValue,
    /// unit: MtCO2
    pub predicted_mt_co2: FloatValue,
    /// unit: MtCO2
    pub active_mt_co2: FloatValue,
    /// unit: MtCO2
    pub result_mt_co2: FloatValue,
    pub selected_year: Year,
}

#[derive(Debug, Clone)]
struct PendingHover {
    target: Option<String>,
    moved_at: Instant,
}

/// Owner of the overlay set and its interaction state
#[derive(Debug, Clone)]
pub struct OverlayController {
    parameters: OverlayParameters,
    projection: ProjectionParameters,
    overlays: Vec<Overlay>,
    pending_hover: Option<PendingHover>,
    detail: Option<DetailSnapshot>,
}

impl OverlayController {
    pub fn new(parameters: OverlayParameters, projection: ProjectionParameters) -> Self {
        Self {
            parameters,
            projection,
            overlays: vec![],
            pending_hover: None,
            detail: None,
        }
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub fn get(&self, city_key: &str) -> Option<&Overlay> {
        self.overlays.iter().find(|o| o.city_key == city_key)
    }

    /// The overlay currently activated by hover
    pub fn active(&self) -> Option<&Overlay> {
        self.overlays.iter().find(|o| o.active)
    }

    /// Replace the overlays with one per sample of `batch`
    ///
    /// The hovered city stays active and an open detail stays open if their city is
    /// still in the batch.
    pub fn rebuild(&mut self, batch: &CityBatch, state: &ProjectionState) {
        let active = self.active().map(|o| o.city_key.clone());
        if self
            .detail
            .as_ref()
            .is_some_and(|detail| batch.get(&detail.city).is_none())
        {
            self.detail = None;
        }
        let scenario = state.scenario();
        self.overlays = batch
            .samples()
            .iter()
            .map(|sample| {
                let adjusted = scenario.is_active().then(|| AdjustedReading {
                    temperature_c: state.adjusted_temperature(&self.projection, sample.temperature_c),
                    active_mt_co2: scenario.active_mt_co2(),
                });
                Overlay {
                    city_key: sample.city.clone(),
                    anchor: sample.location,
                    content: OverlayContent {
                        city: sample.city.clone(),
                        observed_temperature_c: sample.temperature_c,
                        adjusted,
                    },
                    active: active.as_deref() == Some(sample.city.as_str()),
                }
            })
            .collect();
    }

    /// The overlay whose anchor is nearest to `point`, within the hit tolerance
    pub fn hit_test(&self, point: ScreenPoint, projector: &dyn ScreenProjector) -> Option<&str> {
        self.overlays
            .iter()
            .map(|o| (o, projector.project(&o.anchor).distance(&point)))
            .filter(|(_, distance)| *distance <= self.parameters.hit_tolerance_px)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(o, _)| o.city_key.as_str())
    }

    /// Record a pointer move over `hovered`, or over nothing
    pub fn pointer_moved(&mut self, now: Instant, hovered: Option<&str>) {
        self.pending_hover = Some(PendingHover {
            target: hovered.map(str::to_string),
            moved_at: now,
        });
    }

    /// Apply the latest pointer move if the pointer has rested long enough
    ///
    /// Returns whether the active overlay was updated.
    pub fn flush(&mut self, now: Instant) -> bool {
        let delay = Duration::from_millis(self.parameters.hover_debounce_millis);
        let ready = self
            .pending_hover
            .as_ref()
            .is_some_and(|pending| now.saturating_duration_since(pending.moved_at) >= delay);
        if !ready {
            return false;
        }
        if let Some(pending) = self.pending_hover.take() {
            for overlay in self.overlays.iter_mut() {
                overlay.active = pending.target.as_deref() == Some(overlay.city_key.as_str());
            }
        }
        true
    }

    /// Capture the detail snapshot for a clicked city
    pub fn click(&mut self, city_key: &str, state: &ProjectionState) -> Option<&DetailSnapshot> {
        let overlay = self.get(city_key)?;
        let scenario = state.scenario();
        let temperature_c = overlay.content.observed_temperature_c;
        let snapshot = DetailSnapshot {
            city: overlay.city_key.clone(),
            temperature_c,
            adjusted_temperature_c: state.adjusted_temperature(&self.projection, temperature_c),
            rate_percent: scenario.rate_percent(),
            predicted_mt_co2: state.predicted_base_mt_co2(),
            active_mt_co2: scenario.active_mt_co2(),
            result_mt_co2: scenario.result_mt_co2(),
            selected_year: state.selected_year(),
        };
        self.detail = Some(snapshot);
        self.detail.as_ref()
    }

    pub fn detail(&self) -> Option<&DetailSnapshot> {
        self.detail.as_ref()
    }

    pub fn close_detail(&mut self) -> Option<DetailSnapshot> {
        self.detail.take()
    }

    /// Remove every overlay and all interaction state
    pub fn clear(&mut self) {
        self.overlays.clear();
        self.pending_hover = None;
        self.detail = None;
    }
}
