//! Heat field rendering
//!
//! Two independent pieces:
//!
//! - [`Gradient`] selection and [`HeatFieldRenderer::build_layer`], recomputed from each
//!   weather batch
//! - a pulsing radius animation ([`PulseAnimation`], [`spawn_pulse`]) that runs on its own
//!   task and never waits on data refreshes
//!
//! The animation is driven by a [`TickSource`] so tests can step it frame by frame.

use async_trait::async_trait;
use heatscape_core::errors::{HeatscapeError, HeatscapeResult};
use heatscape_core::FloatValue;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::city_store::{CityBatch, CityWeatherSample};
use crate::jitter::{DensitySample, GeoJitterSampler};

/// Minimum and maximum temperature of a batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    /// unit: °C
    pub min: FloatValue,
    /// unit: °C
    pub max: FloatValue,
}

impl TemperatureRange {
    /// Range over `samples`, `None` if there are none
    pub fn from_samples(samples: &[CityWeatherSample]) -> Option<Self> {
        let mut temperatures = samples.iter().map(|s| s.temperature_c);
        let first = temperatures.next()?;
        Some(temperatures.fold(Self { min: first, max: first }, |range, t| Self {
            min: range.min.min(t),
            max: range.max.max(t),
        }))
    }
}

/// An RGBA colour
pub type Rgba = [u8; 4];

/// Colour at a normalised position of a gradient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub position: FloatValue,
    pub color: Rgba,
}

const fn stop(position: FloatValue, color: Rgba) -> GradientStop {
    GradientStop { position, color }
}

const COLD_DOMINANT: [GradientStop; 4] = [
    stop(0.0, [0, 0, 255, 0]),
    stop(0.4, [0, 128, 255, 160]),
    stop(0.7, [0, 255, 255, 200]),
    stop(1.0, [255, 255, 255, 230]),
];

const HOT_DOMINANT: [GradientStop; 4] = [
    stop(0.0, [255, 255, 0, 0]),
    stop(0.5, [255, 128, 0, 170]),
    stop(0.8, [255, 0, 0, 210]),
    stop(1.0, [128, 0, 0, 240]),
];

const NARROW_BAND: [GradientStop; 3] = [
    stop(0.0, [255, 255, 178, 0]),
    stop(0.5, [254, 204, 92, 170]),
    stop(1.0, [253, 141, 60, 220]),
];

const WARM_BAND: [GradientStop; 4] = [
    stop(0.0, [255, 237, 160, 0]),
    stop(0.4, [254, 178, 76, 160]),
    stop(0.7, [240, 59, 32, 200]),
    stop(1.0, [189, 0, 38, 230]),
];

const MIXED: [GradientStop; 5] = [
    stop(0.0, [0, 0, 255, 0]),
    stop(0.35, [0, 255, 255, 150]),
    stop(0.5, [0, 255, 0, 170]),
    stop(0.75, [255, 255, 0, 200]),
    stop(1.0, [255, 0, 0, 230]),
];

/// The fixed heat field colour schemes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gradient {
    ColdDominant,
    HotDominant,
    NarrowBand,
    WarmBand,
    Mixed,
}

impl Gradient {
    /// Pick a gradient for a batch's temperature range
    ///
    /// Rules are evaluated in order and the first match wins.
    pub fn select(min: FloatValue, max: FloatValue) -> Self {
        if min < 10.0 {
            Gradient::ColdDominant
        } else if max > 35.0 {
            Gradient::HotDominant
        } else if min >= 25.0 && max <= 26.0 {
            Gradient::NarrowBand
        } else if min >= 25.0 && max <= 35.0 {
            Gradient::WarmBand
        } else {
            Gradient::Mixed
        }
    }

    pub fn for_range(range: TemperatureRange) -> Self {
        Self::select(range.min, range.max)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Gradient::ColdDominant => "cold_dominant",
            Gradient::HotDominant => "hot_dominant",
            Gradient::NarrowBand => "narrow_band",
            Gradient::WarmBand => "warm_band",
            Gradient::Mixed => "mixed",
        }
    }

    pub fn stops(&self) -> &'static [GradientStop] {
        match self {
            Gradient::ColdDominant => &COLD_DOMINANT,
            Gradient::HotDominant => &HOT_DOMINANT,
            Gradient::NarrowBand => &NARROW_BAND,
            Gradient::WarmBand => &WARM_BAND,
            Gradient::Mixed => &MIXED,
        }
    }

    /// Linearly interpolated colour at `position`, clamped to `[0, 1]`
    pub fn color_at(&self, position: FloatValue) -> Rgba {
        let stops = self.stops();
        let position = position.clamp(0.0, 1.0);
        let upper = stops
            .iter()
            .position(|s| s.position >= position)
            .unwrap_or(stops.len() - 1);
        if upper == 0 {
            return stops[0].color;
        }
        let (a, b) = (stops[upper - 1], stops[upper]);
        let t = (position - a.position) / (b.position - a.position);
        let mut color = [0; 4];
        for (i, channel) in color.iter_mut().enumerate() {
            let (from, to) = (a.color[i] as FloatValue, b.color[i] as FloatValue);
            *channel = (from + (to - from) * t).round() as u8;
        }
        color
    }
}

/// Everything needed to draw the heat field for one batch
#[derive(Debug, Clone)]
pub struct HeatLayer {
    /// Generation of the batch the layer was built from
    pub generation: u64,
    pub range: TemperatureRange,
    pub gradient: Gradient,
    pub points: Vec<DensitySample>,
}

/// Builds heat layers from weather batches
#[derive(Debug, Clone)]
pub struct HeatFieldRenderer {
    sampler: GeoJitterSampler,
}

impl HeatFieldRenderer {
    pub fn new(sampler: GeoJitterSampler) -> Self {
        Self { sampler }
    }

    pub fn sampler(&self) -> &GeoJitterSampler {
        &self.sampler
    }

    /// Jitter the batch and pick its gradient; `None` for an empty batch
    pub fn build_layer<R: Rng>(&self, batch: &CityBatch, rng: &mut R) -> Option<HeatLayer> {
        let range = TemperatureRange::from_samples(batch.samples())?;
        Some(HeatLayer {
            generation: batch.generation(),
            range,
            gradient: Gradient::for_range(range),
            points: self.sampler.expand_batch(batch, rng),
        })
    }
}

/// Parameters of the pulsing radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseParameters {
    /// Centre of the oscillation
    ///
    /// unit: px
    ///
    /// Default: 25.0
    pub base_radius: FloatValue,

    /// Amplitude of the oscillation
    ///
    /// unit: px
    ///
    /// Default: 5.0
    pub delta: FloatValue,

    /// Change in radius per frame
    ///
    /// unit: px
    ///
    /// Default: 0.25
    pub step: FloatValue,

    /// Time between frames
    ///
    /// Default: 16
    pub frame_millis: u64,
}

impl Default for PulseParameters {
    fn default() -> Self {
        Self {
            base_radius: 25.0,
            delta: 5.0,
            step: 0.25,
            frame_millis: 16,
        }
    }
}

impl PulseParameters {
    pub fn validate(&self) -> HeatscapeResult<()> {
        let valid = self.base_radius.is_finite()
            && self.delta.is_finite()
            && self.step.is_finite()
            && self.delta >= 0.0
            && self.step > 0.0
            && self.base_radius - self.delta >= 0.0
            && self.frame_millis > 0;
        if valid {
            Ok(())
        } else {
            Err(HeatscapeError::ConfigError(format!(
                "Invalid pulse parameters {:?}",
                self
            )))
        }
    }

    pub fn min_radius(&self) -> FloatValue {
        self.base_radius - self.delta
    }

    pub fn max_radius(&self) -> FloatValue {
        self.base_radius + self.delta
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.frame_millis)
    }

    /// Radius after `ticks` frames
    ///
    /// Starts at the base radius moving outwards, and reflects off both bounds.
    pub fn radius_after(&self, ticks: u64) -> FloatValue {
        if self.delta == 0.0 {
            return self.base_radius;
        }
        let sweep = 2.0 * self.delta;
        // Distance from the lower bound along the unfolded path
        let travelled = (self.delta + ticks as FloatValue * self.step) % (2.0 * sweep);
        if travelled <= sweep {
            self.min_radius() + travelled
        } else {
            self.min_radius() + 2.0 * sweep - travelled
        }
    }
}

/// Triangle-wave radius oscillation, one step per frame
#[derive(Debug, Clone)]
pub struct PulseAnimation {
    parameters: PulseParameters,
    ticks: u64,
}

impl PulseAnimation {
    pub fn new(parameters: PulseParameters) -> HeatscapeResult<Self> {
        parameters.validate()?;
        Ok(Self {
            parameters,
            ticks: 0,
        })
    }

    pub fn radius(&self) -> FloatValue {
        self.parameters.radius_after(self.ticks)
    }

    /// Move to the next frame and return its radius
    pub fn advance(&mut self) -> FloatValue {
        self.ticks += 1;
        self.radius()
    }
}

/// Source of animation frames
#[async_trait]
pub trait TickSource: Send {
    /// Wait for the next frame, returning `false` once no more frames will come
    async fn tick(&mut self) -> bool;
}

#[async_trait]
impl TickSource for tokio::time::Interval {
    async fn tick(&mut self) -> bool {
        tokio::time::Interval::tick(self).await;
        true
    }
}

#[async_trait]
impl TickSource for mpsc::Receiver<()> {
    async fn tick(&mut self) -> bool {
        self.recv().await.is_some()
    }
}

/// Frame ticks at the configured frame rate
pub fn frame_ticks(parameters: &PulseParameters) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(parameters.frame_period());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval
}

/// Run the pulse animation until stopped, the tick source ends, or every receiver is gone
///
/// Must be called from within a tokio runtime.
pub fn spawn_pulse<T: TickSource + 'static>(
    parameters: PulseParameters,
    mut ticks: T,
) -> HeatscapeResult<(AnimationHandle, watch::Receiver<FloatValue>)> {
    let mut animation = PulseAnimation::new(parameters)?;
    let (sender, receiver) = watch::channel(animation.radius());
    let task = tokio::spawn(async move {
        while ticks.tick().await {
            if sender.send(animation.advance()).is_err() {
                break;
            }
        }
    });
    Ok((AnimationHandle { task }, receiver))
}

/// Owner of a running animation; stopping or dropping it cancels the task
#[derive(Debug)]
pub struct AnimationHandle {
    task: JoinHandle<()>,
}

impl AnimationHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for AnimationHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
