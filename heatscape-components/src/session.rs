//! A running heat-field session
//!
//! [`HeatscapeSession`] lives on the thread that drives the UI. Scenario edits are applied
//! there synchronously; the refresh loop, pulse animation and narrative requests run as
//! tokio tasks and only publish through watch channels, which the session reads on
//! [`HeatscapeSession::sync`].

use heatscape_core::errors::HeatscapeResult;
use heatscape_core::historical::{HistoricalTable, TrendSummary};
use heatscape_core::projection::ProjectionModel;
use heatscape_core::state::{ProjectionController, ProjectionEvent, ProjectionState};
use heatscape_core::{FloatValue, Year};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::info;

use crate::city_store::{CityBatch, CitySampleStore, RefreshHandle, RefreshLoop, RefreshOutcome};
use crate::collaborators::{NarrativeProvider, RegionBoundaryProvider, WeatherProvider};
use crate::config::EngineConfig;
use crate::heat_field::{frame_ticks, spawn_pulse, AnimationHandle, HeatFieldRenderer, HeatLayer};
use crate::jitter::GeoJitterSampler;
use crate::narrative::{NarrativeRequest, NarrativeScheduler, NarrativeUpdate};
use crate::overlay::{DetailSnapshot, OverlayController, ScreenPoint, ScreenProjector};
use crate::regions::ChoroplethLayer;

/// External services used by a session
#[derive(Clone)]
pub struct Collaborators {
    pub weather: Arc<dyn WeatherProvider>,
    pub narrative: Arc<dyn NarrativeProvider>,
    /// Source of region outlines; `None` disables the choropleth
    pub regions: Option<Arc<dyn RegionBoundaryProvider>>,
}

pub struct HeatscapeSession {
    config: EngineConfig,
    controller: ProjectionController,
    trend: TrendSummary,
    weather: Arc<dyn WeatherProvider>,
    store: Arc<CitySampleStore>,
    batches: watch::Receiver<Arc<CityBatch>>,
    batch: Arc<CityBatch>,
    refresh: Option<RefreshHandle>,
    renderer: HeatFieldRenderer,
    heat_layer: Option<HeatLayer>,
    pulse: Option<AnimationHandle>,
    radius: watch::Receiver<FloatValue>,
    overlays: OverlayController,
    narrative: NarrativeScheduler,
    choropleth: ChoroplethLayer,
    torn_down: bool,
}

impl std::fmt::Debug for HeatscapeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeatscapeSession")
            .field("state", self.controller.state())
            .field("generation", &self.batch.generation())
            .field("running", &self.is_running())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl HeatscapeSession {
    /// Fit the projection model and start the background tasks
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(
        config: EngineConfig,
        table: HistoricalTable,
        collaborators: Collaborators,
    ) -> HeatscapeResult<Self> {
        config.validate()?;

        let model = ProjectionModel::fit(table, config.projection)?;
        let trend = model.table().trend_summary()?;
        let mut controller = ProjectionController::new(
            Arc::new(model),
            config.horizon,
            config.initial_year,
            config.initial_rate,
        )?;

        let narrative =
            NarrativeScheduler::new(collaborators.narrative.clone(), config.narrative.clone());
        let scheduler = narrative.clone();
        controller.subscribe(move |event: ProjectionEvent, state: &ProjectionState| {
            if let ProjectionEvent::SelectedYearChanged(_) = event {
                scheduler.request(NarrativeRequest::from_state(state, trend));
            }
        });

        let renderer = HeatFieldRenderer::new(GeoJitterSampler::new(config.jitter)?);
        let store = Arc::new(CitySampleStore::new(config.cities.clone()));
        let batches = store.subscribe();
        let batch = store.latest();
        let refresh = RefreshLoop::spawn(
            store.clone(),
            collaborators.weather.clone(),
            config.refresh.period(),
        )?;
        let (pulse, radius) = spawn_pulse(config.pulse, frame_ticks(&config.pulse))?;

        let choropleth = match &collaborators.regions {
            Some(provider) => ChoroplethLayer::load(provider.as_ref(), &config.regions).await,
            None => ChoroplethLayer::default(),
        };

        info!(
            cities = config.cities.len(),
            year = config.initial_year,
            "Heatscape session started"
        );
        Ok(Self {
            overlays: OverlayController::new(config.overlay, config.projection),
            config,
            controller,
            trend,
            weather: collaborators.weather,
            store,
            batches,
            batch,
            refresh: Some(refresh),
            renderer,
            heat_layer: None,
            pulse: Some(pulse),
            radius,
            narrative,
            choropleth,
            torn_down: false,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn controller(&self) -> &ProjectionController {
        &self.controller
    }

    pub fn state(&self) -> &ProjectionState {
        self.controller.state()
    }

    pub fn trend(&self) -> &TrendSummary {
        &self.trend
    }

    pub fn set_rate(&mut self, rate_percent: FloatValue) -> HeatscapeResult<()> {
        self.controller.set_rate(rate_percent)?;
        self.rebuild_overlays();
        Ok(())
    }

    pub fn set_base_override(&mut self, base_mt_co2: FloatValue) -> HeatscapeResult<()> {
        self.controller.set_base_override(base_mt_co2)?;
        self.rebuild_overlays();
        Ok(())
    }

    pub fn clear_base_override(&mut self) -> HeatscapeResult<()> {
        self.controller.clear_base_override()?;
        self.rebuild_overlays();
        Ok(())
    }

    /// Select a year; schedules a narrative update
    ///
    /// The narrative request runs on the runtime the session was started on, so this may
    /// be called from a thread outside it.
    pub fn set_selected_year(&mut self, year: Year) -> HeatscapeResult<()> {
        self.controller.set_selected_year(year)?;
        self.rebuild_overlays();
        Ok(())
    }

    /// Refresh the weather batch now, outside of the regular interval
    ///
    /// Skipped once the session has been torn down.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        if self.torn_down {
            return RefreshOutcome::Skipped;
        }
        self.store.refresh(self.weather.as_ref()).await
    }

    /// Pick up a newly published weather batch
    ///
    /// Returns whether a new batch was found, in which case overlays and the heat layer
    /// have been rebuilt. Always false after [`Self::teardown`].
    pub fn sync(&mut self) -> bool {
        self.sync_with(&mut rand::thread_rng())
    }

    /// [`Self::sync`] with a caller-supplied random source for the jitter
    pub fn sync_with<R: Rng>(&mut self, rng: &mut R) -> bool {
        if self.torn_down {
            return false;
        }
        let latest = self.batches.borrow_and_update().clone();
        if latest.generation() == self.batch.generation() {
            return false;
        }
        self.batch = latest;
        self.rebuild_overlays();
        self.heat_layer = self.renderer.build_layer(&self.batch, rng);
        true
    }

    pub fn batch(&self) -> &Arc<CityBatch> {
        &self.batch
    }

    pub fn heat_layer(&self) -> Option<&HeatLayer> {
        self.heat_layer.as_ref()
    }

    /// Latest radius published by the pulse animation
    pub fn pulse_radius(&self) -> FloatValue {
        *self.radius.borrow()
    }

    pub fn overlays(&self) -> &OverlayController {
        &self.overlays
    }

    pub fn pointer_moved(&mut self, now: Instant, hovered: Option<&str>) {
        self.overlays.pointer_moved(now, hovered);
    }

    /// Hit-test `point` and record the result as the hovered overlay
    pub fn pointer_at(&mut self, now: Instant, point: ScreenPoint, projector: &dyn ScreenProjector) {
        let hovered = self.overlays.hit_test(point, projector).map(str::to_string);
        self.overlays.pointer_moved(now, hovered.as_deref());
    }

    pub fn flush_hover(&mut self, now: Instant) -> bool {
        self.overlays.flush(now)
    }

    pub fn click(&mut self, city_key: &str) -> Option<&DetailSnapshot> {
        self.overlays.click(city_key, self.controller.state())
    }

    pub fn close_detail(&mut self) -> Option<DetailSnapshot> {
        self.overlays.close_detail()
    }

    pub fn narrative(&self) -> NarrativeUpdate {
        self.narrative.latest()
    }

    pub fn narrative_updates(&self) -> watch::Receiver<NarrativeUpdate> {
        self.narrative.subscribe()
    }

    pub fn choropleth(&self) -> &ChoroplethLayer {
        &self.choropleth
    }

    /// Whether the refresh loop and the pulse animation are both running
    pub fn is_running(&self) -> bool {
        let refresh = self.refresh.as_ref().is_some_and(RefreshHandle::is_running);
        let pulse = self.pulse.as_ref().is_some_and(AnimationHandle::is_running);
        refresh && pulse
    }

    /// Stop all background work and drop the interactive state
    ///
    /// This is final: later edits still update the projection state but no longer build
    /// overlays or heat layers. Calling it more than once is harmless.
    pub fn teardown(&mut self) {
        let was_running = self.refresh.is_some() || self.pulse.is_some();
        if let Some(refresh) = self.refresh.take() {
            refresh.stop();
        }
        if let Some(pulse) = self.pulse.take() {
            pulse.stop();
        }
        self.narrative.cancel();
        self.controller.clear_subscribers();
        self.overlays.clear();
        self.heat_layer = None;
        self.torn_down = true;
        if was_running {
            info!("Heatscape session torn down");
        }
    }

    fn rebuild_overlays(&mut self) {
        if self.torn_down {
            return;
        }
        self.overlays.rebuild(&self.batch, self.controller.state());
    }
}

impl Drop for HeatscapeSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
