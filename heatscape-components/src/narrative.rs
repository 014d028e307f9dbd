//! Debounced narrative requests
//!
//! Narrative text is regenerated when the selected year changes. Requests are debounced on
//! the trailing edge and numbered: a request supersedes every earlier one, whose pending
//! task is aborted and whose late reply, if any, is discarded.

use heatscape_core::historical::TrendSummary;
use heatscape_core::state::ProjectionState;
use heatscape_core::{FloatValue, Year};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::collaborators::NarrativeProvider;

/// Structured inputs sent alongside the prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeParams {
    pub year: Year,
    /// Projected temperature for the selected year, if the horizon covers it
    ///
    /// unit: °C
    pub temperature: Option<FloatValue>,
    /// Projected emissions for the selected year, if the horizon covers it
    ///
    /// unit: MtCO2
    pub co2: Option<FloatValue>,
    /// unit: %
    pub emission_rate: FloatValue,
    /// unit: MtCO2
    #[serde(rename = "baseMtCO2")]
    pub base_mt_co2: FloatValue,
    /// unit: MtCO2
    #[serde(rename = "adjustedMtCO2")]
    pub adjusted_mt_co2: FloatValue,
    pub trend: TrendSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeRequest {
    pub prompt: String,
    pub params: NarrativeParams,
}

impl NarrativeRequest {
    /// Describe the current projection state
    pub fn from_state(state: &ProjectionState, trend: TrendSummary) -> Self {
        let year = state.selected_year();
        let scenario = state.scenario();
        let params = NarrativeParams {
            year,
            temperature: state.selected_temperature(),
            co2: state.series().co2_at(year),
            emission_rate: scenario.rate_percent(),
            base_mt_co2: scenario.base_mt_co2(),
            adjusted_mt_co2: scenario.result_mt_co2(),
            trend,
        };
        let prompt = format!(
            "Summarise the climate outlook for {} if emissions grow at {:.0}% over a base of \
             {:.2} MtCO2, given the historical trend from {} to {}.",
            year,
            params.emission_rate,
            params.base_mt_co2,
            trend.first_year,
            trend.last_year
        );
        Self { prompt, params }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeReply {
    pub reply: String,
}

/// Parameters of the narrative scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeParameters {
    /// Quiet period after the last request before the collaborator is called
    ///
    /// Default: 600
    pub debounce_millis: u64,

    /// Text published when the collaborator fails
    pub placeholder: String,
}

impl Default for NarrativeParameters {
    fn default() -> Self {
        Self {
            debounce_millis: 600,
            placeholder: "Narrative unavailable at the moment.".to_string(),
        }
    }
}

/// Latest published narrative
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NarrativeUpdate {
    /// Number of the request that produced the text, zero before any
    pub generation: u64,
    pub text: String,
}

struct SchedulerInner {
    provider: Arc<dyn NarrativeProvider>,
    parameters: NarrativeParameters,
    generation: AtomicU64,
    pending: Mutex<Option<JoinHandle<()>>>,
    updates: watch::Sender<NarrativeUpdate>,
    runtime: Option<Handle>,
}

impl SchedulerInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn replace_pending(&self, task: Option<JoinHandle<()>>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = std::mem::replace(&mut *pending, task) {
            previous.abort();
        }
    }

    async fn run(&self, generation: u64, request: NarrativeRequest) {
        tokio::time::sleep(Duration::from_millis(self.parameters.debounce_millis)).await;
        if !self.is_current(generation) {
            return;
        }

        let text = match self.provider.narrate(&request).await {
            Ok(reply) => reply.reply,
            Err(e) => {
                warn!(generation, error = %e, "Narrative request failed; showing placeholder");
                self.parameters.placeholder.clone()
            }
        };

        let published = self.updates.send_if_modified(|current| {
            if current.generation < generation && self.is_current(generation) {
                *current = NarrativeUpdate { generation, text };
                true
            } else {
                false
            }
        });
        if !published {
            debug!(generation, "Discarding superseded narrative");
        }
    }
}

/// Trailing-edge debouncer in front of a [`NarrativeProvider`]
///
/// Cloning yields another handle on the same scheduler.
#[derive(Clone)]
pub struct NarrativeScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for NarrativeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrativeScheduler")
            .field("parameters", &self.inner.parameters)
            .field("generation", &self.generation())
            .finish()
    }
}

impl NarrativeScheduler {
    /// Create a scheduler bound to the current tokio runtime, if there is one
    ///
    /// Requests are spawned on that runtime, so they can be made from any thread.
    pub fn new(provider: Arc<dyn NarrativeProvider>, parameters: NarrativeParameters) -> Self {
        let (updates, _) = watch::channel(NarrativeUpdate::default());
        Self {
            inner: Arc::new(SchedulerInner {
                provider,
                parameters,
                generation: AtomicU64::new(0),
                pending: Mutex::new(None),
                updates,
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    pub fn parameters(&self) -> &NarrativeParameters {
        &self.inner.parameters
    }

    /// Number of the most recent request
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Supersede any earlier request with `request`
    ///
    /// Returns the generation number of the new request. A scheduler created outside a
    /// runtime must be called from within one.
    pub fn request(&self, request: NarrativeRequest) -> u64 {
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let inner = self.inner.clone();
        let work = async move { inner.run(generation, request).await };
        let task = match &self.inner.runtime {
            Some(runtime) => runtime.spawn(work),
            None => tokio::spawn(work),
        };
        self.inner.replace_pending(Some(task));
        debug!(generation, "Narrative request scheduled");
        generation
    }

    /// Abort pending work; replies still in flight are discarded
    pub fn cancel(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.replace_pending(None);
    }

    pub fn latest(&self) -> NarrativeUpdate {
        self.inner.updates.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NarrativeUpdate> {
        self.inner.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use heatscape_core::errors::{HeatscapeError, HeatscapeResult};
    use heatscape_core::historical::HistoricalTable;
    use heatscape_core::projection::{HorizonRange, ProjectionParameters};
    use heatscape_core::state::ProjectionController;

    /// Replies with the prompt after a fixed latency, recording every call
    struct FakeNarrator {
        latency: Duration,
        fail: bool,
        calls: Mutex<Vec<Year>>,
    }

    impl FakeNarrator {
        fn new(latency: Duration) -> Self {
            Self {
                latency,
                fail: false,
                calls: Mutex::new(vec![]),
            }
        }

        fn calls(&self) -> Vec<Year> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NarrativeProvider for FakeNarrator {
        async fn narrate(&self, request: &NarrativeRequest) -> HeatscapeResult<NarrativeReply> {
            self.calls.lock().unwrap().push(request.params.year);
            tokio::time::sleep(self.latency).await;
            if self.fail {
                return Err(HeatscapeError::collaborator("narrative", "503"));
            }
            Ok(NarrativeReply {
                reply: format!("outlook for {}", request.params.year),
            })
        }
    }

    fn trend() -> TrendSummary {
        HistoricalTable::reference().trend_summary().unwrap()
    }

    fn request_for(year: Year) -> NarrativeRequest {
        NarrativeRequest {
            prompt: format!("outlook {}", year),
            params: NarrativeParams {
                year,
                temperature: Some(28.0),
                co2: Some(160.0),
                emission_rate: 70.0,
                base_mt_co2: 155.38,
                adjusted_mt_co2: 264.146,
                trend: trend(),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_debounced() {
        let narrator = Arc::new(FakeNarrator::new(Duration::ZERO));
        let scheduler = NarrativeScheduler::new(narrator.clone(), NarrativeParameters::default());
        let mut updates = scheduler.subscribe();

        for year in [2020, 2021, 2022] {
            scheduler.request(request_for(year));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(narrator.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(narrator.calls(), vec![2022]);
        assert!(updates.has_changed().unwrap());
        assert_eq!(
            *updates.borrow_and_update(),
            NarrativeUpdate {
                generation: 3,
                text: "outlook for 2022".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reply_is_discarded() {
        let narrator = Arc::new(FakeNarrator::new(Duration::from_millis(500)));
        let scheduler = NarrativeScheduler::new(narrator.clone(), NarrativeParameters::default());

        scheduler.request(request_for(2020));
        // Past the debounce, while the first reply is still in flight
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(narrator.calls(), vec![2020]);
        scheduler.request(request_for(2025));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(narrator.calls(), vec![2020, 2025]);
        assert_eq!(
            scheduler.latest(),
            NarrativeUpdate {
                generation: 2,
                text: "outlook for 2025".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_publishes_placeholder() {
        let narrator = Arc::new(FakeNarrator {
            fail: true,
            ..FakeNarrator::new(Duration::from_millis(10))
        });
        let parameters = NarrativeParameters::default();
        let scheduler = NarrativeScheduler::new(narrator, parameters.clone());

        let generation = scheduler.request(request_for(2024));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let latest = scheduler.latest();
        assert_eq!(latest.generation, generation);
        assert_eq!(latest.text, parameters.placeholder);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_request() {
        let narrator = Arc::new(FakeNarrator::new(Duration::ZERO));
        let scheduler = NarrativeScheduler::new(narrator.clone(), NarrativeParameters::default());

        scheduler.request(request_for(2020));
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(narrator.calls().is_empty());
        assert_eq!(scheduler.latest(), NarrativeUpdate::default());
    }

    #[test]
    fn test_request_from_outside_the_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        let narrator = Arc::new(FakeNarrator::new(Duration::ZERO));
        let scheduler = {
            let _entered = runtime.enter();
            NarrativeScheduler::new(narrator.clone(), NarrativeParameters::default())
        };

        // No runtime context on this thread; the task goes to the captured runtime
        let generation = scheduler.request(request_for(2030));
        runtime.block_on(async { tokio::time::sleep(Duration::from_secs(1)).await });

        assert_eq!(narrator.calls(), vec![2030]);
        assert_eq!(scheduler.latest().generation, generation);
    }

    #[test]
    fn test_request_from_state() {
        let controller = ProjectionController::from_table(
            HistoricalTable::reference(),
            ProjectionParameters::default(),
            HorizonRange::default(),
            2020,
        )
        .unwrap();
        let state = controller.state();
        let request = NarrativeRequest::from_state(state, trend());

        assert_eq!(request.params.year, 2020);
        assert_eq!(request.params.temperature, state.selected_temperature());
        assert_eq!(request.params.emission_rate, 70.0);
        assert_eq!(request.params.adjusted_mt_co2, state.scenario().result_mt_co2());
        assert!(request.prompt.contains("2020"));

        let json = serde_json::to_value(&request).unwrap();
        let params = &json["params"];
        for key in ["temperature", "co2", "emissionRate", "baseMtCO2", "adjustedMtCO2", "trend"] {
            assert!(params.get(key).is_some(), "missing {}", key);
        }
    }
}
