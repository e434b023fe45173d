//! Selection Controller
//!
//! Owns the single active [`SelectionState`]. Every transition bumps or checks
//! the invocation id, so work that belongs to a superseded invocation never
//! writes state. At most one timer task (spin or error recovery) is alive at a
//! time; starting new work aborts it first.

use std::sync::Arc;

use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{
    PickSource, SelectionError, SelectionSnapshot, SelectionState, AI_ERROR_MESSAGE,
    DEFAULT_CONDITION, FALLBACK_REASON, LUCKY_REASON,
};
use crate::config::{AiFailurePolicy, SelectionConfig, MIN_TICK_INTERVAL};
use crate::menu::{Catalog, MenuItem};
use crate::recommend::{RecommendError, Recommendation, RecommendationProvider};

const EVENT_CAPACITY: usize = 256;

struct Inner {
    state: SelectionState,
    selected_id: Option<String>,
    invocation: u64,
    /// Spin or recovery timer; never the AI request
    timer: Option<JoinHandle<()>>,
    rng: StdRng,
    provider: Option<Arc<dyn RecommendationProvider>>,
}

impl Inner {
    fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            state: self.state.clone(),
            selected_id: self.selected_id.clone(),
            invocation: self.invocation,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }

    /// Supersedes whatever was running and returns the new invocation id.
    fn next_invocation(&mut self) -> u64 {
        self.cancel_timer();
        self.invocation += 1;
        self.invocation
    }
}

struct Shared {
    catalog: Arc<Catalog>,
    config: SelectionConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SelectionSnapshot>,
    events_tx: broadcast::Sender<SelectionSnapshot>,
}

#[derive(Clone)]
pub struct SelectionController {
    shared: Arc<Shared>,
}

impl SelectionController {
    pub fn new(catalog: Arc<Catalog>, config: SelectionConfig) -> Self {
        Self::with_rng(catalog, config, StdRng::from_entropy())
    }

    /// Deterministic draws, for reproducible runs
    pub fn with_seed(catalog: Arc<Catalog>, config: SelectionConfig, seed: u64) -> Self {
        Self::with_rng(catalog, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(catalog: Arc<Catalog>, config: SelectionConfig, rng: StdRng) -> Self {
        let inner = Inner {
            state: SelectionState::Idle,
            selected_id: None,
            invocation: 0,
            timer: None,
            rng,
            provider: None,
        };
        let (state_tx, _) = watch::channel(inner.snapshot());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                catalog,
                config,
                inner: Mutex::new(inner),
                state_tx,
                events_tx,
            }),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.shared.catalog
    }

    /// Installs (or removes, on logout) the recommendation service.
    pub async fn set_provider(&self, provider: Option<Arc<dyn RecommendationProvider>>) {
        let mut inner = self.shared.inner.lock().await;
        inner.provider = provider;
    }

    pub async fn has_provider(&self) -> bool {
        self.shared.inner.lock().await.provider.is_some()
    }

    pub async fn snapshot(&self) -> SelectionSnapshot {
        self.shared.inner.lock().await.snapshot()
    }

    pub async fn state(&self) -> SelectionState {
        self.shared.inner.lock().await.state.clone()
    }

    /// Latest snapshot, coalesced
    pub fn watch(&self) -> watch::Receiver<SelectionSnapshot> {
        self.shared.state_tx.subscribe()
    }

    /// Every transition, in order
    pub fn subscribe(&self) -> broadcast::Receiver<SelectionSnapshot> {
        self.shared.events_tx.subscribe()
    }

    /// Whether a spin or recovery timer is still scheduled
    pub async fn has_pending_timer(&self) -> bool {
        let inner = self.shared.inner.lock().await;
        inner.timer.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// The item and reason of the current result, if any
    pub async fn current_result(&self) -> Option<(MenuItem, String)> {
        match &self.shared.inner.lock().await.state {
            SelectionState::Result { item, reason, .. } => Some((item.clone(), reason.clone())),
            _ => None,
        }
    }

    fn publish(&self, inner: &Inner) {
        let snapshot = inner.snapshot();
        self.shared.state_tx.send_replace(snapshot.clone());
        let _ = self.shared.events_tx.send(snapshot);
    }

    /// Starts a random spin, superseding any spin, error or pending request.
    pub async fn start_random_pick(&self) -> u64 {
        let mut inner = self.shared.inner.lock().await;
        self.begin_spin(&mut inner, PickSource::Random)
    }

    fn begin_spin(&self, inner: &mut Inner, source: PickSource) -> u64 {
        let invocation = inner.next_invocation();
        inner.state = SelectionState::RandomSpinning { tick: 0 };
        self.publish(inner);
        info!("Spin #{} started ({:?})", invocation, source);

        let this = self.clone();
        inner.timer = Some(tokio::spawn(async move {
            this.run_spin(invocation, source).await;
        }));
        invocation
    }

    async fn run_spin(&self, invocation: u64, source: PickSource) {
        let ticks = self.shared.config.spin_ticks.max(1);
        let mut ticker = interval(self.shared.config.tick_interval.max(MIN_TICK_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let mut settled: Option<MenuItem> = None;
        for tick in 1..=ticks {
            ticker.tick().await;

            let mut inner = self.shared.inner.lock().await;
            if inner.invocation != invocation {
                return;
            }
            // The final tick's draw is the authoritative result
            let candidate = self.shared.catalog.pick(&mut inner.rng).clone();
            inner.selected_id = Some(candidate.id.clone());
            inner.state = SelectionState::RandomSpinning { tick };
            self.publish(&inner);
            settled = Some(candidate);
        }

        sleep(self.shared.config.settle_delay).await;

        let mut inner = self.shared.inner.lock().await;
        if inner.invocation != invocation {
            return;
        }
        let Some(item) = settled else {
            return;
        };

        info!("Spin #{} settled on {}", invocation, item.name);
        inner.timer = None;
        inner.state = SelectionState::Result {
            item,
            reason: LUCKY_REASON.to_string(),
            source,
            resolved_at: Utc::now(),
        };
        self.publish(&inner);
    }

    /// Asks the recommendation service. Only allowed from `Idle`, and only
    /// with a provider installed.
    pub async fn start_ai_recommendation(&self, condition: &str) -> Result<u64, SelectionError> {
        let mut inner = self.shared.inner.lock().await;
        if !inner.state.is_idle() {
            return Err(SelectionError::Busy);
        }
        let provider = inner.provider.clone().ok_or(SelectionError::MissingCredential)?;

        let condition = match condition.trim() {
            "" => DEFAULT_CONDITION.to_string(),
            trimmed => trimmed.to_string(),
        };

        let invocation = inner.next_invocation();
        inner.state = SelectionState::AiThinking;
        inner.selected_id = None;
        self.publish(&inner);
        info!("Recommendation #{} requested: {}", invocation, condition);

        // The request itself is never aborted; its answer is dropped if stale.
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = provider.recommend(&condition).await;
            this.resolve_recommendation(invocation, outcome).await;
        });

        Ok(invocation)
    }

    async fn resolve_recommendation(
        &self,
        invocation: u64,
        outcome: Result<Recommendation, RecommendError>,
    ) {
        let mut inner = self.shared.inner.lock().await;
        if inner.invocation != invocation || inner.state != SelectionState::AiThinking {
            debug!("Discarding stale recommendation #{}", invocation);
            return;
        }

        match outcome {
            Ok(rec) => match self.shared.catalog.find_by_name(&rec.menu_name) {
                Some(item) => {
                    info!("Recommendation #{} resolved to {}", invocation, item.name);
                    inner.selected_id = Some(item.id.clone());
                    inner.state = SelectionState::Result {
                        item: item.clone(),
                        reason: rec.reason,
                        source: PickSource::Ai,
                        resolved_at: Utc::now(),
                    };
                    self.publish(&inner);
                }
                None => {
                    warn!("Recommended '{}' is not on the menu; spinning instead", rec.menu_name);
                    self.begin_spin(&mut inner, PickSource::Fallback);
                }
            },
            Err(e) if e.is_unusable_payload() => {
                warn!("Recommendation #{} unusable ({}); spinning instead", invocation, e);
                self.begin_spin(&mut inner, PickSource::Fallback);
            }
            Err(e) => match self.shared.config.failure_policy {
                AiFailurePolicy::TransientError => {
                    warn!("Recommendation #{} failed: {}", invocation, e);
                    self.enter_error(&mut inner, invocation);
                }
                AiFailurePolicy::RandomFallback => {
                    warn!("Recommendation #{} failed ({}); answering with a random pick", invocation, e);
                    let item = self.shared.catalog.pick(&mut inner.rng).clone();
                    inner.selected_id = Some(item.id.clone());
                    inner.state = SelectionState::Result {
                        item,
                        reason: FALLBACK_REASON.to_string(),
                        source: PickSource::Fallback,
                        resolved_at: Utc::now(),
                    };
                    self.publish(&inner);
                }
            },
        }
    }

    fn enter_error(&self, inner: &mut Inner, invocation: u64) {
        inner.cancel_timer();
        inner.state = SelectionState::Error {
            message: AI_ERROR_MESSAGE.to_string(),
        };
        self.publish(inner);

        let this = self.clone();
        let delay = self.shared.config.recovery_delay;
        inner.timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            let mut inner = this.shared.inner.lock().await;
            if inner.invocation == invocation && matches!(inner.state, SelectionState::Error { .. }) {
                debug!("Recovered from error #{}", invocation);
                inner.timer = None;
                inner.state = SelectionState::Idle;
                inner.selected_id = None;
                this.publish(&inner);
            }
        }));
    }

    /// Dismisses a result.
    pub async fn reset(&self) -> Result<(), SelectionError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state.is_idle() {
            return Ok(());
        }
        if !inner.state.is_result() {
            return Err(SelectionError::InvalidTransition(inner.state.mode()));
        }

        inner.next_invocation();
        inner.state = SelectionState::Idle;
        inner.selected_id = None;
        self.publish(&inner);
        Ok(())
    }

    /// Abandons whatever is in progress and returns to `Idle`.
    pub async fn cancel(&self) {
        let mut inner = self.shared.inner.lock().await;
        let invocation = inner.next_invocation();
        inner.state = SelectionState::Idle;
        inner.selected_id = None;
        self.publish(&inner);
        debug!("Selection cancelled (now #{})", invocation);
    }
}
