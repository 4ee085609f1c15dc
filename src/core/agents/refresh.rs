use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::models::usage::UsageSnapshot;
use crate::core::providers::{self, ProviderCtx, ProviderError, ProviderKind};

/// Per-provider fetch pipeline state.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchPhase {
    /// No fetch yet, or no usable credential (login prompt)
    Idle,
    Fetching,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ProviderState {
    pub phase: FetchPhase,
    /// Last known-good snapshot; a failed poll never discards it
    pub snapshot: Option<UsageSnapshot>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            phase: FetchPhase::Idle,
            snapshot: None,
        }
    }
}

/// Provider id → latest state. Written only by that provider's own
/// pipeline; read by any observer.
pub type SharedStates = Arc<RwLock<HashMap<ProviderKind, ProviderState>>>;

pub type BoxFuture<T> = Pin<Box<dyn std::future::Future<Output = T> + Send>>;
pub type FetchFn =
    Arc<dyn Fn(ProviderKind) -> BoxFuture<Result<UsageSnapshot, ProviderError>> + Send + Sync>;
pub type AvailableFn =
    Arc<dyn Fn(ProviderKind) -> BoxFuture<Result<bool, ProviderError>> + Send + Sync>;

struct Lane {
    trigger: Arc<Notify>,
    /// Held for the duration of one fetch; a try_lock miss means a fetch
    /// is already in flight and the new trigger is coalesced, not queued.
    guard: Arc<Mutex<()>>,
}

/// Schedules periodic usage polls, one independent task per provider, so
/// a stalled provider never delays another.
pub struct RefreshAgent {
    interval: Duration,
    fetch: FetchFn,
    available: AvailableFn,
    states: SharedStates,
    publish: mpsc::Sender<UsageSnapshot>,
    cancel: CancellationToken,
    lanes: HashMap<ProviderKind, Lane>,
}

impl RefreshAgent {
    /// Production wiring: fetch and availability dispatch through the
    /// provider table.
    pub fn new(
        ctx: ProviderCtx,
        interval: Duration,
        publish: mpsc::Sender<UsageSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        let fetch_ctx = ctx.clone();
        let fetch: FetchFn = Arc::new(move |kind| {
            let ctx = fetch_ctx.clone();
            Box::pin(async move { providers::fetch_usage(&ctx, kind).await })
        });
        let avail_ctx = ctx;
        let available: AvailableFn = Arc::new(move |kind| {
            let ctx = avail_ctx.clone();
            Box::pin(async move { providers::is_available(&ctx, kind).await })
        });
        Self::with_pipeline(interval, fetch, available, publish, cancel)
    }

    /// Custom pipeline entry points (tests inject these).
    pub fn with_pipeline(
        interval: Duration,
        fetch: FetchFn,
        available: AvailableFn,
        publish: mpsc::Sender<UsageSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        let lanes = ProviderKind::all()
            .iter()
            .map(|kind| {
                (
                    *kind,
                    Lane {
                        trigger: Arc::new(Notify::new()),
                        guard: Arc::new(Mutex::new(())),
                    },
                )
            })
            .collect();
        Self {
            interval,
            fetch,
            available,
            states: Arc::new(RwLock::new(HashMap::new())),
            publish,
            cancel,
            lanes,
        }
    }

    pub fn states(&self) -> SharedStates {
        Arc::clone(&self.states)
    }

    /// Request an immediate poll, bypassing the timer. A fetch already in
    /// flight for the provider absorbs the request.
    pub fn trigger(&self, kind: ProviderKind) {
        self.lanes[&kind].trigger.notify_one();
    }

    /// Spawn one timer loop per provider. Tasks stop when the
    /// cancellation token fires.
    pub fn spawn(self: &Arc<Self>, providers: &[ProviderKind]) -> Vec<JoinHandle<()>> {
        providers
            .iter()
            .map(|kind| {
                let agent = Arc::clone(self);
                let kind = *kind;
                tokio::spawn(async move { agent.run_provider(kind).await })
            })
            .collect()
    }

    async fn run_provider(&self, kind: ProviderKind) {
        let trigger = Arc::clone(&self.lanes[&kind].trigger);
        tracing::info!("refresh loop started for {}", kind.id());

        // Populate state before the first tick
        self.poll(kind).await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => self.poll(kind).await,
                _ = trigger.notified() => self.poll(kind).await,
                _ = self.cancel.cancelled() => {
                    tracing::info!("refresh loop stopped for {}", kind.id());
                    break;
                }
            }
        }
    }

    pub(crate) async fn poll(&self, kind: ProviderKind) {
        let Ok(_in_flight) = self.lanes[&kind].guard.try_lock() else {
            tracing::debug!("{}: fetch already in flight, coalescing", kind.id());
            return;
        };

        match (self.available)(kind).await {
            Ok(true) => {}
            Ok(false) => {
                // Not authenticated is a normal state, not an error
                self.set_phase(kind, FetchPhase::Idle).await;
                return;
            }
            Err(e) => {
                self.set_phase(kind, FetchPhase::Failed(e.to_string())).await;
                return;
            }
        }

        self.set_phase(kind, FetchPhase::Fetching).await;
        let result = (self.fetch)(kind).await;

        // An abandoned fetch must not publish after shutdown was requested
        if self.cancel.is_cancelled() {
            return;
        }

        match result {
            Ok(snapshot) => {
                {
                    let mut states = self.states.write().await;
                    let state = states.entry(kind).or_default();
                    state.phase = FetchPhase::Succeeded;
                    state.snapshot = Some(snapshot.clone());
                }
                let _ = self.publish.send(snapshot).await;
            }
            Err(ProviderError::NotAuthenticated) => {
                self.set_phase(kind, FetchPhase::Idle).await;
            }
            Err(e) => {
                tracing::warn!("{}: fetch failed: {}", kind.id(), e);
                self.set_phase(kind, FetchPhase::Failed(e.to_string())).await;
            }
        }
    }

    /// Update the phase, keeping the last known-good snapshot.
    async fn set_phase(&self, kind: ProviderKind, phase: FetchPhase) {
        let mut states = self.states.write().await;
        states.entry(kind).or_default().phase = phase;
    }
}
