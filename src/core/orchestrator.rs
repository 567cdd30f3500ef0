use crate::core::error::LoadError;
use crate::core::events::LauncherEvent;
use crate::core::model::{LoadPhase, LoadRequest, LoadResult, LoadStatus, RecoveryPolicy};
use crate::plugins::registry::{
    AssetFetchService, FetchContext, FetchError, FetchProgress, SourceSpec,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

/// Snapshot cadence while a fetch is in flight, independent of however often
/// the fetch service itself updates its progress side.
pub const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fire-and-forget progress callback; must not block the orchestrator.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, status: &LoadStatus);
}

/// Drives one logical fetch-and-load operation at a time against a bound
/// fetch service, with bounded (or unbounded) retry and live status.
pub struct LoadOrchestrator {
    service: Arc<dyn AssetFetchService>,
    source: SourceSpec,
    fetch_ctx: FetchContext,
    event_tx: broadcast::Sender<LauncherEvent>,
    sink: Option<Arc<dyn ProgressSink>>,
    status_tx: watch::Sender<Option<LoadStatus>>,
    status_rx: watch::Receiver<Option<LoadStatus>>,
}

impl LoadOrchestrator {
    pub fn new(
        service: Arc<dyn AssetFetchService>,
        source: SourceSpec,
        fetch_ctx: FetchContext,
        event_tx: broadcast::Sender<LauncherEvent>,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(None);
        Self {
            service,
            source,
            fetch_ctx,
            event_tx,
            sink: None,
            status_tx,
            status_rx,
        }
    }

    pub fn set_progress_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sink = Some(sink);
    }

    /// Latest snapshot, `None` until the first request is issued.
    /// Non-blocking; safe to poll from any task.
    pub fn status(&self) -> Option<LoadStatus> {
        *self.status_rx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Option<LoadStatus>> {
        self.status_rx.clone()
    }

    /// One fetch attempt per retry cycle until success or budget exhaustion.
    /// Failure is a first-class return value; this never raises.
    pub async fn load_with_retry(&self, request: &LoadRequest) -> LoadResult {
        if request.keys.is_empty() {
            let _ = self.event_tx.send(LauncherEvent::Error {
                scope: format!("load({})", request.stage),
                message: "request has no asset keys".to_string(),
            });
            self.publish_transition(request, LoadPhase::Failed, FetchProgress::default());
            return LoadResult::failed();
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.publish_transition(request, LoadPhase::Loading, FetchProgress::default());

            match self.run_attempt(request).await {
                Ok((items, progress)) => {
                    self.publish_transition(request, LoadPhase::Succeeded, progress);
                    return LoadResult::succeeded(items);
                }
                Err((err, progress)) => {
                    let _ = self.event_tx.send(LauncherEvent::AttemptFailed {
                        stage: request.stage,
                        attempt,
                        max_attempts: request.max_retry_count,
                        message: err.to_string(),
                    });

                    let exhausted = request.recovery == RecoveryPolicy::Bounded
                        && attempt >= request.max_retry_count;
                    if exhausted {
                        let _ = self.event_tx.send(LauncherEvent::Error {
                            scope: format!("load({})", request.stage),
                            message: LoadError::RetryExhausted { attempts: attempt }.to_string(),
                        });
                        self.publish_transition(request, LoadPhase::Failed, progress);
                        return LoadResult::failed();
                    }

                    self.publish_transition(request, LoadPhase::WaitingRetry, progress);
                    sleep(Duration::from_millis(request.retry_delay_ms)).await;
                }
            }
        }
    }

    /// Races fetch settlement against the timeout, polling progress on a
    /// fixed tick. The tick lives inside the same select loop, so polling
    /// stops exactly when the attempt settles.
    async fn run_attempt(
        &self,
        request: &LoadRequest,
    ) -> Result<(Vec<Bytes>, FetchProgress), (LoadError, FetchProgress)> {
        let mut last = FetchProgress::default();

        let mut handle = match self
            .service
            .fetch_by_keys(&self.source, &request.keys, &self.fetch_ctx)
            .await
        {
            Ok(h) => h,
            Err(e) => return Err((LoadError::Fetch(e), last)),
        };

        let timeout = sleep(Duration::from_millis(request.timeout_ms));
        tokio::pin!(timeout);
        let mut ticker = interval(PROGRESS_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                res = &mut handle.result => {
                    last = *handle.progress.borrow();
                    return match res {
                        Ok(Ok(items)) => {
                            last.done = true;
                            Ok((items, last))
                        }
                        Ok(Err(e)) => Err((LoadError::Fetch(e), last)),
                        Err(_) => Err((LoadError::Fetch(FetchError::Aborted), last)),
                    };
                }
                _ = &mut timeout => {
                    // The underlying fetch is not cancelled; a late result is
                    // discarded together with the handle.
                    return Err((LoadError::Timeout { timeout_ms: request.timeout_ms }, last));
                }
                _ = ticker.tick() => {
                    last = *handle.progress.borrow();
                    self.publish(request, LoadStatus::new(
                        LoadPhase::Loading,
                        last.total_bytes,
                        last.downloaded_bytes,
                        last.done,
                        last.percent_complete,
                    ));
                }
            }
        }
    }

    fn publish_transition(&self, request: &LoadRequest, phase: LoadPhase, progress: FetchProgress) {
        let _ = self.event_tx.send(LauncherEvent::PhaseChanged {
            stage: request.stage,
            phase,
        });
        self.publish(request, LoadStatus::new(
            phase,
            progress.total_bytes,
            progress.downloaded_bytes,
            progress.done,
            progress.percent_complete,
        ));
    }

    fn publish(&self, request: &LoadRequest, status: LoadStatus) {
        self.status_tx.send_replace(Some(status));
        let _ = self.event_tx.send(LauncherEvent::Progress {
            stage: request.stage,
            status,
        });
        if let Some(sink) = &self.sink {
            sink.on_progress(&status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::LoadStage;
    use async_trait::async_trait;
    use crate::plugins::registry::FetchHandle;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    enum Outcome {
        Fail,
        Succeed(Vec<Bytes>),
        Hang,
        HangWithProgress { total: u64, downloaded: u64 },
    }

    struct ScriptedService {
        outcomes: Mutex<VecDeque<Outcome>>,
        attempts: AtomicU32,
    }

    impl ScriptedService {
        fn new(outcomes: Vec<Outcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                attempts: AtomicU32::new(0),
            })
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AssetFetchService for ScriptedService {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn can_handle(&self, _source: &SourceSpec) -> u8 {
            100
        }

        async fn fetch_by_keys(
            &self,
            _source: &SourceSpec,
            _keys: &[String],
            _ctx: &FetchContext,
        ) -> Result<FetchHandle, FetchError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Outcome::Fail);

            let (tx, handle) = FetchHandle::channel();
            match outcome {
                Outcome::Fail => tx.settle(Err(FetchError::MissingKey("scripted".into()))),
                Outcome::Succeed(items) => {
                    let total: u64 = items.iter().map(|b| b.len() as u64).sum();
                    tx.publish(total, total, true);
                    tx.settle(Ok(items));
                }
                Outcome::Hang => {
                    tokio::spawn(async move {
                        let _keep_alive = tx;
                        futures::future::pending::<()>().await;
                    });
                }
                Outcome::HangWithProgress { total, downloaded } => {
                    tx.publish(total, downloaded, false);
                    tokio::spawn(async move {
                        let _keep_alive = tx;
                        futures::future::pending::<()>().await;
                    });
                }
            }
            Ok(handle)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        statuses: Mutex<Vec<LoadStatus>>,
    }

    impl ProgressSink for RecordingSink {
        fn on_progress(&self, status: &LoadStatus) {
            self.statuses.lock().unwrap().push(*status);
        }
    }

    fn orchestrator(service: Arc<dyn AssetFetchService>) -> LoadOrchestrator {
        let (event_tx, _) = broadcast::channel(256);
        LoadOrchestrator::new(
            service,
            SourceSpec::new("scripted://"),
            FetchContext::default(),
            event_tx,
        )
    }

    fn request(max_retry_count: u32, retry_delay_ms: u64, timeout_ms: u64) -> LoadRequest {
        LoadRequest {
            stage: LoadStage::HotUpdate,
            keys: vec!["Game.dll.bytes".to_string()],
            max_retry_count,
            retry_delay_ms,
            timeout_ms,
            recovery: RecoveryPolicy::Bounded,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permanently_failing_fetch_uses_exact_attempt_budget() {
        let service = ScriptedService::new(vec![Outcome::Fail, Outcome::Fail, Outcome::Fail, Outcome::Fail]);
        let orch = orchestrator(service.clone());

        let start = Instant::now();
        let result = orch.load_with_retry(&request(3, 100, 30_000)).await;

        assert!(!result.success);
        assert!(result.items.is_empty());
        assert_eq!(service.attempts(), 3);
        // two retry delays between three attempts, none after exhaustion
        assert_eq!(start.elapsed().as_millis(), 200);
        assert_eq!(orch.status().unwrap().phase, LoadPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_third_attempt_observes_two_retry_delays() {
        let payload = Bytes::from_static(b"module bytes");
        let service = ScriptedService::new(vec![
            Outcome::Fail,
            Outcome::Fail,
            Outcome::Succeed(vec![payload.clone()]),
        ]);
        let orch = orchestrator(service.clone());

        let start = Instant::now();
        let result = orch.load_with_retry(&request(3, 100, 30_000)).await;

        assert!(result.success);
        assert_eq!(result.items, vec![payload]);
        assert_eq!(service.attempts(), 3);
        assert_eq!(start.elapsed().as_millis(), 200);
        assert_eq!(orch.status().unwrap().phase, LoadPhase::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_budget_fails_without_delay() {
        let service = ScriptedService::new(vec![Outcome::Fail]);
        let orch = orchestrator(service.clone());

        let start = Instant::now();
        let result = orch.load_with_retry(&request(1, 100, 30_000)).await;

        assert!(!result.success);
        assert_eq!(service.attempts(), 1);
        assert_eq!(start.elapsed().as_millis(), 0);
        assert_eq!(orch.status().unwrap().phase, LoadPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn status_is_absent_before_first_load() {
        let service = ScriptedService::new(vec![Outcome::Succeed(vec![])]);
        let orch = orchestrator(service);

        assert!(orch.status().is_none());
        let watch = orch.subscribe_status();
        assert!(watch.borrow().is_none());

        orch.load_with_retry(&request(1, 0, 1000)).await;
        assert_eq!(orch.status().unwrap().phase, LoadPhase::Succeeded);
        assert_eq!(watch.borrow().unwrap().phase, LoadPhase::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_times_out_per_attempt() {
        let service = ScriptedService::new(vec![Outcome::Hang, Outcome::Hang]);
        let orch = orchestrator(service.clone());

        let start = Instant::now();
        let result = orch.load_with_retry(&request(2, 100, 500)).await;

        assert!(!result.success);
        assert_eq!(service.attempts(), 2);
        // two full timeouts plus the single delay between them
        assert_eq!(start.elapsed().as_millis(), 1100);
        assert_eq!(orch.status().unwrap().phase, LoadPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_ticks_surface_fetch_progress_to_the_sink() {
        let service = ScriptedService::new(vec![Outcome::HangWithProgress {
            total: 1000,
            downloaded: 400,
        }]);
        let mut orch = orchestrator(service);
        let sink = Arc::new(RecordingSink::default());
        orch.set_progress_sink(sink.clone());

        orch.load_with_retry(&request(1, 0, 500)).await;

        let statuses = sink.statuses.lock().unwrap();
        assert!(statuses
            .iter()
            .any(|s| s.phase == LoadPhase::Loading && s.downloaded_bytes == 400 && s.total_bytes == 1000));
        assert!(statuses.iter().all(|s| s.total_bytes == 0 || s.downloaded_bytes <= s.total_bytes));
        assert_eq!(statuses.last().unwrap().phase, LoadPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn infinite_backoff_retries_past_a_bounded_budget() {
        let service = ScriptedService::new(vec![
            Outcome::Fail,
            Outcome::Fail,
            Outcome::Fail,
            Outcome::Fail,
            Outcome::Fail,
            Outcome::Succeed(vec![Bytes::from_static(b"late")]),
        ]);
        let orch = orchestrator(service.clone());

        let mut req = request(2, 50, 30_000);
        req.recovery = RecoveryPolicy::InfiniteBackoff;
        let result = orch.load_with_retry(&req).await;

        assert!(result.success);
        assert_eq!(service.attempts(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_key_list_fails_without_touching_the_service() {
        let service = ScriptedService::new(vec![]);
        let orch = orchestrator(service.clone());

        let mut req = request(3, 100, 1000);
        req.keys.clear();
        let result = orch.load_with_retry(&req).await;

        assert!(!result.success);
        assert_eq!(service.attempts(), 0);
        assert_eq!(orch.status().unwrap().phase, LoadPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn phase_transitions_are_broadcast_in_order() {
        let service = ScriptedService::new(vec![Outcome::Fail, Outcome::Succeed(vec![])]);
        let (event_tx, mut rx) = broadcast::channel(256);
        let orch = LoadOrchestrator::new(
            service,
            SourceSpec::new("scripted://"),
            FetchContext::default(),
            event_tx,
        );

        orch.load_with_retry(&request(3, 100, 30_000)).await;

        let mut phases = vec![];
        while let Ok(evt) = rx.try_recv() {
            if let LauncherEvent::PhaseChanged { phase, .. } = evt {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases,
            vec![
                LoadPhase::Loading,
                LoadPhase::WaitingRetry,
                LoadPhase::Loading,
                LoadPhase::Succeeded,
            ]
        );
    }
}
