//! Batch Coordinator
//!
//! Fans a start, stop, or ping operation out over many profiles with bounded
//! parallelism. Outcomes are reported as they complete, not in request
//! order; a cancel stops dispatching new profiles but never interrupts
//! operations already in flight.

use crate::orchestrator::SessionOrchestrator;
use mask_store::ProfileId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// The operation applied to every profile in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOp {
    Start,
    Stop,
    Ping,
}

impl fmt::Display for BatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOp::Start => write!(f, "start"),
            BatchOp::Stop => write!(f, "stop"),
            BatchOp::Ping => write!(f, "ping"),
        }
    }
}

/// Progress report for one profile, emitted as its operation completes.
#[derive(Debug)]
pub struct BatchEvent {
    pub profile_id: ProfileId,
    pub op: BatchOp,
    pub outcome: Result<(), String>,
}

/// Totals for a finished batch. `skipped` counts profiles that were never
/// dispatched because the batch was cancelled first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Clonable cancellation flag for an in-flight batch.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs one batch operation across a set of profiles.
pub struct BatchCoordinator {
    orchestrator: Arc<SessionOrchestrator>,
    concurrency: usize,
    cancel: CancelHandle,
}

impl BatchCoordinator {
    pub fn new(orchestrator: Arc<SessionOrchestrator>, concurrency: usize) -> Self {
        Self {
            orchestrator,
            concurrency: concurrency.max(1),
            cancel: CancelHandle::default(),
        }
    }

    /// Handle for cancelling this coordinator's run from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Apply `op` to every profile in `ids`, at most `concurrency` at a
    /// time. Completion events go to `progress` if provided; the summary
    /// is returned once every dispatched operation has finished.
    pub async fn run(
        &self,
        op: BatchOp,
        ids: Vec<ProfileId>,
        progress: Option<mpsc::Sender<BatchEvent>>,
    ) -> BatchSummary {
        info!("Batch {op} over {} profile(s)", ids.len());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<bool> = JoinSet::new();
        let mut summary = BatchSummary::default();

        let total = ids.len();
        for (dispatched, profile_id) in ids.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.skipped = total - dispatched;
                warn!("Batch {op} cancelled with {} profile(s) pending", summary.skipped);
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("batch semaphore closed");
            let orchestrator = self.orchestrator.clone();
            let progress = progress.clone();
            tasks.spawn(async move {
                let result = match op {
                    BatchOp::Start => orchestrator.start(profile_id).await,
                    BatchOp::Stop => orchestrator.stop(profile_id).await,
                    BatchOp::Ping => orchestrator.ping(profile_id).await,
                };
                drop(permit);
                let ok = result.is_ok();
                // Emit progress as each profile finishes, not at drain time.
                if let Some(progress) = progress {
                    let _ = progress
                        .send(BatchEvent {
                            profile_id,
                            op,
                            outcome: result.map_err(|e| e.to_string()),
                        })
                        .await;
                }
                ok
            });
        }
        // Release the caller's sender so the channel closes once every
        // in-flight task has reported.
        drop(progress);

        while let Some(joined) = tasks.join_next().await {
            if joined.expect("batch task panicked") {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(
            "Batch {op} finished: {} ok, {} failed, {} skipped",
            summary.succeeded, summary.failed, summary.skipped
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BrowserEngine, EngineError, EngineSession, LaunchConfig};
    use async_trait::async_trait;
    use mask_fingerprint::{GeoLocale, OsVariant};
    use mask_store::{NewProfile, ProfileStatus, Storage};
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct SlowEngine {
        delay: Duration,
        fail_for: HashSet<ProfileId>,
    }

    struct IdleSession;

    #[async_trait]
    impl BrowserEngine for SlowEngine {
        async fn launch(
            &self,
            config: LaunchConfig,
        ) -> Result<Box<dyn EngineSession>, EngineError> {
            tokio::time::sleep(self.delay).await;
            if self.fail_for.contains(&config.profile_id) {
                return Err(EngineError::ExitedEarly(Some(1)));
            }
            Ok(Box::new(IdleSession))
        }
    }

    #[async_trait]
    impl EngineSession for IdleSession {
        fn pid(&self) -> Option<u32> {
            None
        }

        async fn is_alive(&mut self) -> bool {
            true
        }

        async fn shutdown(&mut self, _grace: Duration) -> Result<(), EngineError> {
            Ok(())
        }
    }

    async fn setup(
        profiles: usize,
        engine: SlowEngine,
    ) -> (Arc<Storage>, Arc<SessionOrchestrator>, Vec<ProfileId>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Storage::open(dir.path()).unwrap());
        std::mem::forget(dir);
        let mut ids = Vec::new();
        for i in 0..profiles {
            let profile = store
                .create_profile(
                    NewProfile::named(&format!("p{i}"), OsVariant::Linux),
                    &GeoLocale::unknown(),
                )
                .await
                .unwrap();
            ids.push(profile.id);
        }
        let orchestrator = Arc::new(SessionOrchestrator::new(store.clone(), Arc::new(engine)));
        (store, orchestrator, ids)
    }

    fn quick_engine() -> SlowEngine {
        SlowEngine {
            delay: Duration::ZERO,
            fail_for: HashSet::new(),
        }
    }

    #[tokio::test]
    async fn test_batch_start_all_succeeds() {
        let (store, orchestrator, ids) = setup(3, quick_engine()).await;
        let coordinator = BatchCoordinator::new(orchestrator, 2);
        let (tx, mut rx) = mpsc::channel(16);

        let summary = coordinator
            .run(BatchOp::Start, ids.clone(), Some(tx))
            .await;
        assert_eq!(
            summary,
            BatchSummary {
                succeeded: 3,
                failed: 0,
                skipped: 0
            }
        );

        let mut seen = 0;
        while let Some(event) = rx.recv().await {
            assert!(event.outcome.is_ok());
            seen += 1;
        }
        assert_eq!(seen, 3);

        for id in ids {
            assert_eq!(
                store.get_profile(id).await.unwrap().status,
                ProfileStatus::Running
            );
        }
    }

    #[tokio::test]
    async fn test_batch_reports_per_profile_failures() {
        let (store, _unused, ids) = setup(3, quick_engine()).await;
        // Rebuild the orchestrator with an engine that fails one profile.
        let orchestrator = Arc::new(SessionOrchestrator::new(
            store.clone(),
            Arc::new(SlowEngine {
                delay: Duration::ZERO,
                fail_for: [ids[1]].into(),
            }),
        ));
        let coordinator = BatchCoordinator::new(orchestrator, 4);

        let summary = coordinator.run(BatchOp::Start, ids.clone(), None).await;
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            store.get_profile(ids[1]).await.unwrap().status,
            ProfileStatus::Error
        );
    }

    #[tokio::test]
    async fn test_pre_cancelled_batch_dispatches_nothing() {
        let (store, orchestrator, ids) = setup(3, quick_engine()).await;
        let coordinator = BatchCoordinator::new(orchestrator, 2);
        coordinator.cancel_handle().cancel();

        let summary = coordinator.run(BatchOp::Start, ids.clone(), None).await;
        assert_eq!(
            summary,
            BatchSummary {
                succeeded: 0,
                failed: 0,
                skipped: 3
            }
        );
        for id in ids {
            assert_eq!(
                store.get_profile(id).await.unwrap().status,
                ProfileStatus::Stopped
            );
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_skips_pending() {
        let engine = SlowEngine {
            delay: Duration::from_millis(100),
            fail_for: HashSet::new(),
        };
        let (_store, orchestrator, ids) = setup(4, engine).await;
        let coordinator = Arc::new(BatchCoordinator::new(orchestrator, 1));
        let cancel = coordinator.cancel_handle();

        let run = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run(BatchOp::Start, ids, None).await })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();

        let summary = run.await.unwrap();
        assert_eq!(summary.succeeded + summary.failed + summary.skipped, 4);
        assert!(summary.skipped >= 1);
        assert!(summary.succeeded >= 1);
    }

    struct CountingEngine {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserEngine for CountingEngine {
        async fn launch(
            &self,
            _config: LaunchConfig,
        ) -> Result<Box<dyn EngineSession>, EngineError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Box::new(IdleSession))
        }
    }

    #[tokio::test]
    async fn test_concurrency_bound_holds() {
        let (store, _unused, ids) = setup(5, quick_engine()).await;
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let orchestrator = Arc::new(SessionOrchestrator::new(
            store,
            Arc::new(CountingEngine {
                active: active.clone(),
                peak: peak.clone(),
            }),
        ));
        let coordinator = BatchCoordinator::new(orchestrator, 2);

        let summary = coordinator.run(BatchOp::Start, ids, None).await;
        assert_eq!(summary.succeeded, 5);
        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_progress_streams_during_batch() {
        // With a 100ms launch and serial dispatch, the full batch takes
        // about 300ms. The first event must land as its profile finishes,
        // well before the batch drains.
        let engine = SlowEngine {
            delay: Duration::from_millis(100),
            fail_for: HashSet::new(),
        };
        let (_store, orchestrator, ids) = setup(3, engine).await;
        let coordinator = BatchCoordinator::new(orchestrator, 1);
        let (tx, mut rx) = mpsc::channel(16);

        let started = tokio::time::Instant::now();
        let run = tokio::spawn(async move { coordinator.run(BatchOp::Start, ids, Some(tx)).await });

        let first = rx.recv().await.expect("batch emitted no events");
        assert!(first.outcome.is_ok());
        assert!(
            started.elapsed() < Duration::from_millis(250),
            "first event arrived only after {:?}",
            started.elapsed()
        );

        let summary = run.await.unwrap();
        assert_eq!(summary.succeeded, 3);
        let mut rest = 0;
        while rx.recv().await.is_some() {
            rest += 1;
        }
        assert_eq!(rest, 2);
    }

    #[tokio::test]
    async fn test_batch_stop_after_start() {
        let (store, orchestrator, ids) = setup(2, quick_engine()).await;
        let coordinator = BatchCoordinator::new(orchestrator, 2);

        coordinator.run(BatchOp::Start, ids.clone(), None).await;
        let summary = coordinator.run(BatchOp::Stop, ids.clone(), None).await;
        assert_eq!(summary.succeeded, 2);
        for id in ids {
            assert_eq!(
                store.get_profile(id).await.unwrap().status,
                ProfileStatus::Stopped
            );
        }
    }
}
