//! Sync Service - 요청 수명주기와 동기화 코디네이터 연결
//!
//! ```text
//! begin_request() ──► RequestScope ──► (로컬 삭제 기록)
//!                                           │
//! end_request(scope) ──► flush ──► EventLog::append
//!                    └─► reconcile ──► ReconciliationCoordinator
//!
//! run_periodic(interval) ──► reconcile (tick 마다)
//! ```

use crate::context::RequestScope;
use crate::coordinator::{CoordinatorConfig, ReconciliationCoordinator, SyncOutcome};
use crate::engine::{CacheEngine, PageLookup};
use crate::identity::{IdentityProvider, InstanceId};
use crate::marker::SyncMarkers;
use crate::replay::ReplayExecutor;
use pagesync_foundation::{EventBatch, EventLog, Result, SyncConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 주기적 동기화의 최소 간격
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// 요청 종료 시 flush 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// 기록된 이벤트 없음
    Empty,
    Appended { sequence_id: i64, events: usize },
    /// 동기화 패스 진행 중이라 버림
    Discarded { events: usize },
    /// 로그 기록 실패 (다음 요청에 영향 없음)
    Failed { reason: String },
}

pub struct SyncService {
    config: SyncConfig,
    identity: Arc<IdentityProvider>,
    log: Arc<dyn EventLog>,
    engine: Arc<dyn CacheEngine>,
    coordinator: ReconciliationCoordinator,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        log: Arc<dyn EventLog>,
        engine: Arc<dyn CacheEngine>,
        pages: Arc<dyn PageLookup>,
    ) -> Self {
        let identity = Arc::new(IdentityProvider::new(&config.identity_file));
        let executor = ReplayExecutor::from_config(&config, engine.clone(), pages);
        let coordinator = ReconciliationCoordinator::new(
            identity.clone(),
            log.clone(),
            SyncMarkers::for_cache_root(&config.cache_root),
            executor,
            CoordinatorConfig::from(&config),
        );

        Self {
            config,
            identity,
            log,
            engine,
            coordinator,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn identity(&self) -> Result<&InstanceId> {
        self.identity.get()
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    pub fn engine(&self) -> &dyn CacheEngine {
        self.engine.as_ref()
    }

    pub fn markers(&self) -> &SyncMarkers {
        self.coordinator.markers()
    }

    pub fn coordinator(&self) -> &ReconciliationCoordinator {
        &self.coordinator
    }

    // ========================================================================
    // Request lifecycle
    // ========================================================================

    pub fn begin_request(&self) -> RequestScope {
        RequestScope::new()
    }

    /// 버퍼를 비우고 하나의 배치로 로그에 기록
    pub async fn flush(&self, scope: &RequestScope) -> FlushOutcome {
        let events = scope.drain();
        if events.is_empty() {
            return FlushOutcome::Empty;
        }

        let count = events.len();
        if self.coordinator.is_running() {
            debug!(scope = scope.id(), count, "Reconciliation running, discarding buffered clears");
            return FlushOutcome::Discarded { events: count };
        }

        let instance_id = match self.identity.get() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, count, "Instance identity unavailable, dropping batch");
                return FlushOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let batch = EventBatch::new(instance_id.as_str(), events);
        match self.log.append(&batch).await {
            Ok(sequence_id) => {
                debug!(scope = scope.id(), sequence_id, count, "Flushed clear batch");
                FlushOutcome::Appended {
                    sequence_id,
                    events: count,
                }
            }
            Err(e) => {
                warn!(error = %e, count, "Failed to append clear batch");
                FlushOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// 요청 종료: flush 후 기회적 동기화
    pub async fn end_request(&self, scope: RequestScope) -> (FlushOutcome, SyncOutcome) {
        let flushed = self.flush(&scope).await;
        let synced = self.reconcile().await;
        (flushed, synced)
    }

    pub async fn reconcile(&self) -> SyncOutcome {
        self.coordinator.reconcile().await
    }

    /// `shutdown` 이 true 가 되거나 sender 가 닫힐 때까지 주기적으로 동기화
    ///
    /// `MIN_TICK_INTERVAL` 보다 짧은 간격은 올려서 사용한다.
    pub async fn run_periodic(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let interval = if interval < MIN_TICK_INTERVAL {
            warn!(requested_ms = interval.as_millis() as u64, "Tick interval too short, clamping");
            MIN_TICK_INTERVAL
        } else {
            interval
        };

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = interval.as_millis() as u64, "Periodic reconciliation started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.reconcile().await;
                    debug!(?outcome, "Periodic reconciliation tick");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Periodic reconciliation stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorState;
    use crate::engine::{BehaviorImpact, Page, PageClearReport};
    use crate::testing::{FakeEngine, FakePages, MemoryLog};
    use async_trait::async_trait;
    use chrono::Utc;
    use pagesync_foundation::{ClearEvent, ClearOptions};
    use serde_json::{Map, Value};
    use tokio::sync::Notify;

    /// `clear_all` 이 `release` 될 때까지 멈추는 엔진
    #[derive(Default)]
    struct GatedEngine {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CacheEngine for GatedEngine {
        async fn clear_all(&self) -> Result<()> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }

        async fn clear_page(
            &self,
            _page: &Page,
            _options: &Map<String, Value>,
        ) -> Result<PageClearReport> {
            Ok(PageClearReport::default())
        }

        async fn clear_behaviors_for(&self, _page: &Page) -> Result<BehaviorImpact> {
            Ok(BehaviorImpact::default())
        }
    }

    fn service(dir: &std::path::Path, log: Arc<MemoryLog>) -> SyncService {
        SyncService::new(
            SyncConfig::rooted_at(dir),
            log,
            Arc::new(FakeEngine::new()),
            Arc::new(FakePages::all()),
        )
    }

    #[tokio::test]
    async fn test_flush_appends_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(MemoryLog::new());
        let service = service(dir.path(), log.clone());

        let scope = service.begin_request();
        scope
            .recording(service.engine())
            .clear_page(&Page::new(42), Default::default())
            .await
            .unwrap();
        scope
            .recording(service.engine())
            .clear_all()
            .await
            .unwrap();

        let outcome = service.flush(&scope).await;
        assert!(matches!(outcome, FlushOutcome::Appended { events: 1, .. }));

        let batches = log.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].instance_id, service.identity().unwrap().as_str());
        assert_eq!(batches[0].events, vec![ClearEvent::ClearAll]);

        // 두 번째 flush 는 빈 버퍼
        assert_eq!(service.flush(&scope).await, FlushOutcome::Empty);
    }

    #[tokio::test]
    async fn test_end_request_flushes_then_reconciles() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(MemoryLog::new());
        let service = service(dir.path(), log.clone());

        let scope = service.begin_request();
        scope.record(ClearEvent::clear_page(7, ClearOptions::new()));

        let (flushed, synced) = service.end_request(scope).await;
        assert!(matches!(flushed, FlushOutcome::Appended { .. }));

        // 자기 자신의 배치는 재실행하지 않음
        let report = synced.report().unwrap();
        assert_eq!(report.skipped_self, 1);
        assert!(report.replayed.is_empty());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_request_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(MemoryLog::new());
        let service = service(dir.path(), log.clone());

        let (flushed, _) = service.end_request(service.begin_request()).await;
        assert_eq!(flushed, FlushOutcome::Empty);
        assert_eq!(log.len(), 0);
    }

    #[tokio::test]
    async fn test_flush_during_replay_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(MemoryLog::new());
        log.insert_at(Utc::now(), EventBatch::new("peer", vec![ClearEvent::ClearAll]));

        let engine = Arc::new(GatedEngine::default());
        let service = SyncService::new(
            SyncConfig::rooted_at(dir.path()),
            log.clone(),
            engine.clone(),
            Arc::new(FakePages::all()),
        );

        let scope = service.begin_request();
        let during = async {
            engine.entered.notified().await;
            let state = service.coordinator().state();
            scope.record(ClearEvent::clear_page(9, ClearOptions::new()));
            let flushed = service.flush(&scope).await;
            engine.release.notify_one();
            (state, flushed)
        };

        let (synced, (state, flushed)) = tokio::join!(service.reconcile(), during);

        assert_eq!(state, CoordinatorState::Running);
        assert_eq!(flushed, FlushOutcome::Discarded { events: 1 });
        assert_eq!(log.len(), 1);
        assert_eq!(synced.report().unwrap().replayed, vec![ClearEvent::ClearAll]);

        // 패스가 끝나면 다시 기록된다
        scope.record(ClearEvent::clear_page(9, ClearOptions::new()));
        assert!(matches!(service.flush(&scope).await, FlushOutcome::Appended { .. }));
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_run_periodic_clamps_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), Arc::new(MemoryLog::new()));
        let (tx, rx) = watch::channel(false);

        let stop = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tx.send(true).unwrap();
        };

        tokio::join!(service.run_periodic(Duration::ZERO, rx), stop);
        assert!(service.markers().last.exists());
    }

    #[tokio::test]
    async fn test_run_periodic_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), Arc::new(MemoryLog::new()));
        let (tx, rx) = watch::channel(false);

        let stop = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        };

        tokio::join!(service.run_periodic(Duration::from_millis(10), rx), stop);
        assert!(service.markers().last.exists());
    }
}
