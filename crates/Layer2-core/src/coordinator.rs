//! Reconciliation Coordinator - 피어 로그 재실행 패스
//!
//! ## 상태 전이
//!
//! ```text
//! Idle ──► Checking ──► Running ──► Idle
//!             │
//!             ├─ last 마커가 debounce 이내 → TooSoon
//!             └─ run 마커가 신선함       → Locked
//! ```
//!
//! 실패는 모두 "다음 주기에 재시도" 또는 "이 항목 건너뜀" 으로 처리된다.
//! 호출자에게 에러가 전파되지 않는다.

use crate::identity::IdentityProvider;
use crate::marker::SyncMarkers;
use crate::replay::{ApplyOutcome, ReplayExecutor};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pagesync_foundation::{ClearEvent, EventLog, SyncConfig};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// `since` 를 last 마커보다 이만큼(ms) 앞당긴다.
///
/// 로그 타임스탬프는 ms 반올림, 마커는 ms 내림으로 비교되므로 경계의 행이
/// 영원히 제외되지 않게 한다. 중복 재실행은 멱등이다.
const SINCE_OVERLAP_MS: i64 = 1;

// ============================================================================
// State
// ============================================================================

/// 코디네이터 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoordinatorState {
    Idle = 0,
    Checking = 1,
    Running = 2,
}

impl CoordinatorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Checking,
            2 => Self::Running,
            _ => Self::Idle,
        }
    }
}

/// Holds the non-idle state for one pass and returns to `Idle` on drop.
struct PassGuard<'a> {
    state: &'a AtomicU8,
}

impl<'a> PassGuard<'a> {
    fn enter(state: &'a AtomicU8) -> Option<Self> {
        state
            .compare_exchange(
                CoordinatorState::Idle as u8,
                CoordinatorState::Checking as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| Self { state })
    }

    fn running(&self) {
        self.state
            .store(CoordinatorState::Running as u8, Ordering::Release);
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.state
            .store(CoordinatorState::Idle as u8, Ordering::Release);
    }
}

// ============================================================================
// Config / Outcome
// ============================================================================

/// 코디네이터 타이밍 설정
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub debounce: Duration,
    pub lock_stale_after: Duration,
    pub retention: ChronoDuration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for CoordinatorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            debounce: config.debounce(),
            lock_stale_after: config.lock_stale_after(),
            retention: config.retention(),
        }
    }
}

/// 완료된 패스 요약
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// 재실행된 이벤트 (읽은 순서)
    pub replayed: Vec<ClearEvent>,
    /// 로그에서 읽은 레코드 수 (malformed 제외)
    pub records_read: usize,
    /// 자기 자신이 기록한 레코드 수
    pub skipped_self: usize,
    /// 로컬에 없는 페이지라 건너뛴 이벤트 수
    pub skipped_pages: usize,
    /// 적용에 실패한 이벤트 수
    pub failed: usize,
    /// 삭제된 오래된 레코드 수
    pub pruned: u64,
}

/// 한 번의 `reconcile()` 결과
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// 이 프로세스에서 이미 패스가 진행 중
    InProgress,
    /// 마지막 동기화 후 debounce 이내
    TooSoon { since_last: Duration },
    /// 다른 프로세스가 신선한 run 마커를 보유
    Locked { age: Duration },
    /// 패스 중단 (last 마커는 그대로)
    Aborted { reason: String },
    Completed(SyncReport),
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct ReconciliationCoordinator {
    identity: Arc<IdentityProvider>,
    log: Arc<dyn EventLog>,
    markers: SyncMarkers,
    executor: ReplayExecutor,
    config: CoordinatorConfig,
    state: AtomicU8,
}

impl ReconciliationCoordinator {
    pub fn new(
        identity: Arc<IdentityProvider>,
        log: Arc<dyn EventLog>,
        markers: SyncMarkers,
        executor: ReplayExecutor,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            identity,
            log,
            markers,
            executor,
            config,
            state: AtomicU8::new(CoordinatorState::Idle as u8),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        CoordinatorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == CoordinatorState::Running
    }

    pub fn markers(&self) -> &SyncMarkers {
        &self.markers
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// 한 번의 동기화 패스 실행
    pub async fn reconcile(&self) -> SyncOutcome {
        let Some(pass) = PassGuard::enter(&self.state) else {
            debug!("Reconciliation already in progress");
            return SyncOutcome::InProgress;
        };

        let checked_at = SystemTime::now();

        // 1. debounce
        let last_sync = match self.markers.last.modified() {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!(error = %e, "Failed to read last-sync marker, treating as absent");
                None
            }
        };

        if let Some(last) = last_sync {
            let since_last = checked_at.duration_since(last).unwrap_or(Duration::ZERO);
            if since_last < self.config.debounce {
                debug!(since_last_ms = since_last.as_millis() as u64, "Synchronized recently");
                return SyncOutcome::TooSoon { since_last };
            }
        }

        // 2-3. run claim
        match self.markers.run.try_claim(self.config.lock_stale_after) {
            Ok(true) => {}
            Ok(false) => {
                let age = self
                    .markers
                    .run
                    .age(SystemTime::now())
                    .ok()
                    .flatten()
                    .unwrap_or(Duration::ZERO);
                return SyncOutcome::Locked { age };
            }
            Err(e) => {
                warn!(error = %e, "Failed to claim run marker");
                return SyncOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        }

        pass.running();
        let started_at = SystemTime::now();
        let overlap = ChronoDuration::milliseconds(SINCE_OVERLAP_MS);
        let since = last_sync
            .and_then(|last| DateTime::<Utc>::from(last).checked_sub_signed(overlap))
            .unwrap_or_else(|| DateTime::<Utc>::from(UNIX_EPOCH));

        let outcome = self.run_pass(since, started_at).await;
        self.release_claim();
        outcome
    }

    async fn run_pass(&self, since: DateTime<Utc>, started_at: SystemTime) -> SyncOutcome {
        let self_id = match self.identity.get() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Instance identity unavailable, aborting pass");
                return SyncOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        };

        // 4. read
        let records = match self.log.read_since(since).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, since = %since, "Failed to read sync log, retrying next cycle");
                return SyncOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        };

        let mut report = SyncReport {
            records_read: records.len(),
            ..Default::default()
        };

        // 5-6. filter + replay
        for record in &records {
            if record.batch.is_from(self_id.as_str()) {
                debug!(sequence_id = record.sequence_id, "Skipping self-originated batch");
                report.skipped_self += 1;
                continue;
            }

            debug!(
                sequence_id = record.sequence_id,
                origin = %record.batch.instance_id,
                count = record.batch.len(),
                "Replaying batch"
            );

            for event in &record.batch.events {
                match self.executor.apply(event).await {
                    Ok(ApplyOutcome::Applied) => report.replayed.push(event.clone()),
                    Ok(ApplyOutcome::PageNotFound(_)) => report.skipped_pages += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            sequence_id = record.sequence_id,
                            method = %event.method(),
                            error = %e,
                            "Failed to replay event"
                        );
                    }
                }
            }
        }

        // 7. retention
        match DateTime::<Utc>::from(started_at).checked_sub_signed(self.config.retention) {
            Some(cutoff) => match self.log.prune_older_than(cutoff).await {
                Ok(pruned) => report.pruned = pruned,
                Err(e) => warn!(error = %e, "Failed to prune sync log"),
            },
            None => warn!(
                retention_secs = self.config.retention.num_seconds(),
                "Retention window out of range, skipping prune"
            ),
        }

        // 8. advance last marker to the pass start
        if let Err(e) = self.markers.last.touch_at(started_at) {
            warn!(error = %e, "Failed to advance last-sync marker");
        }

        info!(
            instance_id = %self_id,
            records = report.records_read,
            replayed = report.replayed.len(),
            skipped_self = report.skipped_self,
            failed = report.failed,
            pruned = report.pruned,
            "Reconciliation complete"
        );

        SyncOutcome::Completed(report)
    }

    fn release_claim(&self) {
        if let Err(e) = self.markers.run.remove() {
            warn!(error = %e, "Failed to remove run marker");
        }
    }
}
