//! pagesync-core: 캐시 삭제 동기화 코어
//!
//! Layer2 - 로컬 삭제 기록, 공유 로그 flush, 피어 로그 재실행
//!
//! # 주요 모듈
//!
//! - `identity`: 인스턴스 고유 ID (파일에 영구 저장)
//! - `context`: 요청 단위 이벤트 버퍼 (`RequestScope`)
//! - `engine`: 캐시 엔진 / 페이지 조회 계약, `RecordingEngine`
//! - `marker`: mtime 기반 `last` / `run` 마커
//! - `replay`: 피어 이벤트 적용 (`ReplayExecutor`)
//! - `coordinator`: 동기화 패스 상태 머신
//! - `service`: 요청 수명주기 + 주기적 동기화
//!
//! # 사용 예시
//!
//! ```ignore
//! use pagesync_core::SyncService;
//! use pagesync_foundation::{SqliteEventLog, SyncConfig};
//!
//! let config = SyncConfig::load()?;
//! let log = Arc::new(SqliteEventLog::open(&config.database_path)?);
//! let service = SyncService::new(config, log, engine, pages);
//!
//! // 요청 처리
//! let scope = service.begin_request();
//! scope.recording(service.engine()).clear_page(&page, options).await?;
//! service.end_request(scope).await;
//!
//! // 주기적 동기화
//! service.run_periodic(service.config().tick_interval(), shutdown_rx).await;
//! ```

pub mod context;
pub mod coordinator;
pub mod engine;
pub mod identity;
pub mod marker;
pub mod replay;
pub mod service;

#[cfg(test)]
mod testing;

// Re-exports: Request context
pub use context::{EventBuffer, RequestScope};

// Re-exports: Collaborators
pub use engine::{
    BehaviorImpact, CacheEngine, ClearListener, Page, PageClearReport, PageLookup,
    RecordingEngine,
};

// Re-exports: Identity / Markers
pub use identity::{IdentityProvider, InstanceId, IDENTITY_LENGTH};
pub use marker::{MarkerFile, SyncMarkers};

// Re-exports: Replay / Coordination
pub use coordinator::{
    CoordinatorConfig, CoordinatorState, ReconciliationCoordinator, SyncOutcome, SyncReport,
};
pub use replay::{remove_under, resolve_under, ApplyOutcome, ReplayExecutor};
pub use service::{FlushOutcome, SyncService, MIN_TICK_INTERVAL};
