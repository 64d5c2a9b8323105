//! # pagesync-foundation
//!
//! Foundation layer for PageSync:
//! - Event: 캐시 삭제 이벤트 / 배치 / 로그 레코드 정의
//! - Storage: 공유 로그 (EventLog trait + SQLite), JsonStore (설정)
//! - Config: SyncConfig (경로, debounce/lock/retention)
//! - Error: 공통 에러 타입
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Instance A                         Instance B          │
//! │  clearPage(42)                                          │
//! │     │                                                   │
//! │     ▼                                                   │
//! │  EventBatch{id: A, cleared: [...]}                      │
//! │     │ append                          read_since(T_last)│
//! │     ▼                                        ▲          │
//! │  ┌──────────────────────────────────────────┴───────┐  │
//! │  │  cache_sync_log (sequence_id, timestamp, payload) │  │
//! │  └───────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{SyncConfig, SYNC_CONFIG_FILE};

// ============================================================================
// Event (캐시 삭제 이벤트)
// ============================================================================
pub use event::{ClearEvent, ClearMethod, ClearOptions, EventBatch, LogRecord};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{
    // Shared log
    EventLog,
    SqliteEventLog,
    // JSON (설정)
    JsonStore,
};
