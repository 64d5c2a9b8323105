//! Clear Events - 인스턴스 간 동기화 대상 이벤트
//!
//! 로컬 캐시 삭제가 어떻게 기록되고 공유 로그에 저장되는지를 정의합니다.
//!
//! ## 흐름
//!
//! ```text
//! clearPage(42) ──► ClearEvent ──► EventBatch{id, cleared} ──► LogRecord(payload)
//!                                                                  │
//!                     peer: LogRecord.batch ◄─────────────────────┘
//! ```

pub mod types;

// Re-exports
pub use types::{ClearEvent, ClearMethod, ClearOptions, EventBatch, LogRecord};
