//! Config - 동기화 설정 관리
//!
//! - `sync.rs` - SyncConfig (경로, debounce/lock/retention 시간)

mod sync;

pub use sync::{SyncConfig, SYNC_CONFIG_FILE};
