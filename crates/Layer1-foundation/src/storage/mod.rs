//! Storage module for PageSync
//!
//! - `log`: EventLog trait - 인스턴스 간 공유 로그 추상화
//! - `db`: SQLite - 공유 로그 구현
//! - `json`: JSON - 설정 파일 저장/로드

mod db;
mod json;
mod log;

// Shared log
pub use db::SqliteEventLog;
pub use log::EventLog;

// JSON Storage (설정)
pub use json::JsonStore;
