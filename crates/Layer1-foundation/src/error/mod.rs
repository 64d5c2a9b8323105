//! Error types for PageSync
//!
//! 동기화 서브시스템의 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// PageSync 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 저장소 관련
    // ========================================================================
    /// Row store read/write failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Log payload failed to parse or misses required fields
    #[error("Malformed record {sequence_id}: {message}")]
    MalformedRecord { sequence_id: i64, message: String },

    // ========================================================================
    // 캐시 관련
    // ========================================================================
    /// Referenced page no longer exists
    #[error("Page not found: {0}")]
    UnresolvedPage(u64),

    /// Marker or artifact file operation failed
    #[error("Filesystem unavailable: {path} - {message}")]
    FilesystemUnavailable { path: String, message: String },

    #[error("Cache engine error: {0}")]
    Engine(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 다음 사이클에 재시도하면 해결될 수 있는 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_)
                | Error::FilesystemUnavailable { .. }
                | Error::Sqlite(_)
                | Error::Io(_)
        )
    }

    /// 레코드 하나만 건너뛰면 되는 에러인지 확인
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Error::MalformedRecord { .. } | Error::UnresolvedPage(_)
        )
    }

    /// MalformedRecord 생성 헬퍼
    pub fn malformed(sequence_id: i64, message: impl Into<String>) -> Self {
        Error::MalformedRecord {
            sequence_id,
            message: message.into(),
        }
    }

    /// FilesystemUnavailable 생성 헬퍼
    pub fn filesystem(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Error::FilesystemUnavailable {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
