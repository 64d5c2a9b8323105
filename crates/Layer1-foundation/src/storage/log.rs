//! Event Log trait - 공유 로그 추상화

use crate::event::{EventBatch, LogRecord};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Append-only, timestamp-ordered log shared by every instance.
///
/// Implementations assign `sequence_id` and `timestamp` themselves at write
/// time. Errors from any method are reported as
/// [`Error::StoreUnavailable`](crate::Error::StoreUnavailable).
#[async_trait]
pub trait EventLog: Send + Sync {
    /// 배치 하나를 새 레코드로 기록, sequence id 반환
    async fn append(&self, batch: &EventBatch) -> Result<i64>;

    /// `timestamp > since` 인 레코드를 시간 오름차순으로 반환
    ///
    /// Rows whose payload cannot be decoded are skipped one by one.
    async fn read_since(&self, since: DateTime<Utc>) -> Result<Vec<LogRecord>>;

    /// `timestamp < cutoff` 인 레코드 삭제, 삭제된 행 수 반환
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
