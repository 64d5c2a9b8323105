//! Test doubles for the collaborator traits

use crate::engine::{BehaviorImpact, CacheEngine, Page, PageClearReport, PageLookup};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagesync_foundation::{Error, EventBatch, EventLog, LogRecord, Result};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// FakeEngine
// ============================================================================

#[derive(Default)]
pub(crate) struct FakeEngine {
    calls: Mutex<Vec<String>>,
    options: Mutex<Vec<Map<String, Value>>>,
    report: PageClearReport,
    impact: BehaviorImpact,
    fail: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report(mut self, report: PageClearReport) -> Self {
        self.report = report;
        self
    }

    pub fn with_impact(mut self, impact: BehaviorImpact) -> Self {
        self.impact = impact;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn page_options(&self) -> Vec<Map<String, Value>> {
        self.options.lock().clone()
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            Err(Error::Engine("engine offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheEngine for FakeEngine {
    async fn clear_all(&self) -> Result<()> {
        self.check()?;
        self.calls.lock().push("clearAll".to_string());
        Ok(())
    }

    async fn clear_page(
        &self,
        page: &Page,
        options: &Map<String, Value>,
    ) -> Result<PageClearReport> {
        self.check()?;
        self.calls.lock().push(format!("clearPage:{}", page.id));
        self.options.lock().push(options.clone());
        Ok(self.report.clone())
    }

    async fn clear_behaviors_for(&self, page: &Page) -> Result<BehaviorImpact> {
        self.check()?;
        self.calls.lock().push(format!("clearBehaviors:{}", page.id));
        Ok(self.impact)
    }
}

// ============================================================================
// FakePages
// ============================================================================

pub(crate) struct FakePages {
    known: Option<HashSet<u64>>,
}

impl FakePages {
    /// Every id resolves
    pub fn all() -> Self {
        Self { known: None }
    }

    pub fn only(ids: &[u64]) -> Self {
        Self {
            known: Some(ids.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl PageLookup for FakePages {
    async fn resolve(&self, page_id: u64) -> Result<Option<Page>> {
        let exists = self
            .known
            .as_ref()
            .map_or(true, |known| known.contains(&page_id));
        Ok(exists.then(|| Page::new(page_id)))
    }
}

// ============================================================================
// MemoryLog
// ============================================================================

#[derive(Default)]
pub(crate) struct MemoryLog {
    rows: Mutex<Vec<LogRecord>>,
    fail_reads: AtomicBool,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_at(&self, timestamp: DateTime<Utc>, batch: EventBatch) -> i64 {
        let mut rows = self.rows.lock();
        let sequence_id = rows.len() as i64 + 1;
        rows.push(LogRecord {
            sequence_id,
            timestamp,
            batch,
        });
        sequence_id
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn batches(&self) -> Vec<EventBatch> {
        self.rows.lock().iter().map(|r| r.batch.clone()).collect()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn append(&self, batch: &EventBatch) -> Result<i64> {
        Ok(self.insert_at(Utc::now(), batch.clone()))
    }

    async fn read_since(&self, since: DateTime<Utc>) -> Result<Vec<LogRecord>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("connection refused".to_string()));
        }

        let mut records: Vec<LogRecord> = self
            .rows
            .lock()
            .iter()
            .filter(|r| r.timestamp > since)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.timestamp, r.sequence_id));
        Ok(records)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|r| r.timestamp >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}
