//! Command handlers

use crate::fs_engine::FsCacheEngine;
use crate::pages::ManifestPageLookup;
use crate::ClearTarget;
use anyhow::Context;
use chrono::Utc;
use pagesync_core::{
    remove_under, FlushOutcome, MarkerFile, PageClearReport, PageLookup, SyncOutcome,
    SyncService,
};
use pagesync_foundation::{EventLog, SqliteEventLog, SyncConfig};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::warn;

pub struct App {
    service: SyncService,
    log: Arc<SqliteEventLog>,
    pages: Arc<ManifestPageLookup>,
}

impl App {
    pub fn open(config: SyncConfig) -> anyhow::Result<Self> {
        let log = Arc::new(
            SqliteEventLog::open(&config.database_path).with_context(|| {
                format!("opening sync log {}", config.database_path.display())
            })?,
        );
        let pages = Arc::new(ManifestPageLookup::load(&config.deploy_root)?);
        let engine = Arc::new(FsCacheEngine::new(&config.cache_root, pages.clone()));

        let service = SyncService::new(config, log.clone(), engine, pages.clone());

        Ok(Self {
            service,
            log,
            pages,
        })
    }

    // ========================================================================
    // status
    // ========================================================================

    pub async fn status(&self) -> anyhow::Result<()> {
        let config = self.service.config();
        let identity = self.service.identity()?;
        let markers = self.service.markers();

        println!("\n📋 PageSync Status\n");
        println!("{:<14} {}", "Instance", identity);
        println!("{:<14} {}", "Cache root", config.cache_root.display());
        println!("{:<14} {}", "Database", config.database_path.display());
        println!("{:<14} {}", "Last sync", describe_marker(&markers.last)?);
        println!("{:<14} {}", "Run marker", describe_marker(&markers.run)?);
        println!("{:<14} {}", "Log rows", self.log.count().await?);

        match self.log.latest_timestamp().await? {
            Some(ts) => println!("{:<14} {}", "Newest row", ts.to_rfc3339()),
            None => println!("{:<14} -", "Newest row"),
        }
        println!();

        Ok(())
    }

    // ========================================================================
    // sync / watch
    // ========================================================================

    pub async fn sync(&self) -> anyhow::Result<()> {
        let outcome = self.service.reconcile().await;
        print_sync_outcome(&outcome);
        Ok(())
    }

    pub async fn watch(&self, interval: Option<u64>) -> anyhow::Result<()> {
        let interval = interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.service.config().tick_interval());
        let (tx, rx) = watch::channel(false);

        println!("Watching every {}s, press Ctrl-C to stop", interval.as_secs());

        let shutdown = async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            let _ = tx.send(true);
        };

        tokio::join!(self.service.run_periodic(interval, rx), shutdown);
        Ok(())
    }

    // ========================================================================
    // clear
    // ========================================================================

    pub async fn clear(&self, target: ClearTarget) -> anyhow::Result<()> {
        let scope = self.service.begin_request();

        {
            let recording = scope.recording(self.service.engine());

            match target {
                ClearTarget::All => {
                    recording.clear_all().await?;
                    println!("✓ Cleared entire cache");
                }
                ClearTarget::Page {
                    id,
                    children,
                    files,
                    paths,
                } => {
                    let Some(page) = self.pages.resolve(id).await? else {
                        println!("Page {} not found", id);
                        return Ok(());
                    };

                    let mut options = Map::new();
                    if children {
                        options.insert("children".to_string(), Value::Bool(true));
                    }
                    let artifacts = self.remove_artifacts(files, paths);

                    let report = recording
                        .clear_page_with_artifacts(&page, options, artifacts)
                        .await?;
                    println!(
                        "✓ Cleared page {} ({} directories, {} files)",
                        id,
                        report.paths_cleared.len(),
                        report.files_cleared.len()
                    );
                }
                ClearTarget::Behaviors { id } => {
                    let Some(page) = self.pages.resolve(id).await? else {
                        println!("Page {} not found", id);
                        return Ok(());
                    };

                    let impact = recording.clear_behaviors_for(&page).await?;
                    println!(
                        "✓ Cleared behaviors for page {} (children: {}, family: {}, site: {})",
                        id, impact.children, impact.family, impact.site
                    );
                }
            }
        }

        let (flushed, synced) = self.service.end_request(scope).await;
        match flushed {
            FlushOutcome::Appended {
                sequence_id,
                events,
            } => println!("  Published {} event(s) as row #{}", events, sequence_id),
            FlushOutcome::Empty => {}
            FlushOutcome::Discarded { events } => {
                println!("  {} event(s) not published (sync in progress)", events)
            }
            FlushOutcome::Failed { reason } => println!("  Publish failed: {}", reason),
        }
        print_sync_outcome(&synced);

        Ok(())
    }

    /// 호출자가 지정한 추가 산출물 삭제 (루트 밖 경로는 거부)
    fn remove_artifacts(&self, files: Vec<String>, paths: Vec<String>) -> PageClearReport {
        let config = self.service.config();
        let mut report = PageClearReport::default();

        for file in files {
            if remove_under(&config.deploy_root, &file, false) {
                report.files_cleared.push(file);
            }
        }
        for path in paths {
            if remove_under(&config.cache_root, &path, true) {
                report.paths_cleared.push(path);
            }
        }

        report
    }

    // ========================================================================
    // prune
    // ========================================================================

    pub async fn prune(&self) -> anyhow::Result<()> {
        let retention = self.service.config().retention();
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .context("retention window out of range")?;
        let pruned = self.log.prune_older_than(cutoff).await?;
        println!("✓ Pruned {} row(s) older than {}", pruned, cutoff.to_rfc3339());
        Ok(())
    }
}

fn describe_marker(marker: &MarkerFile) -> anyhow::Result<String> {
    Ok(match marker.age(SystemTime::now())? {
        Some(age) => format!("{}s ago", age.as_secs()),
        None => "never".to_string(),
    })
}

fn print_sync_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::InProgress => println!("Sync already running in this process"),
        SyncOutcome::TooSoon { since_last } => {
            println!("Synced {}s ago, skipping", since_last.as_secs())
        }
        SyncOutcome::Locked { age } => {
            println!("Another instance is syncing (claimed {}s ago)", age.as_secs())
        }
        SyncOutcome::Aborted { reason } => println!("Sync aborted: {}", reason),
        SyncOutcome::Completed(report) => {
            println!(
                "✓ Sync complete: {} record(s), {} replayed, {} own, {} unknown page(s), {} failed, {} pruned",
                report.records_read,
                report.replayed.len(),
                report.skipped_self,
                report.skipped_pages,
                report.failed,
                report.pruned
            );
        }
    }
}
