//! Filesystem Cache Engine
//!
//! 페이지 캐시는 `<cacheRoot>/pages/<pageId>/` 디렉토리에 저장된다.

use crate::pages::ManifestPageLookup;
use async_trait::async_trait;
use pagesync_core::{BehaviorImpact, CacheEngine, Page, PageClearReport};
use pagesync_foundation::{Error, Result};
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const PAGES_DIR: &str = "pages";

pub struct FsCacheEngine {
    cache_root: PathBuf,
    pages: Arc<ManifestPageLookup>,
}

impl FsCacheEngine {
    pub fn new(cache_root: impl Into<PathBuf>, pages: Arc<ManifestPageLookup>) -> Self {
        Self {
            cache_root: cache_root.into(),
            pages,
        }
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.cache_root.join(PAGES_DIR)
    }

    /// cache root 기준 페이지 디렉토리
    fn page_path(page_id: u64) -> String {
        format!("{}/{}", PAGES_DIR, page_id)
    }

    /// 페이지 디렉토리 삭제, 실제로 지웠으면 `true`
    fn remove_page_dir(&self, page_id: u64) -> Result<bool> {
        remove_dir(&self.cache_root.join(Self::page_path(page_id)))
    }

    /// 캐시된 페이지 ID 목록
    pub fn cached_pages(&self) -> Result<Vec<u64>> {
        let dir = self.pages_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::filesystem(&dir, e)),
        };

        let mut ids: Vec<u64> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl CacheEngine for FsCacheEngine {
    async fn clear_all(&self) -> Result<()> {
        let removed = remove_dir(&self.pages_dir())?;
        debug!(removed, "Cleared entire page cache");
        Ok(())
    }

    async fn clear_page(
        &self,
        page: &Page,
        options: &Map<String, Value>,
    ) -> Result<PageClearReport> {
        let mut report = PageClearReport::default();

        let mut targets = vec![page.id];
        if options.get("children").and_then(Value::as_bool) == Some(true) {
            targets.extend(self.pages.children_of(page.id));
        }

        for page_id in targets {
            if self.remove_page_dir(page_id)? {
                report.paths_cleared.push(Self::page_path(page_id));
            }
        }

        debug!(page_id = page.id, cleared = report.paths_cleared.len(), "Cleared page cache");
        Ok(report)
    }

    async fn clear_behaviors_for(&self, page: &Page) -> Result<BehaviorImpact> {
        let mut impact = BehaviorImpact::default();

        if self.pages.is_global(page.id) {
            remove_dir(&self.pages_dir())?;
            impact.site = 1;
            return Ok(impact);
        }

        self.remove_page_dir(page.id)?;
        for child in self.pages.children_of(page.id) {
            if self.remove_page_dir(child)? {
                impact.children += 1;
            }
        }
        if let Some(parent) = page.parent_id {
            if self.remove_page_dir(parent)? {
                impact.family += 1;
            }
        }

        Ok(impact)
    }
}

fn remove_dir(path: &Path) -> Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::filesystem(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::ManifestEntry;

    fn setup(ids: &[u64], manifest: Vec<ManifestEntry>) -> (tempfile::TempDir, FsCacheEngine) {
        let dir = tempfile::tempdir().unwrap();
        for id in ids {
            let page_dir = dir.path().join("pages").join(id.to_string());
            std::fs::create_dir_all(&page_dir).unwrap();
            std::fs::write(page_dir.join("index.html"), "<html/>").unwrap();
        }
        let engine = FsCacheEngine::new(
            dir.path(),
            Arc::new(ManifestPageLookup::from_entries(manifest)),
        );
        (dir, engine)
    }

    fn entry(id: u64, parent: Option<u64>, global: bool) -> ManifestEntry {
        ManifestEntry { id, parent, global }
    }

    #[tokio::test]
    async fn test_clear_page_with_children() {
        let (_dir, engine) = setup(
            &[1, 2, 3],
            vec![entry(1, None, false), entry(2, Some(1), false), entry(3, None, false)],
        );

        let mut options = Map::new();
        options.insert("children".to_string(), Value::Bool(true));
        let report = engine.clear_page(&Page::new(1), &options).await.unwrap();

        assert_eq!(report.paths_cleared, vec!["pages/1", "pages/2"]);
        assert_eq!(engine.cached_pages().unwrap(), vec![3]);

        // 이미 지워진 페이지도 성공
        let report = engine.clear_page(&Page::new(1), &options).await.unwrap();
        assert!(report.paths_cleared.is_empty());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (_dir, engine) = setup(&[1, 2], vec![]);
        engine.clear_all().await.unwrap();
        assert!(engine.cached_pages().unwrap().is_empty());
        engine.clear_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_behaviors_report_impact() {
        let (_dir, engine) = setup(
            &[1, 2, 3, 4],
            vec![
                entry(1, None, false),
                entry(2, Some(1), false),
                entry(3, Some(2), false),
                entry(4, None, true),
            ],
        );

        let impact = engine
            .clear_behaviors_for(&Page::new(2).with_parent(1))
            .await
            .unwrap();
        assert_eq!(
            impact,
            BehaviorImpact { children: 1, family: 1, site: 0 }
        );
        assert_eq!(engine.cached_pages().unwrap(), vec![4]);

        let impact = engine.clear_behaviors_for(&Page::new(4)).await.unwrap();
        assert_eq!(impact.site, 1);
        assert!(engine.cached_pages().unwrap().is_empty());
    }
}
