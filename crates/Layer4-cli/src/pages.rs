//! Page Manifest - 배포 루트의 `pages.json` 기반 페이지 조회
//!
//! ```json
//! [
//!   {"id": 1, "parent": null, "global": false},
//!   {"id": 42, "parent": 1}
//! ]
//! ```
//!
//! 매니페스트가 없으면 모든 페이지 ID 가 존재하는 것으로 본다.

use async_trait::async_trait;
use pagesync_core::{Page, PageLookup};
use pagesync_foundation::{JsonStore, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

pub const MANIFEST_FILE: &str = "pages.json";

/// 매니페스트 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: u64,
    #[serde(default)]
    pub parent: Option<u64>,
    /// 사이트 전체에 표시되는 페이지 (메뉴, 푸터 등)
    #[serde(default)]
    pub global: bool,
}

#[derive(Debug, Default)]
pub struct ManifestPageLookup {
    entries: Option<HashMap<u64, ManifestEntry>>,
}

impl ManifestPageLookup {
    /// 배포 루트에서 매니페스트 로드
    pub fn load(deploy_root: &Path) -> Result<Self> {
        let store = JsonStore::new(deploy_root);
        let entries = store
            .load_optional::<Vec<ManifestEntry>>(MANIFEST_FILE)?
            .map(|list| list.into_iter().map(|e| (e.id, e)).collect::<HashMap<_, _>>());

        match &entries {
            Some(map) => debug!(count = map.len(), "Loaded page manifest"),
            None => debug!(deploy_root = %deploy_root.display(), "No page manifest, every id resolves"),
        }

        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<ManifestEntry>) -> Self {
        Self {
            entries: Some(entries.into_iter().map(|e| (e.id, e)).collect()),
        }
    }

    pub fn get(&self, page_id: u64) -> Option<&ManifestEntry> {
        self.entries.as_ref()?.get(&page_id)
    }

    pub fn is_global(&self, page_id: u64) -> bool {
        self.get(page_id).map_or(false, |e| e.global)
    }

    /// 직계 하위 페이지 (ID 순)
    pub fn children_of(&self, page_id: u64) -> Vec<u64> {
        let Some(entries) = &self.entries else {
            return Vec::new();
        };

        let mut children: Vec<u64> = entries
            .values()
            .filter(|e| e.parent == Some(page_id))
            .map(|e| e.id)
            .collect();
        children.sort_unstable();
        children
    }

    fn page(&self, page_id: u64) -> Option<Page> {
        match &self.entries {
            None => Some(Page::new(page_id)),
            Some(entries) => entries.get(&page_id).map(|entry| {
                let page = Page::new(entry.id);
                match entry.parent {
                    Some(parent) => page.with_parent(parent),
                    None => page,
                }
            }),
        }
    }
}

#[async_trait]
impl PageLookup for ManifestPageLookup {
    async fn resolve(&self, page_id: u64) -> Result<Option<Page>> {
        Ok(self.page(page_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ManifestPageLookup {
        ManifestPageLookup::from_entries(vec![
            ManifestEntry { id: 1, parent: None, global: true },
            ManifestEntry { id: 42, parent: Some(1), global: false },
            ManifestEntry { id: 43, parent: Some(1), global: false },
        ])
    }

    #[tokio::test]
    async fn test_resolve_from_manifest() {
        let pages = manifest();
        assert_eq!(
            pages.resolve(42).await.unwrap(),
            Some(Page::new(42).with_parent(1))
        );
        assert_eq!(pages.resolve(99).await.unwrap(), None);
        assert_eq!(pages.children_of(1), vec![42, 43]);
        assert!(pages.is_global(1));
        assert!(!pages.is_global(42));
    }

    #[tokio::test]
    async fn test_missing_manifest_resolves_everything() {
        let dir = tempfile::tempdir().unwrap();
        let pages = ManifestPageLookup::load(dir.path()).unwrap();
        assert_eq!(pages.resolve(7).await.unwrap(), Some(Page::new(7)));
        assert!(pages.children_of(7).is_empty());
    }

    #[test]
    fn test_load_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"[{"id": 1, "parent": null, "global": false}, {"id": 2, "parent": 1}]"#,
        )
        .unwrap();

        let pages = ManifestPageLookup::load(dir.path()).unwrap();
        assert_eq!(pages.children_of(1), vec![2]);
        assert!(pages.get(3).is_none());
    }
}
