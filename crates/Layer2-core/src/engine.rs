//! Cache Engine - 외부 협력자 인터페이스
//!
//! 동기화 코어가 의존하는 캐시 엔진 / 페이지 조회 계약과,
//! 로컬 삭제를 리스너에게 알리는 `RecordingEngine`.
//!
//! ```text
//! request ──► RecordingEngine ──► CacheEngine::clear_page()
//!                    │
//!                    └──► ClearListener::on_cleared({method, data})
//!
//! replay  ──────────────────────► CacheEngine::clear_page()   (리스너 없음)
//! ```

use async_trait::async_trait;
use pagesync_foundation::{ClearEvent, ClearOptions, Result};
use serde_json::{Map, Value};

// ============================================================================
// Page
// ============================================================================

/// 페이지 조회 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: u64,
    pub parent_id: Option<u64>,
}

impl Page {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// 페이지 조회 서비스
#[async_trait]
pub trait PageLookup: Send + Sync {
    /// `Ok(None)` when the page no longer exists.
    async fn resolve(&self, page_id: u64) -> Result<Option<Page>>;
}

// ============================================================================
// Cache Engine
// ============================================================================

/// Blast radius reported by a behavior-based clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BehaviorImpact {
    /// 삭제된 하위 페이지 수
    pub children: u64,
    /// 삭제된 형제/부모 페이지 수
    pub family: u64,
    /// 사이트 전체 삭제 횟수
    pub site: u64,
}

impl BehaviorImpact {
    /// 피어에 기록할 이벤트 결정
    ///
    /// A behavior that cleared the whole site is recorded as `clearAll`;
    /// anything narrower is recorded against the page.
    pub fn to_event(&self, page_id: u64) -> ClearEvent {
        if self.site > 0 {
            ClearEvent::ClearAll
        } else {
            ClearEvent::clear_behaviors(page_id)
        }
    }
}

/// Filesystem artifacts removed by a page clear, relative to their roots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageClearReport {
    /// deploy root 기준 파일
    pub files_cleared: Vec<String>,
    /// cache root 기준 디렉토리
    pub paths_cleared: Vec<String>,
}

/// 로컬 캐시 엔진
///
/// Every method must be idempotent: clearing an already-cleared page or
/// an already-empty cache succeeds.
#[async_trait]
pub trait CacheEngine: Send + Sync {
    /// 전체 캐시 삭제
    async fn clear_all(&self) -> Result<()>;

    /// 페이지 캐시 삭제
    ///
    /// `options` never contains `filesCleared` / `pathsCleared`.
    async fn clear_page(&self, page: &Page, options: &Map<String, Value>)
        -> Result<PageClearReport>;

    /// 페이지에 설정된 동작(behavior)에 따른 삭제
    async fn clear_behaviors_for(&self, page: &Page) -> Result<BehaviorImpact>;
}

// ============================================================================
// Listener
// ============================================================================

/// Post-clear callback supplying `{method, data}` for each local clear
pub trait ClearListener: Send + Sync {
    fn on_cleared(&self, event: ClearEvent);
}

/// 엔진 호출 후 리스너에게 이벤트를 알리는 래퍼
///
/// Used for local clears only. Replay talks to the bare engine so replayed
/// clears are never recorded again.
pub struct RecordingEngine<'a> {
    engine: &'a dyn CacheEngine,
    listener: &'a dyn ClearListener,
}

impl<'a> RecordingEngine<'a> {
    pub fn new(engine: &'a dyn CacheEngine, listener: &'a dyn ClearListener) -> Self {
        Self { engine, listener }
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.engine.clear_all().await?;
        self.listener.on_cleared(ClearEvent::ClearAll);
        Ok(())
    }

    pub async fn clear_page(
        &self,
        page: &Page,
        options: Map<String, Value>,
    ) -> Result<PageClearReport> {
        self.clear_page_with_artifacts(page, options, PageClearReport::default())
            .await
    }

    /// Page clear plus artifacts the caller already removed itself.
    ///
    /// `artifacts` are appended to the engine's own report before recording.
    pub async fn clear_page_with_artifacts(
        &self,
        page: &Page,
        options: Map<String, Value>,
        artifacts: PageClearReport,
    ) -> Result<PageClearReport> {
        let mut report = self.engine.clear_page(page, &options).await?;
        report.files_cleared.extend(artifacts.files_cleared);
        report.paths_cleared.extend(artifacts.paths_cleared);

        let recorded = ClearOptions {
            files_cleared: report.files_cleared.clone(),
            paths_cleared: report.paths_cleared.clone(),
            engine: options,
        };
        self.listener
            .on_cleared(ClearEvent::clear_page(page.id, recorded));

        Ok(report)
    }

    pub async fn clear_behaviors_for(&self, page: &Page) -> Result<BehaviorImpact> {
        let impact = self.engine.clear_behaviors_for(page).await?;
        self.listener.on_cleared(impact.to_event(page.id));
        Ok(impact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CollectingListener {
        events: Mutex<Vec<ClearEvent>>,
    }

    impl ClearListener for CollectingListener {
        fn on_cleared(&self, event: ClearEvent) {
            self.events.lock().push(event);
        }
    }

    #[test]
    fn test_behavior_impact_to_event() {
        let page_only = BehaviorImpact {
            children: 3,
            family: 1,
            site: 0,
        };
        assert_eq!(page_only.to_event(7), ClearEvent::clear_behaviors(7));

        let site_wide = BehaviorImpact {
            site: 1,
            ..Default::default()
        };
        assert_eq!(site_wide.to_event(7), ClearEvent::ClearAll);
    }

    #[tokio::test]
    async fn test_recording_engine_reports_artifacts() {
        let engine = FakeEngine::new().with_report(PageClearReport {
            files_cleared: vec!["cache/42.html".to_string()],
            paths_cleared: vec![],
        });
        let listener = CollectingListener::default();
        let recording = RecordingEngine::new(&engine, &listener);

        let mut options = Map::new();
        options.insert("children".to_string(), Value::Bool(true));
        recording
            .clear_page(&Page::new(42), options)
            .await
            .unwrap();
        recording.clear_all().await.unwrap();

        let events = listener.events.lock();
        assert_eq!(events.len(), 2);
        match &events[0] {
            ClearEvent::ClearPage { page_id, options } => {
                assert_eq!(*page_id, 42);
                assert_eq!(options.files_cleared, vec!["cache/42.html".to_string()]);
                assert_eq!(options.engine_options()["children"], Value::Bool(true));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(events[1], ClearEvent::ClearAll);
        assert_eq!(engine.calls(), vec!["clearPage:42", "clearAll"]);
    }

    #[tokio::test]
    async fn test_caller_artifacts_are_recorded() {
        let engine = FakeEngine::new().with_report(PageClearReport {
            files_cleared: vec![],
            paths_cleared: vec!["pages/3".to_string()],
        });
        let listener = CollectingListener::default();
        let recording = RecordingEngine::new(&engine, &listener);

        let report = recording
            .clear_page_with_artifacts(
                &Page::new(3),
                Map::new(),
                PageClearReport {
                    files_cleared: vec!["static/3.html".to_string()],
                    paths_cleared: vec![],
                },
            )
            .await
            .unwrap();
        assert_eq!(report.files_cleared, vec!["static/3.html".to_string()]);

        let events = listener.events.lock();
        let expected = ClearOptions::new()
            .with_file("static/3.html")
            .with_path("pages/3");
        assert_eq!(events[0], ClearEvent::clear_page(3, expected));
    }

    #[tokio::test]
    async fn test_failed_clear_is_not_recorded() {
        let engine = FakeEngine::new().failing();
        let listener = CollectingListener::default();
        let recording = RecordingEngine::new(&engine, &listener);

        assert!(recording.clear_all().await.is_err());
        assert!(listener.events.lock().is_empty());
    }
}
