//! Request Context - 요청 단위 이벤트 버퍼
//!
//! 한 요청 동안 로컬에서 발생한 캐시 삭제를 모았다가, 요청 종료 시 한 번에
//! 공유 로그로 flush 한다. 프로세스 전역 싱글톤 대신 요청마다 생성되는
//! `RequestScope` 가 버퍼를 소유한다.
//!
//! ## 사용법
//!
//! ```ignore
//! let scope = service.begin_request();
//!
//! // 엔진 호출 → scope 에 이벤트 기록
//! scope.recording(engine.as_ref()).clear_page(&page, options).await?;
//!
//! // 요청 종료: flush + 기회적 동기화
//! service.end_request(scope).await;
//! ```

use crate::engine::{CacheEngine, ClearListener, RecordingEngine};
use pagesync_foundation::ClearEvent;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::trace;

// ============================================================================
// EventBuffer
// ============================================================================

/// 순서를 보존하는 이벤트 누적기
///
/// Repetition is kept as recorded. The one exception: once a `clearAll` is
/// seen, everything else in the batch is redundant and dropped, and later
/// events are ignored until the buffer is drained.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Vec<ClearEvent>,
    collapsed: bool,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이벤트 추가
    pub fn record(&mut self, event: ClearEvent) {
        if self.collapsed {
            trace!(method = %event.method(), "Buffer already collapsed to clearAll");
            return;
        }

        if event.is_clear_all() {
            self.events.clear();
            self.events.push(ClearEvent::ClearAll);
            self.collapsed = true;
            return;
        }

        self.events.push(event);
    }

    /// 누적된 이벤트를 꺼내고 버퍼 초기화
    pub fn drain_and_reset(&mut self) -> Vec<ClearEvent> {
        self.collapsed = false;
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// clearAll 로 축약되었는지
    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }
}

// ============================================================================
// RequestScope
// ============================================================================

static SCOPE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// 요청 하나의 수명에 묶인 컨텍스트
#[derive(Debug)]
pub struct RequestScope {
    id: u64,
    started_at: Instant,
    buffer: Mutex<EventBuffer>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self {
            id: SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed),
            started_at: Instant::now(),
            buffer: Mutex::new(EventBuffer::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// 이벤트 직접 기록
    pub fn record(&self, event: ClearEvent) {
        self.buffer.lock().record(event);
    }

    /// 기록 대기 중인 이벤트 수
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// 버퍼 비우기 (요청 종료 시 한 번)
    pub fn drain(&self) -> Vec<ClearEvent> {
        self.buffer.lock().drain_and_reset()
    }

    /// 이 scope 에 기록하는 엔진 래퍼
    pub fn recording<'a>(&'a self, engine: &'a dyn CacheEngine) -> RecordingEngine<'a> {
        RecordingEngine::new(engine, self)
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ClearListener for RequestScope {
    fn on_cleared(&self, event: ClearEvent) {
        trace!(scope = self.id, method = %event.method(), "Clear recorded");
        self.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BehaviorImpact, Page};
    use crate::testing::FakeEngine;
    use pagesync_foundation::ClearOptions;

    #[test]
    fn test_preserves_order_and_repetition() {
        let mut buffer = EventBuffer::new();
        buffer.record(ClearEvent::clear_page(1, ClearOptions::new()));
        buffer.record(ClearEvent::clear_behaviors(2));
        buffer.record(ClearEvent::clear_page(1, ClearOptions::new()));

        let events = buffer.drain_and_reset();
        assert_eq!(
            events,
            vec![
                ClearEvent::clear_page(1, ClearOptions::new()),
                ClearEvent::clear_behaviors(2),
                ClearEvent::clear_page(1, ClearOptions::new()),
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear_all_collapses_batch() {
        let mut buffer = EventBuffer::new();
        buffer.record(ClearEvent::clear_behaviors(7));
        buffer.record(ClearEvent::ClearAll);
        buffer.record(ClearEvent::clear_page(9, ClearOptions::new()));
        buffer.record(ClearEvent::ClearAll);

        assert!(buffer.is_collapsed());
        assert_eq!(buffer.drain_and_reset(), vec![ClearEvent::ClearAll]);

        // drain 후에는 다시 일반 누적
        assert!(!buffer.is_collapsed());
        buffer.record(ClearEvent::clear_behaviors(3));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_scopes_are_independent() {
        let a = RequestScope::new();
        let b = RequestScope::new();
        assert_ne!(a.id(), b.id());

        a.record(ClearEvent::clear_behaviors(1));
        assert_eq!(a.pending(), 1);
        assert_eq!(b.pending(), 0);

        assert_eq!(a.drain().len(), 1);
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_recording_through_scope() {
        let engine = FakeEngine::new().with_impact(BehaviorImpact {
            site: 1,
            ..Default::default()
        });
        let scope = RequestScope::new();

        scope
            .recording(&engine)
            .clear_behaviors_for(&Page::new(5))
            .await
            .unwrap();

        // 사이트 전체에 영향 → clearAll 로 기록
        assert_eq!(scope.drain(), vec![ClearEvent::ClearAll]);
    }
}
