//! Clear Event Types - 인스턴스 간에 공유되는 캐시 삭제 이벤트 정의
//!
//! 로그 페이로드 형식:
//!
//! ```text
//! {"id": "<instanceId>", "cleared": [{"method": "clearPage", "data": {"pageId": 42, "options": {}}}]}
//! ```

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Clear Method
// ============================================================================

/// 캐시 삭제 메서드 (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClearMethod {
    /// 전체 캐시 삭제
    ClearAll,
    /// 페이지 동작(behavior) 기반 삭제
    ClearBehaviors,
    /// 단일 페이지 삭제
    ClearPage,
}

impl ClearMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClearAll => "clearAll",
            Self::ClearBehaviors => "clearBehaviors",
            Self::ClearPage => "clearPage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clearAll" => Some(Self::ClearAll),
            "clearBehaviors" => Some(Self::ClearBehaviors),
            "clearPage" => Some(Self::ClearPage),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClearMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Clear Options
// ============================================================================

/// `clearPage` 옵션
///
/// Sparse: only values that differ from the engine defaults are present.
/// `filesCleared` and `pathsCleared` are auxiliary lists the replaying side
/// mirrors on its own filesystem; the engine never sees them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearOptions {
    /// 삭제된 파일 경로 (deploy root 기준)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_cleared: Vec<String>,

    /// 삭제된 캐시 디렉토리 경로 (cache root 기준)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths_cleared: Vec<String>,

    /// 엔진에 그대로 전달되는 나머지 옵션
    #[serde(flatten)]
    pub engine: Map<String, Value>,
}

impl ClearOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 엔진 옵션 추가
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.engine.insert(key.into(), value);
        self
    }

    /// 삭제된 파일 추가
    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.files_cleared.push(path.into());
        self
    }

    /// 삭제된 디렉토리 추가
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.paths_cleared.push(path.into());
        self
    }

    /// Options forwarded to the engine, auxiliary lists stripped.
    pub fn engine_options(&self) -> &Map<String, Value> {
        &self.engine
    }

    pub fn is_empty(&self) -> bool {
        self.files_cleared.is_empty() && self.paths_cleared.is_empty() && self.engine.is_empty()
    }
}

// ============================================================================
// ClearEvent
// ============================================================================

/// 로컬에서 발생한 단일 캐시 삭제 작업
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawClearEvent", into = "RawClearEvent")]
pub enum ClearEvent {
    ClearAll,
    ClearBehaviors { page_id: u64 },
    ClearPage { page_id: u64, options: ClearOptions },
}

impl ClearEvent {
    pub fn clear_all() -> Self {
        Self::ClearAll
    }

    pub fn clear_behaviors(page_id: u64) -> Self {
        Self::ClearBehaviors { page_id }
    }

    pub fn clear_page(page_id: u64, options: ClearOptions) -> Self {
        Self::ClearPage { page_id, options }
    }

    pub fn method(&self) -> ClearMethod {
        match self {
            Self::ClearAll => ClearMethod::ClearAll,
            Self::ClearBehaviors { .. } => ClearMethod::ClearBehaviors,
            Self::ClearPage { .. } => ClearMethod::ClearPage,
        }
    }

    pub fn page_id(&self) -> Option<u64> {
        match self {
            Self::ClearAll => None,
            Self::ClearBehaviors { page_id } | Self::ClearPage { page_id, .. } => Some(*page_id),
        }
    }

    pub fn is_clear_all(&self) -> bool {
        matches!(self, Self::ClearAll)
    }
}

/// Wire shape of one event: `{"method": "...", "data": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawClearEvent {
    method: String,
    #[serde(default)]
    data: Value,
}

impl TryFrom<RawClearEvent> for ClearEvent {
    type Error = String;

    fn try_from(raw: RawClearEvent) -> std::result::Result<Self, Self::Error> {
        let method = ClearMethod::parse(&raw.method)
            .ok_or_else(|| format!("unknown clear method `{}`", raw.method))?;

        match method {
            ClearMethod::ClearAll => Ok(ClearEvent::ClearAll),
            ClearMethod::ClearBehaviors => Ok(ClearEvent::ClearBehaviors {
                page_id: page_id_of(&raw.data)?,
            }),
            ClearMethod::ClearPage => {
                let page_id = page_id_of(&raw.data)?;
                let options = match raw.data.get("options") {
                    None | Some(Value::Null) => ClearOptions::default(),
                    // 빈 옵션이 배열로 직렬화된 경우
                    Some(Value::Array(items)) if items.is_empty() => ClearOptions::default(),
                    Some(value) => serde_json::from_value(value.clone())
                        .map_err(|e| format!("invalid clearPage options: {}", e))?,
                };
                Ok(ClearEvent::ClearPage { page_id, options })
            }
        }
    }
}

impl From<ClearEvent> for RawClearEvent {
    fn from(event: ClearEvent) -> Self {
        let method = event.method().as_str().to_string();
        let data = match event {
            ClearEvent::ClearAll => Value::Object(Map::new()),
            ClearEvent::ClearBehaviors { page_id } => serde_json::json!({ "pageId": page_id }),
            ClearEvent::ClearPage { page_id, options } => serde_json::json!({
                "pageId": page_id,
                "options": options,
            }),
        };
        Self { method, data }
    }
}

/// `pageId` accepts a number or a numeric string.
fn page_id_of(data: &Value) -> std::result::Result<u64, String> {
    match data.get("pageId") {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| format!("pageId `{}` is not an unsigned integer", n)),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| format!("pageId `{}` is not numeric", s)),
        Some(other) => Err(format!("pageId has unexpected type: {}", other)),
        None => Err("missing pageId".to_string()),
    }
}

// ============================================================================
// EventBatch
// ============================================================================

/// 한 요청 동안 쌓인 이벤트 묶음 (로그에 기록되는 단위)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    /// 이벤트를 기록한 인스턴스 ID
    #[serde(rename = "id")]
    pub instance_id: String,

    /// 기록 순서대로의 이벤트
    #[serde(rename = "cleared")]
    pub events: Vec<ClearEvent>,
}

impl EventBatch {
    pub fn new(instance_id: impl Into<String>, events: Vec<ClearEvent>) -> Self {
        Self {
            instance_id: instance_id.into(),
            events,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// 같은 인스턴스에서 기록된 배치인지 확인
    pub fn is_from(&self, instance_id: &str) -> bool {
        self.instance_id == instance_id
    }

    /// 페이로드 직렬화
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 페이로드 역직렬화
    ///
    /// Every failure maps to [`Error::MalformedRecord`] so callers can skip
    /// the row and keep going.
    pub fn decode(sequence_id: i64, payload: &str) -> Result<Self> {
        let batch: EventBatch = serde_json::from_str(payload)
            .map_err(|e| Error::malformed(sequence_id, e.to_string()))?;

        if batch.instance_id.trim().is_empty() {
            return Err(Error::malformed(sequence_id, "empty instance id"));
        }

        Ok(batch)
    }
}

// ============================================================================
// LogRecord
// ============================================================================

/// 공유 로그의 한 행 (페이로드 디코딩 완료)
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// 저장소가 부여한 단조 증가 ID
    pub sequence_id: i64,

    /// 저장소가 기록 시점에 부여한 시간
    pub timestamp: DateTime<Utc>,

    /// 디코딩된 페이로드
    pub batch: EventBatch,
}

impl LogRecord {
    /// 저장된 페이로드로부터 레코드 생성
    pub fn decode(sequence_id: i64, timestamp: DateTime<Utc>, payload: &str) -> Result<Self> {
        Ok(Self {
            sequence_id,
            timestamp,
            batch: EventBatch::decode(sequence_id, payload)?,
        })
    }
}

// ============================================================================
// 테스트
// ============================================================================
