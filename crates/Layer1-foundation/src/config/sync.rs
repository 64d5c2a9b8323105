//! Sync Config - 동기화 설정
//!
//! 글로벌(`<config_dir>/pagesync/sync.json`) → 프로젝트(`.pagesync/sync.json`)
//! 순서로 병합 로드

use crate::storage::JsonStore;
use crate::{Error, Result};
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 설정 파일명
pub const SYNC_CONFIG_FILE: &str = "sync.json";

/// 초 단위 값의 상한 (1일)
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// 보관 기간 상한 (10년)
pub const MAX_RETENTION_HOURS: u64 = 10 * 365 * 24;

/// 동기화 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// 캐시 엔진 루트 (marker 파일은 이 경로 옆에 생성)
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// 배포 루트 (`filesCleared` 경로의 기준)
    #[serde(default = "default_deploy_root")]
    pub deploy_root: PathBuf,

    /// 인스턴스 ID 파일
    #[serde(default = "default_identity_file")]
    pub identity_file: PathBuf,

    /// 공유 로그 데이터베이스
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// 마지막 동기화 이후 최소 간격 (초)
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,

    /// run marker 를 버려진 것으로 보는 나이 (초)
    #[serde(default = "default_lock_stale_secs")]
    pub lock_stale_secs: u64,

    /// 로그 보관 기간 (시간)
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// 주기적 동기화 간격 (초)
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

// Default value functions
fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pagesync")
}
fn default_cache_root() -> PathBuf {
    data_dir().join("cache")
}
fn default_deploy_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
fn default_identity_file() -> PathBuf {
    data_dir().join("instance-id")
}
fn default_database_path() -> PathBuf {
    data_dir().join("sync.db")
}
fn default_debounce_secs() -> u64 {
    30
}
fn default_lock_stale_secs() -> u64 {
    30
}
fn default_retention_hours() -> u64 {
    24
} // 1 day
fn default_tick_interval_secs() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            deploy_root: default_deploy_root(),
            identity_file: default_identity_file(),
            database_path: default_database_path(),
            debounce_secs: default_debounce_secs(),
            lock_stale_secs: default_lock_stale_secs(),
            retention_hours: default_retention_hours(),
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

/// 병합용 부분 설정 (파일에 있는 키만 Some)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartialSyncConfig {
    cache_root: Option<PathBuf>,
    deploy_root: Option<PathBuf>,
    identity_file: Option<PathBuf>,
    database_path: Option<PathBuf>,
    debounce_secs: Option<u64>,
    lock_stale_secs: Option<u64>,
    retention_hours: Option<u64>,
    tick_interval_secs: Option<u64>,
}

impl SyncConfig {
    /// 모든 경로를 한 디렉토리 아래로 모은 설정 (테스트, 단일 호스트 데모용)
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            cache_root: root.join("cache"),
            deploy_root: root.join("deploy"),
            identity_file: root.join("instance-id"),
            database_path: root.join("sync.db"),
            ..Self::default()
        }
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(partial) = global.load_optional::<PartialSyncConfig>(SYNC_CONFIG_FILE)? {
                config.merge(partial);
            }
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            if let Some(partial) = project.load_optional::<PartialSyncConfig>(SYNC_CONFIG_FILE)? {
                config.merge(partial);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// 지정된 파일 하나만 로드 (기본값 위에 병합)
    pub fn load_file(path: &Path) -> Result<Self> {
        let partial: PartialSyncConfig = JsonStore::read_path(path)?;
        let mut config = Self::default();
        config.merge(partial);
        config.validate()?;
        Ok(config)
    }

    /// 파일에 있는 값이 우선
    fn merge(&mut self, other: PartialSyncConfig) {
        if let Some(v) = other.cache_root {
            self.cache_root = v;
        }
        if let Some(v) = other.deploy_root {
            self.deploy_root = v;
        }
        if let Some(v) = other.identity_file {
            self.identity_file = v;
        }
        if let Some(v) = other.database_path {
            self.database_path = v;
        }
        if let Some(v) = other.debounce_secs {
            self.debounce_secs = v;
        }
        if let Some(v) = other.lock_stale_secs {
            self.lock_stale_secs = v;
        }
        if let Some(v) = other.retention_hours {
            self.retention_hours = v;
        }
        if let Some(v) = other.tick_interval_secs {
            self.tick_interval_secs = v;
        }
    }

    /// 0 값과 상한 초과 값 거부
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("debounceSecs", self.debounce_secs, MAX_INTERVAL_SECS),
            ("lockStaleSecs", self.lock_stale_secs, MAX_INTERVAL_SECS),
            ("retentionHours", self.retention_hours, MAX_RETENTION_HOURS),
            ("tickIntervalSecs", self.tick_interval_secs, MAX_INTERVAL_SECS),
        ];

        for (key, value, max) in checks {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", key)));
            }
            if value > max {
                return Err(Error::Config(format!(
                    "{} must be at most {} (got {})",
                    key, max, value
                )));
            }
        }

        Ok(())
    }

    // ========================================================================
    // Durations
    // ========================================================================

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs)
    }

    /// 범위를 벗어난 값은 `ChronoDuration::MAX` 로 포화
    pub fn retention(&self) -> ChronoDuration {
        i64::try_from(self.retention_hours)
            .ok()
            .and_then(ChronoDuration::try_hours)
            .unwrap_or(ChronoDuration::MAX)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}
