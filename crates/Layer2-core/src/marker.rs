//! Sync Markers - 파일 mtime 기반 동기화 마커
//!
//! 캐시 루트 옆에 두 개의 파일을 둔다:
//! - `<cacheRoot>.last-sync`: mtime = 마지막으로 성공한 동기화 시점
//! - `<cacheRoot>.run-sync`: 존재 + mtime = 진행 중인 동기화 claim
//!
//! `run` 마커는 best-effort 잠금이다. 일정 시간보다 오래된 마커는 버려진 것으로
//! 보고 덮어쓴다. 같은 로그를 두 번 재실행해도 결과가 같으므로 충분하다.

use chrono::{DateTime, Utc};
use pagesync_foundation::{Error, Result};
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

const LAST_SUFFIX: &str = ".last-sync";
const RUN_SUFFIX: &str = ".run-sync";

/// mtime 만 의미가 있는 빈 파일
#[derive(Debug, Clone)]
pub struct MarkerFile {
    path: PathBuf,
}

impl MarkerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 마커 mtime (없으면 `None`)
    pub fn modified(&self) -> Result<Option<SystemTime>> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => meta
                .modified()
                .map(Some)
                .map_err(|e| Error::filesystem(&self.path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::filesystem(&self.path, e)),
        }
    }

    /// mtime 을 UTC 시각으로
    pub fn timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.modified()?.map(DateTime::<Utc>::from))
    }

    /// `now` 기준 마커 나이
    ///
    /// An mtime in the future (clock skew between hosts) counts as age zero.
    pub fn age(&self, now: SystemTime) -> Result<Option<Duration>> {
        Ok(self
            .modified()?
            .map(|mtime| now.duration_since(mtime).unwrap_or(Duration::ZERO)))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// 생성 또는 mtime 갱신
    pub fn touch(&self) -> Result<()> {
        self.touch_at(SystemTime::now())
    }

    pub fn touch_at(&self, at: SystemTime) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| Error::filesystem(&self.path, e))?;
        file.set_modified(at)
            .map_err(|e| Error::filesystem(&self.path, e))
    }

    /// 마커 삭제 (이미 없으면 성공)
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::filesystem(&self.path, e)),
        }
    }

    /// Claim the marker unless another holder touched it within `stale_after`.
    ///
    /// Returns `Ok(false)` when a fresh claim exists. A stale claim is taken
    /// over. Check and touch are not atomic across processes.
    pub fn try_claim(&self, stale_after: Duration) -> Result<bool> {
        if let Some(age) = self.age(SystemTime::now())? {
            if age < stale_after {
                debug!(path = %self.path.display(), age_ms = age.as_millis() as u64, "Marker held");
                return Ok(false);
            }
            warn!(
                path = %self.path.display(),
                age_secs = age.as_secs(),
                "Taking over stale marker"
            );
        }

        self.touch()?;
        Ok(true)
    }
}

/// 캐시 루트 하나에 대한 마커 쌍
#[derive(Debug, Clone)]
pub struct SyncMarkers {
    pub last: MarkerFile,
    pub run: MarkerFile,
}

impl SyncMarkers {
    pub fn for_cache_root(cache_root: &Path) -> Self {
        // "/srv/cache/" → "/srv/cache"
        let base: PathBuf = cache_root.components().collect();

        Self {
            last: MarkerFile::new(with_suffix(&base, LAST_SUFFIX)),
            run: MarkerFile::new(with_suffix(&base, RUN_SUFFIX)),
        }
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
