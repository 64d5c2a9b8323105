//! Replay Executor - 피어 이벤트를 로컬 캐시에 적용
//!
//! 모든 분기는 멱등이다. 이미 지워진 페이지/파일을 다시 지워도 성공한다.

use crate::engine::{CacheEngine, PageLookup};
use pagesync_foundation::{ClearEvent, Result, SyncConfig};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// 이벤트 적용 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// 로컬에 없는 페이지 (조용히 건너뜀)
    PageNotFound(u64),
}

/// Applies one peer event against the bare engine.
pub struct ReplayExecutor {
    engine: Arc<dyn CacheEngine>,
    pages: Arc<dyn PageLookup>,
    deploy_root: PathBuf,
    cache_root: PathBuf,
}

impl ReplayExecutor {
    pub fn new(
        engine: Arc<dyn CacheEngine>,
        pages: Arc<dyn PageLookup>,
        deploy_root: impl Into<PathBuf>,
        cache_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            pages,
            deploy_root: deploy_root.into(),
            cache_root: cache_root.into(),
        }
    }

    /// 설정의 deploy/cache 루트 사용
    pub fn from_config(
        config: &SyncConfig,
        engine: Arc<dyn CacheEngine>,
        pages: Arc<dyn PageLookup>,
    ) -> Self {
        Self::new(engine, pages, &config.deploy_root, &config.cache_root)
    }

    pub async fn apply(&self, event: &ClearEvent) -> Result<ApplyOutcome> {
        match event {
            ClearEvent::ClearAll => {
                self.engine.clear_all().await?;
                Ok(ApplyOutcome::Applied)
            }

            ClearEvent::ClearBehaviors { page_id } => {
                let Some(page) = self.pages.resolve(*page_id).await? else {
                    debug!(page_id, "Page not found, skipping behaviors clear");
                    return Ok(ApplyOutcome::PageNotFound(*page_id));
                };
                self.engine.clear_behaviors_for(&page).await?;
                Ok(ApplyOutcome::Applied)
            }

            ClearEvent::ClearPage { page_id, options } => {
                let Some(page) = self.pages.resolve(*page_id).await? else {
                    debug!(page_id, "Page not found, skipping page clear");
                    return Ok(ApplyOutcome::PageNotFound(*page_id));
                };

                self.engine
                    .clear_page(&page, options.engine_options())
                    .await?;

                for file in &options.files_cleared {
                    remove_under(&self.deploy_root, file, false);
                }
                for dir in &options.paths_cleared {
                    remove_under(&self.cache_root, dir, true);
                }

                Ok(ApplyOutcome::Applied)
            }
        }
    }
}

/// 경로를 root 아래로 제한
///
/// Absolute paths are re-rooted. Any `..` component makes the path invalid.
pub fn resolve_under(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => return None,
        }
    }

    (depth > 0).then_some(resolved)
}

/// `root` 아래의 산출물 삭제
///
/// 이미 없는 경로도 성공으로 본다. root 밖을 가리키면 아무것도 지우지 않고
/// `false` 를 돌려준다.
pub fn remove_under(root: &Path, relative: &str, recursive: bool) -> bool {
    let Some(path) = resolve_under(root, relative) else {
        warn!(path = relative, root = %root.display(), "Refusing artifact path outside root");
        return false;
    };

    let result = if recursive {
        std::fs::remove_dir_all(&path)
    } else {
        std::fs::remove_file(&path)
    };

    match result {
        Ok(()) => debug!(path = %path.display(), "Removed cached artifact"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove cached artifact"),
    }
    true
}
