//! JSON 파일 읽기 (설정, 페이지 매니페스트)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// 한 디렉토리 아래의 JSON 파일을 읽는다
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<config_dir>/pagesync/`
    pub fn global() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("No platform config directory".to_string()))?;
        Ok(Self::new(config_dir.join("pagesync")))
    }

    /// `<root>/.pagesync/`
    pub fn project(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(".pagesync"))
    }

    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("Cannot resolve working directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        Self::read_path(&self.file_path(name))
    }

    /// 파일이 없으면 `None`, 있는데 깨졌으면 에러
    pub fn load_optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.file_path(name);
        if !path.is_file() {
            return Ok(None);
        }
        Self::read_path(&path).map(Some)
    }

    /// `--config <file>` 처럼 디렉토리와 무관한 경로
    pub fn read_path<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: invalid JSON: {}", path.display(), e)))
    }
}
