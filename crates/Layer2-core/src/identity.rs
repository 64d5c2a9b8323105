//! Instance Identity - 인스턴스 고유 ID 관리
//!
//! 최초 실행 시 랜덤 토큰을 생성해 파일에 저장하고, 이후에는 파일에서 읽는다.
//! 자기 자신이 기록한 로그 레코드를 재실행하지 않기 위해 사용.

use pagesync_foundation::{Error, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// 새로 생성하는 토큰 길이
pub const IDENTITY_LENGTH: usize = 40;

/// 인스턴스 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId(String);

impl InstanceId {
    /// 랜덤 ID 생성
    pub fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(IDENTITY_LENGTH)
            .map(char::from)
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owns creation and persistence of the instance identity.
#[derive(Debug)]
pub struct IdentityProvider {
    path: PathBuf,
    cached: OnceLock<InstanceId>,
}

impl IdentityProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 인스턴스 ID 반환
    ///
    /// Reads the identity file on first call and generates a new token when
    /// the file is missing or blank. Later calls return the cached value.
    pub fn get(&self) -> Result<&InstanceId> {
        if let Some(id) = self.cached.get() {
            return Ok(id);
        }

        let id = self.load_or_create()?;
        Ok(self.cached.get_or_init(|| id))
    }

    fn load_or_create(&self) -> Result<InstanceId> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if !content.trim().is_empty() => {
                debug!(path = %self.path.display(), "Loaded instance identity");
                return Ok(InstanceId(content.trim().to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::filesystem(&self.path, e)),
        }

        let id = InstanceId::generate();
        self.persist(&id)?;

        info!(
            path = %self.path.display(),
            instance_id = %id,
            "Generated new instance identity"
        );

        Ok(id)
    }

    fn persist(&self, id: &InstanceId) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
        }
        std::fs::write(&self.path, id.as_str()).map_err(|e| Error::filesystem(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_alphanumeric() {
        let id = InstanceId::generate();
        assert_eq!(id.as_str().len(), IDENTITY_LENGTH);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, InstanceId::generate());
    }

    #[test]
    fn test_created_once_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("instance-id");

        let provider = IdentityProvider::new(&path);
        let first = provider.get().unwrap().clone();
        assert_eq!(provider.get().unwrap(), &first);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first.as_str());

        // 새 프로세스도 같은 ID를 읽음
        let reopened = IdentityProvider::new(&path);
        assert_eq!(reopened.get().unwrap(), &first);
    }

    #[test]
    fn test_blank_file_regenerates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instance-id");
        std::fs::write(&path, "  \n").unwrap();

        let provider = IdentityProvider::new(&path);
        let id = provider.get().unwrap();
        assert_eq!(id.as_str().len(), IDENTITY_LENGTH);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), id.as_str());
    }

    #[test]
    fn test_existing_value_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instance-id");
        std::fs::write(&path, "operator-assigned-id\n").unwrap();

        let provider = IdentityProvider::new(&path);
        assert_eq!(provider.get().unwrap().as_str(), "operator-assigned-id");
    }

    #[test]
    fn test_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        // 부모 경로가 파일이라 디렉토리 생성 불가
        let provider = IdentityProvider::new(blocker.join("instance-id"));
        assert!(matches!(
            provider.get(),
            Err(Error::FilesystemUnavailable { .. })
        ));
    }
}
