//! 일반 영속 저장소 (JSON 파일)
//!
//! 파일 포맷: `{ "<key>": "<value>", ... }`
//! 쓰기는 임시 파일에 쓰고 rename 하는 atomic write 입니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::storage::StorageBackend;

const STORE_FILE_NAME: &str = "session-store.json";

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    /// read-modify-write 직렬화
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// app data 디렉토리 기반 기본 경로
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<HashMap<String, String>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.read_all().await?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let (mut entries, corrupt) = match self.read_all().await {
            Ok(entries) => (entries, false),
            // 손상된 파일에서의 삭제는 파일 자체를 비우는 것으로 처리
            Err(StorageError::Serialization(_)) => (HashMap::new(), true),
            Err(e) => return Err(e),
        };
        if entries.remove(key).is_some() || corrupt {
            self.write_all(&entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn set_get_remove() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::in_dir(dir.path());

        assert_eq!(storage.get("auth").await.unwrap(), None);

        storage.set("auth", "{\"a\":1}").await.unwrap();
        storage.set("other", "x").await.unwrap();
        assert_eq!(storage.get("auth").await.unwrap().as_deref(), Some("{\"a\":1}"));

        storage.remove("auth").await.unwrap();
        assert_eq!(storage.get("auth").await.unwrap(), None);
        assert_eq!(storage.get("other").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn corrupt_file_fails_read_but_remove_recovers() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::in_dir(dir.path());
        std::fs::write(storage.path(), b"{not json").unwrap();

        assert!(matches!(
            storage.get("auth").await,
            Err(StorageError::Serialization(_))
        ));

        storage.remove("auth").await.unwrap();
        assert_eq!(storage.get("auth").await.unwrap(), None);
    }

    #[tokio::test]
    async fn creates_missing_parent_directory() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::in_dir(&dir.path().join("nested").join("deeper"));
        storage.set("k", "v").await.unwrap();
        assert!(storage.path().exists());
    }
}
