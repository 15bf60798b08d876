//! Filesystem backend: folders are directories under a base path.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

use crate::{safe_component, Storage, StorageError, StoredFile};

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn upload(
        &self,
        data: Bytes,
        filename: &str,
        _content_type: Option<&str>,
        folder_id: &str,
    ) -> Result<String, StorageError> {
        let folder = safe_component(folder_id)?;
        let name = safe_component(filename)?;

        let dir = self.base_path.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(name), &data).await?;

        tracing::debug!("Stored {} bytes at {}/{}", data.len(), folder, name);
        Ok(format!("{}/{}", folder, name))
    }

    async fn list(&self, folder_id: &str) -> Result<Vec<StoredFile>, StorageError> {
        let folder = safe_component(folder_id)?;
        let path = self.base_path.join(folder);

        let mut files = Vec::new();
        if !path.exists() {
            return Ok(files);
        }

        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            files.push(StoredFile {
                id: format!("{}/{}", folder, name),
                name,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn health_check(&self) -> Result<u64, StorageError> {
        let start = std::time::Instant::now();
        if self.base_path.is_dir() {
            Ok(start.elapsed().as_millis() as u64)
        } else {
            Err(StorageError::NotConfigured(format!(
                "local storage path {} does not exist or is not a directory",
                self.base_path.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_then_list_folder() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();

        let id = storage
            .upload(Bytes::from_static(b"jpeg"), "20250314_0915_0001_ref.jpg", Some("image/jpeg"), "references")
            .await
            .unwrap();
        assert_eq!(id, "references/20250314_0915_0001_ref.jpg");

        let files = storage.list("references").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "20250314_0915_0001_ref.jpg");
        assert_eq!(files[0].id, id);
        assert!(storage.share_link(&id).is_none());
    }

    #[tokio::test]
    async fn test_list_missing_folder_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        assert!(storage.list("nothing-here").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        let err = storage
            .upload(Bytes::from_static(b"x"), "../escape.txt", None, "references")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidName(_)));
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        assert!(storage.health_check().await.is_ok());
    }
}
