use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("object not found")]
    NotFound,
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("invalid storage id format")]
    InvalidStorageId,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlobStoreError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// Content-addressed object store. A blob's storage id is the lowercase hex
/// SHA-256 of its bytes, so identical file contents share one object.
pub struct BlobStore {
    base_path: PathBuf,
}

impl BlobStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("blobs"),
        }
    }

    fn object_path(&self, storage_id: &str) -> PathBuf {
        let prefix1 = &storage_id[0..2];
        let prefix2 = &storage_id[2..4];
        self.base_path
            .join("objects")
            .join(prefix1)
            .join(prefix2)
            .join(storage_id)
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }

    pub async fn exists(&self, storage_id: &str) -> Result<bool, BlobStoreError> {
        validate_storage_id(storage_id)?;
        Ok(self.object_path(storage_id).exists())
    }

    pub async fn size(&self, storage_id: &str) -> Result<i64, BlobStoreError> {
        validate_storage_id(storage_id)?;
        let metadata = fs::metadata(self.object_path(storage_id))
            .await
            .map_err(BlobStoreError::from_io)?;
        Ok(metadata.len() as i64)
    }

    pub async fn get(&self, storage_id: &str) -> Result<Vec<u8>, BlobStoreError> {
        validate_storage_id(storage_id)?;
        fs::read(self.object_path(storage_id))
            .await
            .map_err(BlobStoreError::from_io)
    }

    /// Stores bytes and returns their storage id. Writes go through a temp
    /// file and rename so a crash never leaves a partial object visible.
    pub async fn put(&self, data: &[u8]) -> Result<String, BlobStoreError> {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let storage_id = hex::encode(hasher.finalize());

        let final_path = self.object_path(&storage_id);
        if final_path.exists() {
            return Ok(storage_id);
        }

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(data).await?;
        temp_file.sync_all().await?;

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::rename(&temp_path, &final_path).await?;

        Ok(storage_id)
    }

    /// Stores bytes that must hash to `expected_sha256`.
    pub async fn put_verified(
        &self,
        data: &[u8],
        expected_sha256: &str,
    ) -> Result<String, BlobStoreError> {
        validate_storage_id(expected_sha256)?;

        let mut hasher = Sha256::new();
        hasher.update(data);
        let actual = hex::encode(hasher.finalize());

        if actual != expected_sha256 {
            return Err(BlobStoreError::HashMismatch {
                expected: expected_sha256.to_string(),
                actual,
            });
        }

        self.put(data).await
    }

    pub async fn delete(&self, storage_id: &str) -> Result<bool, BlobStoreError> {
        validate_storage_id(storage_id)?;
        match fs::remove_file(self.object_path(storage_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobStoreError::Io(e)),
        }
    }
}

fn validate_storage_id(storage_id: &str) -> Result<(), BlobStoreError> {
    if storage_id.len() != 64 {
        return Err(BlobStoreError::InvalidStorageId);
    }

    if !storage_id
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase())
    {
        return Err(BlobStoreError::InvalidStorageId);
    }

    Ok(())
}

#[must_use]
pub fn is_valid_storage_id(storage_id: &str) -> bool {
    validate_storage_id(storage_id).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let storage = BlobStore::new(temp_dir.path());

        let data = b"---\nname: demo\n---\nBody";
        let id = storage.put(data).await.unwrap();

        assert!(storage.exists(&id).await.unwrap());
        assert_eq!(storage.size(&id).await.unwrap(), data.len() as i64);
        assert_eq!(storage.get(&id).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = BlobStore::new(temp_dir.path());

        let a = storage.put(b"same bytes").await.unwrap();
        let b = storage.put(b"same bytes").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_put_verified_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let storage = BlobStore::new(temp_dir.path());

        let wrong = "0000000000000000000000000000000000000000000000000000000000000000";
        let result = storage.put_verified(b"123", wrong).await;
        assert!(matches!(result, Err(BlobStoreError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn test_invalid_storage_id() {
        let temp_dir = TempDir::new().unwrap();
        let storage = BlobStore::new(temp_dir.path());

        assert!(matches!(
            storage.exists("invalid").await,
            Err(BlobStoreError::InvalidStorageId)
        ));
    }

    #[tokio::test]
    async fn test_not_found_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = BlobStore::new(temp_dir.path());

        let id = storage.put(b"bytes").await.unwrap();
        assert!(storage.delete(&id).await.unwrap());
        assert!(!storage.exists(&id).await.unwrap());
        assert!(!storage.delete(&id).await.unwrap());
        assert!(matches!(
            storage.get(&id).await,
            Err(BlobStoreError::NotFound)
        ));
    }

    #[test]
    fn test_is_valid_storage_id() {
        assert!(is_valid_storage_id(
            "a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3"
        ));
        assert!(!is_valid_storage_id("short"));
        assert!(!is_valid_storage_id(
            "A665A45920422F9D417E4867EFDC4FB8A04A1F3FFF1FA07E998E86F7F7A27AE3"
        ));
    }
}
