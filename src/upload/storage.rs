use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Object-storage collaborator.
///
/// Abstracts over the concrete backend (filesystem here; an S3/GCS client
/// would sit behind the same trait). Signed URLs are time-limited read
/// links derived from the stored key; they are computed per response and
/// never cached.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Persist `data` under `key`, returning the key.
    async fn store(&self, key: &str, content_type: &str, data: &[u8]) -> anyhow::Result<String>;

    /// Stable (unsigned) URL for the object.
    fn object_url(&self, key: &str) -> String;

    /// Time-limited signed URL for the object.
    fn signed_url(&self, key: &str, ttl_secs: u64) -> String;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Filesystem-backed storage rooted at a configured directory.
pub struct FsObjectStorage {
    root: PathBuf,
    public_base_url: String,
    secret: String,
}

impl FsObjectStorage {
    pub fn new(
        root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            public_base_url,
            secret: secret.into(),
        }
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn store(&self, key: &str, content_type: &str, data: &[u8]) -> anyhow::Result<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        debug!(
            key = %key,
            content_type = %content_type,
            size = data.len(),
            "stored object"
        );
        Ok(key.to_string())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    fn signed_url(&self, key: &str, ttl_secs: u64) -> String {
        let expires = Utc::now().timestamp() + ttl_secs as i64;
        format!(
            "{}/{}?expires={}&sig={}",
            self.public_base_url,
            key,
            expires,
            self.signature(key, expires)
        )
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        fs::remove_file(self.root.join(key)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(root: &std::path::Path) -> FsObjectStorage {
        FsObjectStorage::new(root, "http://files.test/", "secret")
    }

    #[tokio::test]
    async fn store_writes_under_nested_key_and_delete_removes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());

        let key = "42/2025-06-15/photo.jpg";
        let stored = storage.store(key, "image/jpeg", b"jpeg-bytes").await.unwrap();
        assert_eq!(stored, key);

        let on_disk = tokio::fs::read(dir.path().join(key)).await.unwrap();
        assert_eq!(on_disk, b"jpeg-bytes");

        storage.delete(key).await.unwrap();
        assert!(!dir.path().join(key).exists());
    }

    #[tokio::test]
    async fn delete_of_missing_key_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(storage(dir.path()).delete("nope/missing.jpg").await.is_err());
    }

    #[test]
    fn object_url_strips_trailing_slash_from_base() {
        let storage = FsObjectStorage::new("/tmp", "http://files.test/", "secret");
        assert_eq!(storage.object_url("a/b.jpg"), "http://files.test/a/b.jpg");
    }

    #[test]
    fn signed_url_carries_expiry_and_signature() {
        let storage = FsObjectStorage::new("/tmp", "http://files.test", "secret");
        let url = storage.signed_url("a/b.jpg", 3600);
        assert!(url.starts_with("http://files.test/a/b.jpg?expires="));
        assert!(url.contains("&sig="));
    }

    #[test]
    fn signature_depends_on_key_and_expiry() {
        let storage = FsObjectStorage::new("/tmp", "http://files.test", "secret");
        let a = storage.signature("a.jpg", 100);
        assert_eq!(a, storage.signature("a.jpg", 100));
        assert_ne!(a, storage.signature("b.jpg", 100));
        assert_ne!(a, storage.signature("a.jpg", 101));
    }
}
