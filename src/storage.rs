use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: Option<String>)
        -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

/// Filesystem-backed driver. Object keys map to paths under the configured
/// root; keys are generated by this service, but traversal components are
/// rejected anyway.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create storage root {}", root.display()))?;
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let traversal = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if traversal || key.is_empty() {
            bail!("invalid object key {key:?}");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: Option<String>,
    ) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create object directory for {key}"))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write object {key}"))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read object {key}"))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("failed to delete object {key}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalStorage, ObjectStorage};

    #[tokio::test]
    async fn objects_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();

        storage
            .put_object("attachments/a/b", b"payload".to_vec(), None)
            .await
            .unwrap();
        assert_eq!(storage.get_object("attachments/a/b").await.unwrap(), b"payload");

        storage.delete_object("attachments/a/b").await.unwrap();
        assert!(storage.get_object("attachments/a/b").await.is_err());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        assert!(storage.get_object("../escape").await.is_err());
    }
}
