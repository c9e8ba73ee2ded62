use std::path::PathBuf;

use anyhow::Result;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// On-disk blob storage for uploaded files.
///
/// Each file lives at `{dir}/{storage_id}`. Ids are UUIDs, so a path can never
/// escape the storage directory.
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("File storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn file_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Write a blob and return its SHA-256 hex digest. The blob is written to
    /// a temporary name first so readers never see a partial file.
    pub async fn write(&self, id: Uuid, data: &[u8]) -> Result<String> {
        let digest = hex::encode(Sha256::digest(data));

        let path = self.file_path(id);
        let partial = path.with_extension("part");
        let mut file = fs::File::create(&partial).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&partial, &path).await?;

        Ok(digest)
    }

    pub async fn open(&self, id: Uuid) -> std::io::Result<fs::File> {
        fs::File::open(self.file_path(id)).await
    }

    /// Delete a blob. Deleting a blob that is already gone is not an error.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        match fs::remove_file(self.file_path(id)).await {
            Ok(()) => {
                info!("Deleted stored file {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Stored file {} already gone", id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn write_then_open_returns_same_bytes() {
        let dir = std::env::temp_dir().join(format!("parley-storage-{}", Uuid::new_v4()));
        let storage = Storage::new(dir.clone()).await.unwrap();
        let id = Uuid::new_v4();

        let digest = storage.write(id, b"hello").await.unwrap();
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let mut contents = Vec::new();
        storage.open(id).await.unwrap().read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"hello");

        storage.delete(id).await.unwrap();
        storage.delete(id).await.unwrap();
        assert!(storage.open(id).await.is_err());

        let _ = std::fs::remove_dir_all(dir);
    }
}
