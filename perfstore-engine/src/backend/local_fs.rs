use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::common::{Backend, BackendError, BackendResult};

/// A [`Backend`] storing every key as a file in a single directory.
#[derive(Debug)]
pub struct LocalFsBackend {
    path: PathBuf,
}

impl LocalFsBackend {
    /// Creates a backend rooted at the given directory.
    ///
    /// The directory is created by [`prepare`](Backend::prepare) if it does not exist.
    pub fn new(path: &Path) -> Self {
        Self { path: path.into() }
    }

    fn file_path(&self, key: &str) -> BackendResult<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\', '\0']);

        if !valid {
            return Err(BackendError::InvalidKey { key: key.into() });
        }

        Ok(self.path.join(key))
    }
}

fn not_found(key: &str, err: std::io::Error) -> BackendError {
    match err.kind() {
        ErrorKind::NotFound => BackendError::NotFound { key: key.into() },
        _ => err.into(),
    }
}

#[async_trait::async_trait]
impl Backend for LocalFsBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn prepare(&self) -> BackendResult<()> {
        if !tokio::fs::try_exists(&self.path).await? {
            tracing::info!(path = %self.path.display(), "creating data directory");
        }
        tokio::fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        let path = self.file_path(key)?;
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn list_keys(&self) -> BackendResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        let mut keys = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            // Keys are always created from UTF-8 strings, other files are not ours.
            if let Ok(name) = entry.file_name().into_string() {
                keys.push(name);
            }
        }

        Ok(keys)
    }

    #[tracing::instrument(level = "trace", skip(self, payload))]
    async fn create(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        let path = self.file_path(key)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        file.write_all(&payload).await?;
        file.sync_data().await?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn read(&self, key: &str) -> BackendResult<Bytes> {
        let path = self.file_path(key)?;
        let contents = tokio::fs::read(path)
            .await
            .map_err(|err| not_found(key, err))?;
        Ok(contents.into())
    }

    #[tracing::instrument(level = "trace", skip(self, payload))]
    async fn write(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        let path = self.file_path(key)?;
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|err| not_found(key, err))?;

        file.write_all(&payload).await?;
        file.sync_data().await?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn delete(&self, key: &str) -> BackendResult<()> {
        let path = self.file_path(key)?;
        tokio::fs::remove_file(path)
            .await
            .map_err(|err| not_found(key, err))
    }
}
