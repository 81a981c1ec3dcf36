use super::{write_atomic_async, AssetBatch, AssetPersister};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Writes downloaded assets into a folder of the vault on disk.
pub struct VaultStorage {
    client: Client,
    vault_root: PathBuf,
    output_folder: String,
}

impl VaultStorage {
    pub fn new(vault_root: PathBuf, output_folder: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self::new_with_client(vault_root, output_folder, client)
    }

    pub fn new_with_client(vault_root: PathBuf, output_folder: &str, client: Client) -> Self {
        Self {
            client,
            vault_root,
            output_folder: normalize_folder(output_folder),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.vault_root.join(&self.output_folder)
    }

    /// Create the output folder (and parents) if it does not exist yet.
    pub fn ensure_output_folder(&self) -> Result<PathBuf> {
        let dir = self.output_dir();
        let folder_error = |reason: String| Error::FolderCreation {
            path: dir.display().to_string(),
            reason,
        };

        if dir.exists() {
            if !dir.is_dir() {
                return Err(folder_error("path exists and is not a directory".to_string()));
            }
            return Ok(dir);
        }

        std::fs::create_dir_all(&dir).map_err(|e| folder_error(e.to_string()))?;
        info!("Created output folder: {}", dir.display());
        Ok(dir)
    }

    fn relative_path(&self, file_name: &str) -> String {
        if self.output_folder.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.output_folder, file_name)
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Download(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Download(format!(
                "Fetching {} returned status {}",
                url, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Download(format!("Failed to read {}: {}", url, e)))?;
        if bytes.is_empty() {
            return Err(Error::Download(format!("No payload received from {}", url)));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AssetPersister for VaultStorage {
    async fn persist(&self, url: &str, index: usize, batch: &AssetBatch) -> Result<String> {
        let bytes = self.fetch(url).await?;

        let relative = self.relative_path(&batch.file_name(index));
        let target = self.vault_root.join(&relative);
        let size = bytes.len();
        write_atomic_async(target.clone(), bytes).await?;

        debug!("Saved {} bytes from {} to {}", size, url, target.display());
        Ok(relative)
    }

    async fn discard(&self, path: &str) -> Result<()> {
        tokio::fs::remove_file(self.vault_root.join(path)).await?;
        debug!("Removed {}", path);
        Ok(())
    }

    fn output_folder(&self) -> &str {
        &self.output_folder
    }
}

/// Vault-style path: forward slashes, no leading/trailing or empty segments.
pub fn normalize_folder(folder: &str) -> String {
    folder
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}
