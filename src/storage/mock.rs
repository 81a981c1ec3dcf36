use super::{AssetBatch, AssetPersister};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct MockAssetPersister {
    files: Arc<Mutex<HashMap<String, String>>>,
    discarded: Arc<Mutex<Vec<String>>>,
    output_folder: String,
    fail_index: Option<usize>,
}

impl MockAssetPersister {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            discarded: Arc::new(Mutex::new(Vec::new())),
            output_folder: "generated-images".to_string(),
            fail_index: None,
        }
    }

    pub fn with_output_folder(mut self, folder: String) -> Self {
        self.output_folder = folder;
        self
    }

    /// Make the download of the asset at `index` fail.
    pub fn with_failure_at(mut self, index: usize) -> Self {
        self.fail_index = Some(index);
        self
    }

    /// Persisted path -> source URL.
    pub fn get_files(&self) -> HashMap<String, String> {
        self.files.lock().unwrap().clone()
    }

    pub fn get_discarded(&self) -> Vec<String> {
        self.discarded.lock().unwrap().clone()
    }
}

impl Default for MockAssetPersister {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetPersister for MockAssetPersister {
    async fn persist(&self, url: &str, index: usize, batch: &AssetBatch) -> Result<String> {
        if self.fail_index == Some(index) {
            return Err(Error::Download(format!("No payload received from {}", url)));
        }

        let path = format!("{}/{}", self.output_folder, batch.file_name(index));
        self.files
            .lock()
            .unwrap()
            .insert(path.clone(), url.to_string());
        Ok(path)
    }

    async fn discard(&self, path: &str) -> Result<()> {
        self.files.lock().unwrap().remove(path);
        self.discarded.lock().unwrap().push(path.to_string());
        Ok(())
    }

    fn output_folder(&self) -> &str {
        &self.output_folder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputFormat;

    #[tokio::test]
    async fn test_mock_persist_and_discard() {
        let persister = MockAssetPersister::new();
        let batch = AssetBatch::with_timestamp(7, OutputFormat::Jpg);

        let path = persister.persist("https://x/a", 0, &batch).await.unwrap();
        assert_eq!(path, "generated-images/generated-image-7-0.jpg");
        assert_eq!(persister.get_files().len(), 1);

        persister.discard(&path).await.unwrap();
        assert!(persister.get_files().is_empty());
        assert_eq!(persister.get_discarded(), vec![path]);
    }

    #[tokio::test]
    async fn test_mock_failure_at_index() {
        let persister = MockAssetPersister::new().with_failure_at(1);
        let batch = AssetBatch::with_timestamp(7, OutputFormat::Jpg);

        assert!(persister.persist("https://x/a", 0, &batch).await.is_ok());
        let err = persister.persist("https://x/b", 1, &batch).await.unwrap_err();
        assert!(matches!(err, Error::Download(_)));
    }
}
