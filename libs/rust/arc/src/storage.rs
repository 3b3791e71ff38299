use crate::errors::ArcError;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Address of the last connected wallet.
pub const CURRENT_ADDRESS_KEY: &str = "currentAddress";
/// Kind of wallet provider the user picked last time.
pub const SELECTED_PROVIDER_KEY: &str = "selectedProvider";

/// Small persistent key/value file, the command line counterpart of browser
/// local storage.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, ArcError> {
        Ok(self.load().await?.remove(key))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), ArcError> {
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), ArcError> {
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, ArcError> {
        match tokio::fs::read(&self.path).await {
            Ok(body) => Ok(serde_json::from_slice(&body)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), ArcError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(entries)?).await?;
        debug!(path = %self.path.display(), keys = entries.len(), "Local storage saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        LocalStorage::new(&path)
            .set(CURRENT_ADDRESS_KEY, "0xabc")
            .await
            .unwrap();

        let reopened = LocalStorage::new(&path);
        assert_eq!(
            reopened.get(CURRENT_ADDRESS_KEY).await.unwrap(),
            Some("0xabc".to_string())
        );
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("absent.json"));
        assert_eq!(storage.get(CURRENT_ADDRESS_KEY).await.unwrap(), None);
        storage.remove(CURRENT_ADDRESS_KEY).await.unwrap();
    }

    #[tokio::test]
    async fn remove_drops_only_that_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("storage.json"));
        storage.set(CURRENT_ADDRESS_KEY, "0xabc").await.unwrap();
        storage.set(SELECTED_PROVIDER_KEY, "mnemonic").await.unwrap();

        storage.remove(CURRENT_ADDRESS_KEY).await.unwrap();

        assert_eq!(storage.get(CURRENT_ADDRESS_KEY).await.unwrap(), None);
        assert_eq!(
            storage.get(SELECTED_PROVIDER_KEY).await.unwrap(),
            Some("mnemonic".to_string())
        );
    }
}
