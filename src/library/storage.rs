//! File-backed library storage
//!
//! All items live in one JSON array under the data directory. Writes go to a
//! temporary file first and are renamed into place.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{merge_item, newest_first, LibraryStore};
use crate::models::LibraryItem;
use crate::types::AppResult;

const LIBRARY_FILE: &str = "library.json";

pub struct FileLibraryStore {
    library_path: PathBuf,
    // Serializes read-modify-write cycles within the process.
    lock: Mutex<()>,
}

impl FileLibraryStore {
    pub fn with_path(base_dir: PathBuf) -> Self {
        Self {
            library_path: base_dir.join(LIBRARY_FILE),
            lock: Mutex::new(()),
        }
    }

    async fn ensure_dir(&self) -> AppResult<()> {
        if let Some(parent) = self.library_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn load_all(&self) -> AppResult<Vec<LibraryItem>> {
        if !fs::try_exists(&self.library_path).await? {
            debug!(path = %self.library_path.display(), "No library file yet");
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.library_path).await?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn save_all(&self, items: &[LibraryItem]) -> AppResult<()> {
        self.ensure_dir().await?;
        let content = serde_json::to_string_pretty(items)?;
        let tmp_path = self.library_path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &self.library_path).await?;
        Ok(())
    }
}

#[async_trait]
impl LibraryStore for FileLibraryStore {
    async fn list(&self, user_id: &str) -> AppResult<Vec<LibraryItem>> {
        let _guard = self.lock.lock().await;
        let items = self
            .load_all()
            .await?
            .into_iter()
            .filter(|item| item.user_id == user_id)
            .collect();
        Ok(newest_first(items))
    }

    async fn upsert(&self, item: LibraryItem) -> AppResult<LibraryItem> {
        let _guard = self.lock.lock().await;
        let mut items = self.load_all().await?;
        let stored = merge_item(&mut items, item);
        self.save_all(&items).await?;
        info!(item_id = %stored.id, user_id = %stored.user_id, "Library item saved");
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let _guard = self.lock.lock().await;
        let mut items = self.load_all().await?;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.save_all(&items).await?;
        info!(item_id = %id, "Library item deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::tests::item;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_library_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileLibraryStore::with_path(temp_dir.path().join("nested"));

        assert!(store.list("u1").await.unwrap().is_empty());

        let first = store.upsert(item("u1", "Q3", "https://x/d/q3/", 5)).await.unwrap();
        store.upsert(item("u1", "Q4", "https://x/d/q4/", 0)).await.unwrap();

        // A fresh handle reads what the first one wrote.
        let reopened = FileLibraryStore::with_path(temp_dir.path().join("nested"));
        let names: Vec<String> = reopened
            .list("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Q4", "Q3"]);

        let again = reopened.upsert(item("u1", "Q3 (renamed)", "https://x/d/q3/", 0)).await.unwrap();
        assert_eq!(again.id, first.id);

        assert!(reopened.delete(&first.id).await.unwrap());
        assert_eq!(reopened.list("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(LIBRARY_FILE), "{not json").unwrap();
        let store = FileLibraryStore::with_path(temp_dir.path().to_path_buf());

        let err = store.list("u1").await.unwrap_err();
        assert!(matches!(err, crate::types::AppError::Storage(_)));
    }
}
