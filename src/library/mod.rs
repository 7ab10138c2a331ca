//! Workspace Library
//!
//! Remembers which sheets a user imported from a URL so they can be reopened
//! later. The store is a narrow key/value collaborator keyed by user id:
//! - `list(user_id)`: the user's items, newest first
//! - `upsert(item)`: insert, or update name and sync URL of the same user + url
//! - `delete(id)`

pub mod storage;

pub use storage::FileLibraryStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::LibraryItem;
use crate::types::AppResult;

#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn list(&self, user_id: &str) -> AppResult<Vec<LibraryItem>>;

    /// Returns the stored item; its id is the existing one when the user + url
    /// pair was already present.
    async fn upsert(&self, item: LibraryItem) -> AppResult<LibraryItem>;

    /// Returns whether anything was removed.
    async fn delete(&self, id: &str) -> AppResult<bool>;
}

/// Shared upsert rule for every backend.
pub(crate) fn merge_item(items: &mut Vec<LibraryItem>, item: LibraryItem) -> LibraryItem {
    let existing = items.iter_mut().find(|existing| {
        existing.user_id == item.user_id && item.url.is_some() && existing.url == item.url
    });

    match existing {
        Some(existing) => {
            existing.name = item.name;
            if item.sync_url.is_some() {
                existing.sync_url = item.sync_url;
            }
            existing.clone()
        }
        None => {
            items.push(item.clone());
            item
        }
    }
}

pub(crate) fn newest_first(mut items: Vec<LibraryItem>) -> Vec<LibraryItem> {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items
}

/// Process-local store, used when no data directory is wanted.
#[derive(Clone, Default)]
pub struct MemoryLibraryStore {
    items: Arc<RwLock<HashMap<String, Vec<LibraryItem>>>>,
}

#[async_trait]
impl LibraryStore for MemoryLibraryStore {
    async fn list(&self, user_id: &str) -> AppResult<Vec<LibraryItem>> {
        let guard = self.items.read().await;
        Ok(newest_first(guard.get(user_id).cloned().unwrap_or_default()))
    }

    async fn upsert(&self, item: LibraryItem) -> AppResult<LibraryItem> {
        let mut guard = self.items.write().await;
        let items = guard.entry(item.user_id.clone()).or_default();
        Ok(merge_item(items, item))
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let mut guard = self.items.write().await;
        let mut removed = false;
        for items in guard.values_mut() {
            let before = items.len();
            items.retain(|item| item.id != id);
            removed |= items.len() != before;
        }
        Ok(removed)
    }
}
