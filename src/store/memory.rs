//! In-process document store with optional JSON persistence.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::items::{Item, ItemId};
use crate::store::{ItemStore, StoreError, UniqueIndex};

/// A document collection kept in memory.
///
/// Documents are ordered by id, which gives name searches a stable order.
/// The store can be switched offline to simulate an outage: every call then
/// fails with `StoreError::Unavailable`.
#[derive(Debug)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<ItemId, Item>>,
    available: AtomicBool,
    persistence_path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            persistence_path,
        }
    }

    /// Load documents from `path` if it exists.
    pub fn load_from_file(path: &Path) -> std::io::Result<Self> {
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let docs: Vec<Item> = serde_json::from_reader(reader)?;
            let mut items = store.items.write();
            for doc in docs {
                items.insert(doc.id, doc);
            }
            tracing::info!(path = %path.display(), count = items.len(), "Loaded items from disk");
            drop(items);
        }
        Ok(store)
    }

    /// Write all documents to the persistence path, if one is configured.
    pub fn save_to_file(&self) -> std::io::Result<()> {
        if let Some(path) = &self.persistence_path {
            let docs: Vec<Item> = self.items.read().values().cloned().collect();
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer(writer, &docs)?;
            tracing::info!(path = %path.display(), count = docs.len(), "Saved items to disk");
        }
        Ok(())
    }

    /// Take the store offline or bring it back.
    pub fn set_available(&self, available: bool) {
        let previous = self.available.swap(available, Ordering::SeqCst);
        if previous != available {
            tracing::warn!(available, "Store availability switched");
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("document store is offline".to_string()))
        }
    }
}

fn name_conflict(items: &BTreeMap<ItemId, Item>, name: &str, except: Option<ItemId>) -> bool {
    items
        .values()
        .any(|doc| doc.name == name && Some(doc.id) != except)
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn find(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        self.check_available()?;
        Ok(self.items.read().get(&id).cloned())
    }

    async fn find_by_name(&self, pattern: &str) -> Result<Vec<Item>, StoreError> {
        self.check_available()?;
        let needle = pattern.to_lowercase();
        Ok(self
            .items
            .read()
            .values()
            .filter(|doc| doc.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn insert(&self, item: Item) -> Result<(), StoreError> {
        self.check_available()?;
        let mut items = self.items.write();
        if items.contains_key(&item.id) {
            return Err(StoreError::Conflict {
                index: UniqueIndex::Id,
                value: item.id.to_string(),
            });
        }
        if name_conflict(&items, &item.name, None) {
            return Err(StoreError::Conflict {
                index: UniqueIndex::Name,
                value: item.name,
            });
        }
        items.insert(item.id, item);
        Ok(())
    }

    async fn replace(&self, id: ItemId, item: Item) -> Result<Option<Item>, StoreError> {
        self.check_available()?;
        let mut items = self.items.write();
        if !items.contains_key(&id) {
            return Ok(None);
        }
        if name_conflict(&items, &item.name, Some(id)) {
            return Err(StoreError::Conflict {
                index: UniqueIndex::Name,
                value: item.name,
            });
        }
        Ok(items.insert(id, Item { id, ..item }))
    }

    async fn remove(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        self.check_available()?;
        Ok(self.items.write().remove(&id))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
