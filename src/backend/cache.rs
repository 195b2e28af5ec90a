//! Write-through item cache.

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::items::{Item, ItemId};
use crate::observability::metrics;

/// Item snapshots by id, with a secondary name → id index.
///
/// Writers go through [`put`](Self::put) and [`invalidate`](Self::invalidate),
/// each of which advances the write epoch. Readers that fetched from the
/// store use [`fill`](Self::fill) with the epoch they saw before the fetch,
/// so a read racing a write can never put back the old value.
#[derive(Debug, Default)]
pub struct ItemCache {
    by_id: DashMap<ItemId, Item>,
    by_name: DashMap<String, ItemId>,
    epoch: Mutex<u64>,
}

impl ItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ItemId) -> Option<Item> {
        let hit = self.by_id.get(&id).map(|entry| entry.value().clone());
        metrics::record_cache_lookup(hit.is_some());
        hit
    }

    /// Exact-name lookup through the secondary index.
    pub fn get_by_name(&self, name: &str) -> Option<Item> {
        let id = *self.by_name.get(name)?.value();
        self.by_id
            .get(&id)
            .map(|entry| entry.value().clone())
            .filter(|item| item.name == name)
    }

    /// Current write epoch. Take it before reading from the store.
    pub fn write_epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    /// Store a snapshot after a successful write.
    pub fn put(&self, item: Item) {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        self.insert(item);
    }

    /// Drop a snapshot after a delete, or when a write's result is unknown.
    pub fn invalidate(&self, id: ItemId) {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        if let Some((_, old)) = self.by_id.remove(&id) {
            self.by_name.remove_if(&old.name, |_, owner| *owner == id);
        }
    }

    /// Populate from a store read taken at `epoch`. Ignored if any write
    /// happened since. Returns whether the snapshot was stored.
    pub fn fill(&self, item: Item, epoch: u64) -> bool {
        let current = self.epoch.lock();
        if *current != epoch {
            return false;
        }
        self.insert(item);
        true
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn insert(&self, item: Item) {
        let id = item.id;
        let name = item.name.clone();
        if let Some(old) = self.by_id.insert(id, item) {
            if old.name != name {
                self.by_name.remove_if(&old.name, |_, owner| *owner == id);
            }
        }
        self.by_name.insert(name, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_replaces_name_index() {
        let cache = ItemCache::new();
        cache.put(Item::new(1, "old"));
        cache.put(Item::new(1, "new"));

        assert_eq!(cache.get(1).unwrap().name, "new");
        assert!(cache.get_by_name("old").is_none());
        assert_eq!(cache.get_by_name("new").unwrap().id, 1);
    }

    #[test]
    fn test_invalidate_removes_both_indexes() {
        let cache = ItemCache::new();
        cache.put(Item::new(1, "widget"));
        cache.invalidate(1);

        assert!(cache.get(1).is_none());
        assert!(cache.get_by_name("widget").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fill_after_write_is_discarded() {
        let cache = ItemCache::new();
        let seen = cache.write_epoch();

        // A write lands while the reader is at the store.
        cache.put(Item::new(1, "fresh"));
        assert!(!cache.fill(Item::new(1, "stale"), seen));
        assert_eq!(cache.get(1).unwrap().name, "fresh");

        let seen = cache.write_epoch();
        assert!(cache.fill(Item::new(2, "other"), seen));
        assert_eq!(cache.len(), 2);
    }
}
