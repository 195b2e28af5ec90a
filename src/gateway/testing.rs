//! In-process `ItemBackend` for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use crate::gateway::backend::{BackendHealth, CallError, ItemBackend};
use crate::items::{DomainError, Item, ItemChange, ItemId};

pub struct FakeBackend {
    items: Mutex<BTreeMap<ItemId, Item>>,
    calls: AtomicU32,
    failures_left: AtomicU32,
    lost_replies: AtomicU32,
    store_available: AtomicBool,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            calls: AtomicU32::new(0),
            failures_left: AtomicU32::new(0),
            lost_replies: AtomicU32::new(0),
            store_available: AtomicBool::new(true),
        }
    }
}

impl FakeBackend {
    pub fn put(&self, item: Item) {
        self.items.lock().insert(item.id, item);
    }

    /// Make the next `n` item calls fail as if the backend were unreachable.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Apply the next `n` writes but answer them with a timeout.
    pub fn lose_next_replies(&self, n: u32) {
        self.lost_replies.store(n, Ordering::SeqCst);
    }

    pub fn set_store_available(&self, available: bool) {
        self.store_available.store(available, Ordering::SeqCst);
    }

    /// Item calls received, failed ones included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(CallError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }

    fn reply<T>(&self, value: T) -> Result<T, CallError> {
        let lost = self
            .lost_replies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            Err(CallError::Timeout(Duration::from_secs(2)))
        } else {
            Ok(value)
        }
    }

    fn name_taken(items: &BTreeMap<ItemId, Item>, name: &str, except: Option<ItemId>) -> bool {
        items
            .values()
            .any(|item| item.name == name && Some(item.id) != except)
    }
}

#[async_trait]
impl ItemBackend for FakeBackend {
    async fn add_item(&self, item: &Item) -> Result<Item, CallError> {
        self.enter()?;
        let mut items = self.items.lock();
        if items.contains_key(&item.id) {
            return Err(DomainError::DuplicateId(item.id).into());
        }
        if Self::name_taken(&items, &item.name, None) {
            return Err(DomainError::DuplicateName(item.name.clone()).into());
        }
        items.insert(item.id, item.clone());
        drop(items);
        self.reply(item.clone())
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, CallError> {
        self.enter()?;
        self.items
            .lock()
            .get(&id)
            .cloned()
            .ok_or(CallError::Domain(DomainError::NotFound(id)))
    }

    async fn find_by_name(&self, name: &str, limit: Option<usize>) -> Result<Vec<Item>, CallError> {
        self.enter()?;
        let needle = name.to_lowercase();
        let matches: Vec<Item> = self
            .items
            .lock()
            .values()
            .filter(|item| item.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        if matches.is_empty() {
            return Err(DomainError::NoMatch(name.to_string()).into());
        }
        let count = limit.unwrap_or(matches.len());
        Ok(matches.iter().cycle().take(count).cloned().collect())
    }

    async fn update_item(&self, id: ItemId, name: &str) -> Result<ItemChange, CallError> {
        self.enter()?;
        let mut items = self.items.lock();
        let Some(old_item) = items.get(&id).cloned() else {
            return Err(DomainError::NotFound(id).into());
        };
        if Self::name_taken(&items, name, Some(id)) {
            return Err(DomainError::DuplicateName(name.to_string()).into());
        }
        let new_item = Item::new(id, name);
        items.insert(id, new_item.clone());
        drop(items);
        self.reply(ItemChange { old_item, new_item })
    }

    async fn delete_item(&self, id: ItemId) -> Result<Item, CallError> {
        self.enter()?;
        let removed = self.items.lock().remove(&id);
        match removed {
            Some(item) => self.reply(item),
            None => Err(DomainError::NotFound(id).into()),
        }
    }

    async fn ping(&self) -> Result<BackendHealth, CallError> {
        Ok(BackendHealth {
            store_available: self.store_available.load(Ordering::SeqCst),
        })
    }
}
