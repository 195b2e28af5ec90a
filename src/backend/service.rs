//! Item operations over the store and cache.

use futures_util::stream::BoxStream;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::backend::cache::ItemCache;
use crate::backend::stream::{self, MatchedItem};
use crate::items::types::{validate_id, validate_name};
use crate::items::{DomainError, Item, ItemChange, ItemId};
use crate::observability::metrics;
use crate::resilience::with_timeout;
use crate::store::{ItemStore, StoreError, UniqueIndex};

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                index: UniqueIndex::Id,
                value,
            } => match value.parse() {
                Ok(id) => ServiceError::Domain(DomainError::DuplicateId(id)),
                Err(_) => ServiceError::Domain(DomainError::InvalidRequest(value)),
            },
            StoreError::Conflict {
                index: UniqueIndex::Name,
                value,
            } => ServiceError::Domain(DomainError::DuplicateName(value)),
            other => ServiceError::Store(other),
        }
    }
}

pub struct ItemService {
    store: Arc<dyn ItemStore>,
    cache: ItemCache,
    /// Serializes uniqueness checks with the write that follows them.
    writes: Mutex<()>,
    store_timeout: Duration,
}

impl ItemService {
    pub fn new(store: Arc<dyn ItemStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            cache: ItemCache::new(),
            writes: Mutex::new(()),
            store_timeout,
        }
    }

    pub fn cache(&self) -> &ItemCache {
        &self.cache
    }

    pub async fn add_item(&self, item: Item) -> Result<Item, ServiceError> {
        item.validate()?;
        let _guard = self.writes.lock().await;

        if self.lookup(item.id).await?.is_some() {
            return Err(DomainError::DuplicateId(item.id).into());
        }
        if self.name_owner(&item.name).await?.is_some() {
            return Err(DomainError::DuplicateName(item.name).into());
        }

        self.store_call("insert", self.store.insert(item.clone()))
            .await?;
        self.cache.put(item.clone());
        tracing::debug!(id = item.id, "Item added");
        Ok(item)
    }

    pub async fn get_item(&self, id: ItemId) -> Result<Item, ServiceError> {
        validate_id(id)?;
        self.lookup(id)
            .await?
            .ok_or(ServiceError::Domain(DomainError::NotFound(id)))
    }

    /// Endless wrap-around stream of items whose name contains `name`.
    pub fn search(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<BoxStream<'static, Result<MatchedItem, ServiceError>>, ServiceError> {
        validate_name(name)?;
        Ok(stream::wrap_around(self.clone(), name.to_string()))
    }

    pub async fn update_item(&self, id: ItemId, name: &str) -> Result<ItemChange, ServiceError> {
        validate_id(id)?;
        validate_name(name)?;
        let _guard = self.writes.lock().await;

        let Some(current) = self.lookup(id).await? else {
            return Err(DomainError::NotFound(id).into());
        };
        if let Some(owner) = self.name_owner(name).await? {
            if owner.id != id {
                return Err(DomainError::DuplicateName(name.to_string()).into());
            }
        }

        let new_item = Item::new(id, name);
        let previous = match self
            .store_call("replace", self.store.replace(id, new_item.clone()))
            .await
        {
            Ok(previous) => previous,
            Err(e) => {
                self.cache.invalidate(id);
                return Err(e.into());
            }
        };
        let Some(old_item) = previous else {
            self.cache.invalidate(id);
            return Err(DomainError::NotFound(id).into());
        };

        self.cache.put(new_item.clone());
        tracing::debug!(id, old = %current.name, new = %new_item.name, "Item renamed");
        Ok(ItemChange { old_item, new_item })
    }

    pub async fn delete_item(&self, id: ItemId) -> Result<Item, ServiceError> {
        validate_id(id)?;
        let _guard = self.writes.lock().await;

        if self.lookup(id).await?.is_none() {
            return Err(DomainError::NotFound(id).into());
        }

        let removed = self.store_call("remove", self.store.remove(id)).await;
        self.cache.invalidate(id);
        match removed? {
            Some(item) => {
                tracing::debug!(id, "Item deleted");
                Ok(item)
            }
            None => Err(DomainError::NotFound(id).into()),
        }
    }

    pub async fn ping_store(&self) -> Result<(), ServiceError> {
        self.store_call("ping", self.store.ping()).await?;
        Ok(())
    }

    /// One lap's worth of matches, in id order, fresh from the store.
    pub(crate) async fn find_matches(&self, pattern: &str) -> Result<Vec<Item>, ServiceError> {
        let epoch = self.cache.write_epoch();
        let items = self
            .store_call("find_by_name", self.store.find_by_name(pattern))
            .await?;
        for item in &items {
            self.cache.fill(item.clone(), epoch);
        }
        Ok(items)
    }

    async fn lookup(&self, id: ItemId) -> Result<Option<Item>, ServiceError> {
        if let Some(item) = self.cache.get(id) {
            return Ok(Some(item));
        }
        let epoch = self.cache.write_epoch();
        let found = self.store_call("find", self.store.find(id)).await?;
        if let Some(item) = &found {
            self.cache.fill(item.clone(), epoch);
        }
        Ok(found)
    }

    /// The item holding exactly `name`, if any.
    async fn name_owner(&self, name: &str) -> Result<Option<Item>, ServiceError> {
        if let Some(item) = self.cache.get_by_name(name) {
            return Ok(Some(item));
        }
        let candidates = self
            .store_call("find_by_name", self.store.find_by_name(name))
            .await?;
        Ok(candidates.into_iter().find(|item| item.name == name))
    }

    async fn store_call<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match with_timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(elapsed) => Err(StoreError::Timeout(elapsed.0)),
        };
        if let Err(e) = &result {
            tracing::warn!(operation, error = %e, "Store call failed");
            metrics::record_store_error(operation);
        }
        result
    }
}
