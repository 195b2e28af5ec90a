//! Wrap-around name search.
//!
//! The stream is pull-based: nothing is fetched until the consumer polls,
//! and dropping it cancels any store query in flight. Each lap re-runs the
//! query, so items added or removed between laps are picked up.

use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::backend::service::{ItemService, ServiceError};
use crate::items::{DomainError, Item};

/// One element of the search stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedItem {
    pub item: Item,
    /// 1 for the first pass over the matches, 2 for the second, ...
    pub lap: u64,
}

struct Cursor {
    service: Arc<ItemService>,
    pattern: String,
    batch: Vec<Item>,
    position: usize,
    lap: u64,
    finished: bool,
}

/// Cycle through the matches for `pattern` until the consumer stops.
///
/// Zero matches yield a single `NoMatch` error. A store failure is yielded
/// once; the stream ends after either.
pub fn wrap_around(
    service: Arc<ItemService>,
    pattern: String,
) -> BoxStream<'static, Result<MatchedItem, ServiceError>> {
    let cursor = Cursor {
        service,
        pattern,
        batch: Vec::new(),
        position: 0,
        lap: 0,
        finished: false,
    };

    stream::unfold(cursor, |mut cursor| async move {
        if cursor.finished {
            return None;
        }

        if cursor.position >= cursor.batch.len() {
            match cursor.service.find_matches(&cursor.pattern).await {
                Ok(items) if items.is_empty() => {
                    cursor.finished = true;
                    let err = DomainError::NoMatch(cursor.pattern.clone());
                    return Some((Err(err.into()), cursor));
                }
                Ok(items) => {
                    cursor.batch = items;
                    cursor.position = 0;
                    cursor.lap += 1;
                }
                Err(e) => {
                    cursor.finished = true;
                    return Some((Err(e), cursor));
                }
            }
        }

        let item = cursor.batch[cursor.position].clone();
        cursor.position += 1;
        let lap = cursor.lap;
        Some((Ok(MatchedItem { item, lap }), cursor))
    })
    .boxed()
}
