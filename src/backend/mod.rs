//! Backend service: item operations over the store, fronted by a cache.
//!
//! # Data Flow
//! ```text
//! rpc::server
//!     → service.rs (validation, uniqueness, write lock)
//!     → cache.rs (id and name lookups, write-through)
//!     → store (on cache miss and for every write)
//! ```
//!
//! # Design Decisions
//! - Writes are serialized so a uniqueness check and its write are atomic
//!   with respect to other writes; reads never take the write lock
//! - Every store call carries a deadline
//! - Name search is a lazy stream that re-queries the store on each lap

pub mod cache;
pub mod service;
pub mod stream;

pub use cache::ItemCache;
pub use service::{ItemService, ServiceError};
pub use stream::MatchedItem;
