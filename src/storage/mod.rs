//! Storage traits and backends for binwatch.
//!
//! The relational store is external; these traits describe what the core
//! needs from it. In-memory backends serve tests and embedded use.

mod codec;
mod memory;
mod optimistic;
mod token_cache;
mod traits;

pub use memory::{
    InMemoryAlertStore, InMemoryLocationStore, InMemoryProfileStore, InMemoryStores,
    InMemoryTokenStore, InMemoryWorkHistoryStore,
};
pub use optimistic::OptimisticAlertStore;
pub use token_cache::{token_store, FileTokenCache};
pub use traits::{
    AlertGuard, AlertStore, ConditionalWrite, LocationStore, ProfileStore, PushTokenStore,
    RowAlertStore, StorageError, WorkHistoryStore,
};
