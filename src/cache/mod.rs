//! Dependency-tag invalidation cache.
//!
//! - **Entry store**: read-through values keyed by `CacheKey`, with a sliding
//!   expiration window.
//! - **Tag store**: one cancellable invalidation signal per subject. Entries are
//!   bound to the signals of every subject they depend on.
//! - **Aliases**: a change notification names a canonical subject; every binding
//!   category it stands for is invalidated.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! sliding_expiration_seconds = 60
//! sweep_interval_seconds = 300
//! ```

mod aliases;
mod config;
pub mod deps;
mod events;
mod keys;
mod lock;
mod manager;
mod store;
mod tags;

pub use aliases::{AliasResolver, ITEM_CATEGORY, TYPE_CATEGORY, TYPED_ITEM_CATEGORY};
pub use config::CacheConfig;
pub use deps::{Dependencies, DependencyExtractor, NoDependencies};
pub use events::{
    AffectedObject, ChangeNotification, NotificationData, NotificationMessage, ObjectKind,
    Operation,
};
pub use keys::{CacheKey, SubjectKey};
pub use manager::{CacheManager, SweepReport};
pub use store::{EntryStore, MissReason};
pub use tags::{Binding, Epoch, InvalidationSignal, TagStore};

pub(crate) mod metric_names {
    pub(crate) use super::manager::{
        METRIC_CACHE_ENTRIES, METRIC_CACHE_INVALIDATE, METRIC_CACHE_TAGS,
    };
    pub(crate) use super::store::{
        METRIC_CACHE_DISCARDED, METRIC_CACHE_FETCH_MS, METRIC_CACHE_HIT, METRIC_CACHE_MISS,
    };
}
