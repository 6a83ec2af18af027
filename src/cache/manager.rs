//! Cache manager.
//!
//! Owns the entry store, the tag store and the alias rules. One instance is
//! built at startup and shared through `Arc` with every consumer.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use metrics::{counter, gauge};
use tracing::{debug, info, instrument};

use super::aliases::AliasResolver;
use super::config::CacheConfig;
use super::deps::DependencyExtractor;
use super::keys::{CacheKey, SubjectKey};
use super::store::EntryStore;
use super::tags::TagStore;

pub(crate) const METRIC_CACHE_INVALIDATE: &str = "delivery_cache_invalidate_total";
pub(crate) const METRIC_CACHE_ENTRIES: &str = "delivery_cache_entries";
pub(crate) const METRIC_CACHE_TAGS: &str = "delivery_cache_tags";

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub entries_removed: usize,
    pub tags_pruned: usize,
    pub entries_remaining: usize,
    pub tags_remaining: usize,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries -{} ({} left), tags -{} ({} left)",
            self.entries_removed, self.entries_remaining, self.tags_pruned, self.tags_remaining
        )
    }
}

pub struct CacheManager {
    config: CacheConfig,
    entries: EntryStore,
    tags: Arc<TagStore>,
    aliases: AliasResolver,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_aliases(config, AliasResolver::default())
    }

    pub fn with_aliases(config: CacheConfig, aliases: AliasResolver) -> Self {
        let tags = Arc::new(TagStore::new());
        let entries = EntryStore::new(Arc::clone(&tags), config.sliding_expiration());
        Self {
            config,
            entries,
            tags,
            aliases,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn aliases(&self) -> &AliasResolver {
        &self.aliases
    }

    pub fn entries(&self) -> &EntryStore {
        &self.entries
    }

    pub fn tags(&self) -> &TagStore {
        &self.tags
    }

    /// Read-through lookup. With the cache disabled the factory always runs.
    pub async fn get_or_create<T, E, F, Fut, X>(
        &self,
        key: &CacheKey,
        factory: F,
        extractor: X,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        X: DependencyExtractor<T>,
    {
        if !self.config.is_enabled() {
            debug!(cache_key = %key, outcome = "bypass", "cache disabled");
            return factory().await;
        }
        self.entries.get_or_create(key, factory, extractor).await
    }

    /// Expire every entry bound to `subject` or any of its aliases.
    ///
    /// Returns the number of live signals that were cancelled.
    #[instrument(skip(self), fields(subject = %subject))]
    pub fn invalidate(&self, subject: &SubjectKey) -> usize {
        if !self.config.is_enabled() {
            return 0;
        }

        let expanded = self.aliases.expand(subject);
        let cancelled = expanded
            .iter()
            .filter(|binding| self.tags.cancel(binding))
            .count();

        counter!(METRIC_CACHE_INVALIDATE).increment(1);
        info!(
            subject = %subject,
            bindings = expanded.len(),
            cancelled,
            "Invalidated subject"
        );
        cancelled
    }

    /// Drop expired entries, then prune cancelled tags no fetch still needs.
    pub fn sweep(&self) -> SweepReport {
        let entries_removed = self.entries.sweep();
        let tags_pruned = self.tags.prune(self.entries.low_water());

        let report = SweepReport {
            entries_removed,
            tags_pruned,
            entries_remaining: self.entries.len(),
            tags_remaining: self.tags.len(),
        };

        gauge!(METRIC_CACHE_ENTRIES).set(report.entries_remaining as f64);
        gauge!(METRIC_CACHE_TAGS).set(report.tags_remaining as f64);
        debug!(report = %report, "Cache sweep finished");
        report
    }

    /// Drop every entry. Tags are kept.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::aliases::{ITEM_CATEGORY, TYPED_ITEM_CATEGORY};
    use crate::cache::deps::Dependencies;

    fn bound_to(subject: SubjectKey) -> impl Fn(&String) -> Dependencies {
        move |_: &String| Dependencies::from([subject.clone()])
    }

    async fn fill(manager: &CacheManager, key: &CacheKey, subject: SubjectKey) {
        manager
            .get_or_create(
                key,
                || async { Ok::<_, Infallible>("cached".to_string()) },
                bound_to(subject),
            )
            .await
            .expect("infallible");
    }

    #[tokio::test]
    async fn invalidate_reaches_aliases() {
        let manager = CacheManager::new(CacheConfig::default());
        let plain = CacheKey::new(["item", "on_roasts"]);
        let typed = CacheKey::new(["typed_item", "article", "on_roasts"]);
        fill(&manager, &plain, SubjectKey::new(ITEM_CATEGORY, "on_roasts")).await;
        fill(
            &manager,
            &typed,
            SubjectKey::new(TYPED_ITEM_CATEGORY, "on_roasts"),
        )
        .await;

        let cancelled = manager.invalidate(&SubjectKey::new(ITEM_CATEGORY, "on_roasts"));

        assert_eq!(cancelled, 2);
        assert_eq!(manager.entries().get::<String>(&plain), None);
        assert_eq!(manager.entries().get::<String>(&typed), None);
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let manager = CacheManager::new(CacheConfig::default());
        let subject = SubjectKey::new(ITEM_CATEGORY, "on_roasts");
        fill(&manager, &CacheKey::new(["item", "on_roasts"]), subject.clone()).await;

        // Only the `item` binding is live; the `typed_item` alias was never bound.
        assert_eq!(manager.invalidate(&subject), 1);
        assert_eq!(manager.invalidate(&subject), 0);
        assert_eq!(manager.invalidate(&SubjectKey::new("item", "unknown")), 0);
    }

    #[tokio::test]
    async fn disabled_cache_always_calls_factory() {
        let manager = CacheManager::new(CacheConfig {
            enabled: false,
            ..Default::default()
        });
        let key = CacheKey::new(["item", "on_roasts"]);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            manager
                .get_or_create(
                    &key,
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, Infallible>(1_u8)
                    },
                    crate::cache::deps::NoDependencies,
                )
                .await
                .expect("infallible");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(manager.entries().is_empty());
        assert_eq!(manager.invalidate(&SubjectKey::new("item", "on_roasts")), 0);
    }

    #[tokio::test]
    async fn sweep_reclaims_entries_and_tags() {
        let manager = CacheManager::new(CacheConfig::default());
        let subject = SubjectKey::new(ITEM_CATEGORY, "on_roasts");
        fill(&manager, &CacheKey::new(["item", "on_roasts"]), subject.clone()).await;
        fill(
            &manager,
            &CacheKey::new(["item", "coffee_beverages"]),
            SubjectKey::new(ITEM_CATEGORY, "coffee_beverages"),
        )
        .await;

        manager.invalidate(&subject);
        let report = manager.sweep();

        assert_eq!(report.entries_removed, 1);
        assert_eq!(report.entries_remaining, 1);
        // item:on_roasts and typed_item:on_roasts
        assert_eq!(report.tags_pruned, 2);
        assert_eq!(report.tags_remaining, 1);
    }
}
