//! Entry store.
//!
//! Read-through storage keyed by `CacheKey`. Each entry is bound to the
//! invalidation signals of the subjects it depends on and expires when any of
//! them is cancelled or when its sliding window elapses without a hit. Expiry is
//! detected on lookup; `sweep` only reclaims memory.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::debug;

use super::deps::{Dependencies, DependencyExtractor};
use super::keys::{CacheKey, SubjectKey};
use super::lock::mutex_lock;
use super::tags::{Epoch, InvalidationSignal, TagStore};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "delivery_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "delivery_cache_miss_total";
pub(crate) const METRIC_CACHE_DISCARDED: &str = "delivery_cache_discarded_total";
pub(crate) const METRIC_CACHE_FETCH_MS: &str = "delivery_cache_fetch_ms";

/// Why a lookup did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// Nothing stored under the key.
    Absent,
    /// The sliding window elapsed.
    Idle,
    /// A bound signal was cancelled.
    Invalidated,
    /// The stored value has a different type than requested.
    TypeMismatch,
}

impl MissReason {
    pub fn as_str(self) -> &'static str {
        match self {
            MissReason::Absent => "absent",
            MissReason::Idle => "idle",
            MissReason::Invalidated => "invalidated",
            MissReason::TypeMismatch => "type_mismatch",
        }
    }
}

enum Lookup<T> {
    Hit(T),
    Miss(MissReason),
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    signals: Vec<InvalidationSignal>,
    subjects: Dependencies,
    sliding: Duration,
    /// Nanoseconds since the store origin.
    last_access: AtomicU64,
}

impl CacheEntry {
    fn expiry(&self, now: u64) -> Option<MissReason> {
        if self.signals.iter().any(InvalidationSignal::is_cancelled) {
            return Some(MissReason::Invalidated);
        }
        let idle = now.saturating_sub(self.last_access.load(Ordering::Acquire));
        if idle >= duration_nanos(self.sliding) {
            return Some(MissReason::Idle);
        }
        None
    }

    fn touch(&self, now: u64) {
        self.last_access.fetch_max(now, Ordering::AcqRel);
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Tracks the watermarks of fetches currently in flight.
///
/// The lowest one bounds which cancelled tags may be pruned: a fetch that
/// started at watermark `w` must still see every invalidation newer than `w`
/// when it binds.
#[derive(Clone, Default)]
struct InFlightFetches {
    watermarks: Arc<Mutex<BTreeMap<Epoch, usize>>>,
}

impl InFlightFetches {
    fn begin(&self, tags: &TagStore) -> FetchGuard {
        let mut watermarks = mutex_lock(&self.watermarks, SOURCE, "in_flight.begin");
        let watermark = tags.watermark();
        *watermarks.entry(watermark).or_insert(0) += 1;
        FetchGuard {
            watermark,
            watermarks: Arc::clone(&self.watermarks),
        }
    }

    /// Lowest watermark any in-flight fetch still depends on.
    fn low_water(&self, tags: &TagStore) -> Epoch {
        let watermarks = mutex_lock(&self.watermarks, SOURCE, "in_flight.low_water");
        watermarks
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| tags.watermark())
    }

    fn len(&self) -> usize {
        mutex_lock(&self.watermarks, SOURCE, "in_flight.len")
            .values()
            .sum()
    }
}

struct FetchGuard {
    watermark: Epoch,
    watermarks: Arc<Mutex<BTreeMap<Epoch, usize>>>,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        let mut watermarks = mutex_lock(&self.watermarks, SOURCE, "in_flight.end");
        if let Some(count) = watermarks.get_mut(&self.watermark) {
            *count -= 1;
            if *count == 0 {
                watermarks.remove(&self.watermark);
            }
        }
    }
}

/// Read-through cache with dependency-bound expiry.
pub struct EntryStore {
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
    tags: Arc<TagStore>,
    in_flight: InFlightFetches,
    sliding: Duration,
    origin: Instant,
}

impl EntryStore {
    pub fn new(tags: Arc<TagStore>, sliding: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            tags,
            in_flight: InFlightFetches::default(),
            sliding,
            origin: Instant::now(),
        }
    }

    fn now(&self) -> u64 {
        duration_nanos(Instant::now().saturating_duration_since(self.origin))
    }

    /// Return the cached value for `key`, or compute, bind and store it.
    ///
    /// `factory` runs without any store lock held. Its error is returned
    /// unchanged and nothing is stored. If a dependency of the computed value is
    /// invalidated while the factory runs, the value is returned but not cached.
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
        match self.lookup::<T>(key) {
            Lookup::Hit(value) => {
                debug!(cache_key = %key, outcome = "hit", "serving cached value");
                counter!(METRIC_CACHE_HIT).increment(1);
                return Ok(value);
            }
            Lookup::Miss(reason) => {
                debug!(
                    cache_key = %key,
                    outcome = "miss",
                    reason = reason.as_str(),
                    "cache miss, invoking factory"
                );
                counter!(METRIC_CACHE_MISS, "reason" => reason.as_str()).increment(1);
            }
        }

        let fetch = self.in_flight.begin(&self.tags);
        let started_at = std::time::Instant::now();
        let value = factory().await?;
        histogram!(METRIC_CACHE_FETCH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        let dependencies = extractor.dependencies(&value);
        self.insert(key, value.clone(), dependencies, fetch.watermark);
        drop(fetch);

        Ok(value)
    }

    /// Look up `key` without computing anything on a miss.
    pub fn get<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.lookup(key) {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss(_) => None,
        }
    }

    fn lookup<T>(&self, key: &CacheKey) -> Lookup<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let Some(entry) = self.entries.get(key).map(|entry| Arc::clone(entry.value())) else {
            return Lookup::Miss(MissReason::Absent);
        };

        let now = self.now();
        if let Some(reason) = entry.expiry(now) {
            self.entries
                .remove_if(key, |_, current| Arc::ptr_eq(current, &entry));
            return Lookup::Miss(reason);
        }

        match entry.value.as_ref().downcast_ref::<T>() {
            Some(value) => {
                entry.touch(now);
                Lookup::Hit(value.clone())
            }
            None => Lookup::Miss(MissReason::TypeMismatch),
        }
    }

    /// Bind `dependencies` and store the value. Returns false if the value was
    /// discarded because a dependency was invalidated after `since`.
    fn insert<T>(&self, key: &CacheKey, value: T, dependencies: Dependencies, since: Epoch) -> bool
    where
        T: Send + Sync + 'static,
    {
        let mut signals = Vec::with_capacity(dependencies.len());
        let mut invalidated: Vec<&SubjectKey> = Vec::new();

        for subject in &dependencies {
            let binding = self.tags.bind(subject, since);
            if binding.invalidated_since {
                invalidated.push(subject);
            }
            signals.push(binding.signal);
        }

        if !invalidated.is_empty() {
            debug!(
                cache_key = %key,
                invalidated = ?invalidated,
                "dependency invalidated during fetch, value not cached"
            );
            counter!(METRIC_CACHE_DISCARDED).increment(1);
            return false;
        }

        let entry = CacheEntry {
            value: Arc::new(value),
            signals,
            subjects: dependencies,
            sliding: self.sliding,
            last_access: AtomicU64::new(self.now()),
        };
        self.entries.insert(key.clone(), Arc::new(entry));
        true
    }

    /// Subjects the live entry under `key` is bound to.
    pub fn dependencies(&self, key: &CacheKey) -> Option<BTreeSet<SubjectKey>> {
        self.entries
            .get(key)
            .map(|entry| entry.value().subjects.clone())
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = self.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expiry(now).is_none());
        before.saturating_sub(self.entries.len())
    }

    /// Lowest invalidation watermark still needed by an in-flight fetch.
    pub fn low_water(&self) -> Epoch {
        self.in_flight.low_water(&self.tags)
    }

    /// Number of factory calls currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn tags(&self) -> &Arc<TagStore> {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::cache::deps::{NoDependencies, subjects_in};

    fn store() -> EntryStore {
        EntryStore::new(Arc::new(TagStore::new()), Duration::from_secs(60))
    }

    fn item(name: &str) -> SubjectKey {
        SubjectKey::new("item", name)
    }

    fn depends_on(names: &'static [&'static str]) -> impl Fn(&String) -> Dependencies {
        move |_: &String| subjects_in("item", names.iter().copied())
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let store = store();
        let key = CacheKey::new(["item", "on_roasts"]);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = store
                .get_or_create(
                    &key,
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, Infallible>("roasts".to_string())
                    },
                    depends_on(&["on_roasts"]),
                )
                .await
                .expect("factory is infallible");
            assert_eq!(value, "roasts");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.dependencies(&key),
            Some(BTreeSet::from([item("on_roasts")]))
        );
    }

    #[tokio::test]
    async fn factory_error_creates_no_entry() {
        let store = store();
        let key = CacheKey::new(["item", "broken"]);

        let result = store
            .get_or_create(
                &key,
                || async { Err::<String, _>("upstream unavailable") },
                NoDependencies,
            )
            .await;

        assert_eq!(result, Err("upstream unavailable"));
        assert!(store.is_empty());
        assert_eq!(store.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancelled_signal_expires_entry() {
        let store = store();
        let key = CacheKey::new(["item", "on_roasts"]);
        store
            .get_or_create(
                &key,
                || async { Ok::<_, Infallible>("v1".to_string()) },
                depends_on(&["on_roasts"]),
            )
            .await
            .expect("infallible");

        store.tags().cancel(&item("on_roasts"));

        assert_eq!(store.get::<String>(&key), None);
        assert!(store.is_empty(), "expired entry is dropped on lookup");
    }

    #[tokio::test]
    async fn type_mismatch_is_a_miss() {
        let store = store();
        let key = CacheKey::new(["shared"]);
        store
            .get_or_create(
                &key,
                || async { Ok::<_, Infallible>(7_u32) },
                NoDependencies,
            )
            .await
            .expect("infallible");

        assert_eq!(store.get::<String>(&key), None);
        assert_eq!(store.get::<u32>(&key), Some(7));
    }

    #[tokio::test]
    async fn invalidation_during_fetch_is_not_cached() {
        let store = store();
        let key = CacheKey::new(["item", "racy"]);
        let tags = Arc::clone(store.tags());

        let value = store
            .get_or_create(
                &key,
                || async move {
                    tags.cancel(&SubjectKey::new("item", "racy"));
                    Ok::<_, Infallible>("stale".to_string())
                },
                depends_on(&["racy"]),
            )
            .await
            .expect("infallible");

        assert_eq!(value, "stale");
        assert_eq!(store.get::<String>(&key), None);
        assert!(
            !store.tags().signal_for(&item("racy")).is_cancelled(),
            "a fresh signal is minted for later binds"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_window_resets_on_hit() {
        let store = store();
        let key = CacheKey::new(["item", "slide"]);
        store
            .get_or_create(
                &key,
                || async { Ok::<_, Infallible>(1_u8) },
                NoDependencies,
            )
            .await
            .expect("infallible");

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(store.get::<u8>(&key), Some(1));

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(store.get::<u8>(&key), Some(1), "hit at 45s reset the window");

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get::<u8>(&key), None);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_expired_entries() {
        let store = store();
        for name in ["a", "b", "c"] {
            store
                .get_or_create(
                    &CacheKey::new(["item", name]),
                    || async { Ok::<_, Infallible>(name.to_string()) },
                    move |_: &String| BTreeSet::from([item(name)]),
                )
                .await
                .expect("infallible");
        }

        store.tags().cancel(&item("a"));
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.sweep(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn low_water_tracks_in_flight_fetches() {
        let store = Arc::new(store());
        let tags = Arc::clone(store.tags());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let pending = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .get_or_create(
                        &CacheKey::new(["item", "slow"]),
                        || async move {
                            let _ = started_tx.send(());
                            let _ = release_rx.await;
                            Ok::<_, Infallible>(0_u8)
                        },
                        NoDependencies,
                    )
                    .await
            })
        };

        started_rx.await.expect("fetch should start");
        let start_watermark = tags.watermark();
        tags.cancel(&item("elsewhere"));

        assert_eq!(store.in_flight(), 1);
        assert_eq!(store.low_water(), start_watermark);

        release_tx.send(()).expect("fetch should be waiting");
        pending
            .await
            .expect("task should not panic")
            .expect("infallible");

        assert_eq!(store.in_flight(), 0);
        assert_eq!(store.low_water(), tags.watermark());
    }
}
