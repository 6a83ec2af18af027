//! Tag store.
//!
//! Holds one cancellable invalidation signal per subject. Signals are created
//! lazily, cancelled by subject, and replaced (never revived) once cancelled.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::keys::SubjectKey;

/// Monotonic counter used for signal epochs and invalidation sequence numbers.
pub type Epoch = u64;

/// Cancellable token representing "subject has changed since this was minted".
///
/// Clones share state. Cancellation is terminal.
#[derive(Clone)]
pub struct InvalidationSignal {
    inner: Arc<SignalState>,
}

struct SignalState {
    subject: SubjectKey,
    epoch: Epoch,
    cancelled: AtomicBool,
}

impl InvalidationSignal {
    fn new(subject: SubjectKey, epoch: Epoch) -> Self {
        Self {
            inner: Arc::new(SignalState {
                subject,
                epoch,
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn subject(&self) -> &SubjectKey {
        &self.inner.subject
    }

    /// Epoch in which this signal was minted.
    pub fn epoch(&self) -> Epoch {
        self.inner.epoch
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Trip the signal. Returns true if this call performed the transition.
    fn cancel(&self) -> bool {
        !self.inner.cancelled.swap(true, Ordering::AcqRel)
    }

    /// True if both handles refer to the same signal instance.
    pub fn same_as(&self, other: &InvalidationSignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for InvalidationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationSignal")
            .field("subject", &self.inner.subject)
            .field("epoch", &self.inner.epoch)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Result of binding a dependency to its current signal.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Live signal the entry should be bound to.
    pub signal: InvalidationSignal,
    /// The subject was invalidated after the watermark the caller supplied.
    pub invalidated_since: bool,
}

struct TagSlot {
    signal: InvalidationSignal,
    /// Sequence number of the most recent invalidation, 0 if never.
    last_invalidated: Epoch,
}

/// Maps subjects to their current invalidation signal.
pub struct TagStore {
    slots: DashMap<SubjectKey, TagSlot>,
    epochs: AtomicU64,
    sequence: AtomicU64,
}

impl TagStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            epochs: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    fn mint(&self, subject: &SubjectKey) -> InvalidationSignal {
        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        InvalidationSignal::new(subject.clone(), epoch)
    }

    /// Current invalidation sequence number.
    ///
    /// Take this before computing a value; pass it to [`TagStore::bind`] afterwards.
    pub fn watermark(&self) -> Epoch {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Return the live signal for `subject`, minting one if absent or cancelled.
    pub fn signal_for(&self, subject: &SubjectKey) -> InvalidationSignal {
        self.bind(subject, Epoch::MAX).signal
    }

    /// Get-or-replace-if-dead, also reporting whether `subject` was invalidated
    /// after `since`.
    ///
    /// The lookup, the replacement and the watermark comparison happen under
    /// the same shard lock, so a concurrent `cancel` is either fully before or
    /// fully after this call.
    pub fn bind(&self, subject: &SubjectKey, since: Epoch) -> Binding {
        match self.slots.entry(subject.clone()) {
            Entry::Occupied(mut occupied) => {
                let invalidated_since = occupied.get().last_invalidated > since;
                if occupied.get().signal.is_cancelled() {
                    let fresh = self.mint(subject);
                    debug!(
                        subject = %subject,
                        epoch = fresh.epoch(),
                        "replacing cancelled signal"
                    );
                    occupied.get_mut().signal = fresh;
                }
                Binding {
                    signal: occupied.get().signal.clone(),
                    invalidated_since,
                }
            }
            Entry::Vacant(vacant) => {
                let fresh = self.mint(subject);
                vacant.insert(TagSlot {
                    signal: fresh.clone(),
                    last_invalidated: 0,
                });
                Binding {
                    signal: fresh,
                    invalidated_since: false,
                }
            }
        }
    }

    /// Cancel the live signal for `subject`.
    ///
    /// Returns true if a live signal transitioned to cancelled. When nothing is
    /// bound yet, the invalidation is still recorded so fetches already in
    /// flight can detect it; no cached entry is affected.
    pub fn cancel(&self, subject: &SubjectKey) -> bool {
        let mut slot = self
            .slots
            .entry(subject.clone())
            .or_insert_with(|| TagSlot {
                signal: self.placeholder(subject),
                last_invalidated: 0,
            });

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        slot.last_invalidated = sequence;
        slot.signal.cancel()
    }

    fn placeholder(&self, subject: &SubjectKey) -> InvalidationSignal {
        let signal = self.mint(subject);
        signal.cancel();
        signal
    }

    /// Drop slots whose signal is cancelled and whose last invalidation is at
    /// or below `low_water`. Returns the number of slots removed.
    ///
    /// Entries still bound to a dropped signal keep their handle and stay expired.
    pub fn prune(&self, low_water: Epoch) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| !(slot.signal.is_cancelled() && slot.last_invalidated <= low_water));
        before.saturating_sub(self.slots.len())
    }

    /// Number of tracked subjects.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for TagStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    fn subject(name: &str) -> SubjectKey {
        SubjectKey::new("item", name)
    }

    #[test]
    fn signal_is_created_lazily_and_reused() {
        let tags = TagStore::new();
        assert!(tags.is_empty());

        let first = tags.signal_for(&subject("on_roasts"));
        let second = tags.signal_for(&subject("on_roasts"));

        assert!(first.same_as(&second));
        assert_eq!(tags.len(), 1);
        assert!(!first.is_cancelled());
    }

    #[test]
    fn cancel_trips_existing_signal() {
        let tags = TagStore::new();
        let signal = tags.signal_for(&subject("on_roasts"));

        assert!(tags.cancel(&subject("on_roasts")));
        assert!(signal.is_cancelled());
    }

    #[test]
    fn cancelled_signal_is_replaced_not_revived() {
        let tags = TagStore::new();
        let old = tags.signal_for(&subject("on_roasts"));
        tags.cancel(&subject("on_roasts"));

        let fresh = tags.signal_for(&subject("on_roasts"));

        assert!(!fresh.same_as(&old));
        assert!(old.is_cancelled());
        assert!(!fresh.is_cancelled());
        assert!(fresh.epoch() > old.epoch());
    }

    #[test]
    fn cancel_twice_is_idempotent() {
        let tags = TagStore::new();
        let signal = tags.signal_for(&subject("on_roasts"));

        assert!(tags.cancel(&subject("on_roasts")));
        assert!(!tags.cancel(&subject("on_roasts")));
        assert!(signal.is_cancelled());
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn cancel_unknown_subject_binds_fresh_afterwards() {
        let tags = TagStore::new();

        assert!(!tags.cancel(&subject("never_seen")));
        let signal = tags.signal_for(&subject("never_seen"));
        assert!(!signal.is_cancelled());
    }

    #[test]
    fn bind_reports_invalidation_after_watermark() {
        let tags = TagStore::new();
        tags.signal_for(&subject("on_roasts"));

        let before = tags.watermark();
        tags.cancel(&subject("on_roasts"));

        let late = tags.bind(&subject("on_roasts"), before);
        assert!(late.invalidated_since);
        assert!(!late.signal.is_cancelled());

        let after = tags.watermark();
        let current = tags.bind(&subject("on_roasts"), after);
        assert!(!current.invalidated_since);
        assert!(current.signal.same_as(&late.signal));
    }

    #[test]
    fn bind_reports_invalidation_of_never_bound_subject() {
        let tags = TagStore::new();
        let before = tags.watermark();

        tags.cancel(&subject("brand_new"));

        assert!(tags.bind(&subject("brand_new"), before).invalidated_since);
    }

    #[test]
    fn prune_drops_only_cancelled_slots_below_low_water() {
        let tags = TagStore::new();
        tags.signal_for(&subject("live"));
        tags.signal_for(&subject("dead"));
        tags.cancel(&subject("dead"));
        let low_water = tags.watermark();
        tags.cancel(&subject("recent"));

        let removed = tags.prune(low_water);

        assert_eq!(removed, 1);
        assert_eq!(tags.len(), 2);
        assert!(!tags.signal_for(&subject("live")).is_cancelled());
    }

    #[test]
    fn concurrent_callers_observe_one_signal_per_epoch() {
        let tags = Arc::new(TagStore::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tags = Arc::clone(&tags);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    tags.signal_for(&subject("contended"))
                })
            })
            .collect();

        let signals: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread should not panic"))
            .collect();

        assert!(signals.iter().all(|signal| signal.same_as(&signals[0])));
    }
}
