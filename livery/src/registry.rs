use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::consumer::Consumer;
use crate::handle::{ConsumerHandle, RegistryId};
use crate::sentinel::LifetimeSentinel;

/// A type-erased apply callback. It resolves its own typed consumer when called.
pub type ApplyFn<T> = Rc<dyn Fn(&T)>;

/// One registered (consumer, apply callback) pair.
///
/// The consumer reference is weak: an entry never keeps its consumer alive. An entry whose
/// consumer no longer resolves is treated as absent.
pub struct SubscriptionEntry<T> {
    consumer: Weak<dyn Consumer>,
    apply: ApplyFn<T>,
}

impl<T> Clone for SubscriptionEntry<T> {
    fn clone(&self) -> Self { Self { consumer: self.consumer.clone(), apply: self.apply.clone() } }
}

impl<T> SubscriptionEntry<T> {
    /// The consumer, if it is still alive
    pub fn resolve(&self) -> Option<Rc<dyn Consumer>> { self.consumer.upgrade() }

    pub fn is_live(&self) -> bool { self.consumer.strong_count() > 0 }

    /// Invoke the callback. Does nothing if the consumer has been dropped.
    pub fn apply(&self, value: &T) { (self.apply)(value) }

    /// The callback alone, for deferring it past the current broadcast
    pub fn apply_fn(&self) -> ApplyFn<T> { self.apply.clone() }
}

/// Maps each consumer handle to the ordered entries registered for it.
///
/// Cloning yields another handle to the same registry.
pub struct SubscriptionRegistry<T>(Rc<Inner<T>>);

struct Inner<T> {
    id: RegistryId,
    entries: RefCell<BTreeMap<ConsumerHandle, Vec<SubscriptionEntry<T>>>>,
    evictions: Cell<usize>,
}

impl<T> Clone for SubscriptionRegistry<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> std::fmt::Debug for SubscriptionRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry").field("id", &self.0.id).field("consumers", &self.len()).finish()
    }
}

impl<T: 'static> Default for SubscriptionRegistry<T> {
    fn default() -> Self { Self::new() }
}

impl<T: 'static> SubscriptionRegistry<T> {
    pub fn new() -> Self { Self(Rc::new(Inner { id: RegistryId::next(), entries: RefCell::new(BTreeMap::new()), evictions: Cell::new(0) })) }

    /// Register `callback` for `consumer`.
    ///
    /// The first registration of a consumer attaches a [`LifetimeSentinel`] to it which evicts
    /// the consumer's entries when the consumer is dropped. Later registrations append further
    /// entries and reuse that sentinel.
    pub fn register<C, F>(&self, consumer: &Rc<C>, callback: F) -> ConsumerHandle
    where
        C: Consumer,
        F: Fn(&C, &T) + 'static,
    {
        let handle = ConsumerHandle::of(consumer);

        if !consumer.attachments().contains(self.0.id) {
            let registry = Rc::downgrade(&self.0);
            let target: Weak<dyn Any> = registry.clone();
            let sentinel = LifetimeSentinel::bound(target, move || {
                if let Some(inner) = registry.upgrade() {
                    SubscriptionRegistry(inner).evict(handle);
                }
            });
            consumer.attachments().attach(self.0.id, sentinel);
            debug!("{} attached sentinel to {}", self.0.id, handle);
        }

        let typed = Rc::downgrade(consumer);
        let apply: ApplyFn<T> = Rc::new(move |value: &T| {
            if let Some(consumer) = typed.upgrade() {
                callback(&*consumer, value)
            }
        });
        let weak: Weak<dyn Consumer> = Rc::downgrade(consumer) as Weak<dyn Consumer>;

        let mut entries = self.0.entries.borrow_mut();
        let sequence = entries.entry(handle).or_default();
        sequence.push(SubscriptionEntry { consumer: weak, apply });
        trace!("{} registered entry #{} for {}", self.0.id, sequence.len(), handle);
        handle
    }
}

impl<T> SubscriptionRegistry<T> {
    pub fn id(&self) -> RegistryId { self.0.id }

    /// Remove every entry registered for `handle`. Returns whether anything was removed.
    pub fn evict(&self, handle: ConsumerHandle) -> bool {
        let removed = self.0.entries.borrow_mut().remove(&handle);
        match removed {
            Some(sequence) => {
                self.0.evictions.set(self.0.evictions.get() + 1);
                debug!("{} evicted {} entries for {}", self.0.id, sequence.len(), handle);
                // dropped here, after the borrow: entry destructors may drop other consumers
                drop(sequence);
                true
            }
            None => false,
        }
    }

    /// Evict every handle whose entries no longer resolve. Returns the number of handles removed.
    pub fn purge(&self) -> usize {
        let dead: Vec<ConsumerHandle> = self
            .0
            .entries
            .borrow()
            .iter()
            .filter(|(_, sequence)| sequence.iter().all(|entry| !entry.is_live()))
            .map(|(handle, _)| *handle)
            .collect();
        dead.into_iter().filter(|handle| self.evict(*handle)).count()
    }

    /// Entries whose consumers are alive right now, in handle then insertion order.
    ///
    /// The snapshot holds no borrow of the registry, so callers may invoke the entries while
    /// consumers register or drop.
    pub fn snapshot(&self) -> Vec<SubscriptionEntry<T>> {
        self.0.entries.borrow().values().flatten().filter(|entry| entry.is_live()).cloned().collect()
    }

    /// Number of consumers evicted over the registry's lifetime
    pub fn evictions(&self) -> usize { self.0.evictions.get() }

    /// Number of consumers with at least one entry
    pub fn len(&self) -> usize { self.0.entries.borrow().len() }

    pub fn is_empty(&self) -> bool { self.0.entries.borrow().is_empty() }

    pub fn contains(&self, handle: ConsumerHandle) -> bool { self.0.entries.borrow().contains_key(&handle) }

    /// Number of entries registered for `handle`
    pub fn entry_count(&self, handle: ConsumerHandle) -> usize { self.0.entries.borrow().get(&handle).map_or(0, Vec::len) }

    pub fn total_entries(&self) -> usize { self.0.entries.borrow().values().map(Vec::len).sum() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentinel::Attachments;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Label {
        attachments: Attachments,
        text: RefCell<String>,
    }

    impl Consumer for Label {
        fn attachments(&self) -> &Attachments { &self.attachments }
    }

    #[test]
    fn test_register_creates_one_sentinel_per_registry() {
        let registry = SubscriptionRegistry::<u32>::new();
        let label = Rc::new(Label::default());

        let first = registry.register(&label, |_, _| {});
        let second = registry.register(&label, |_, _| {});

        assert_eq!(first, second);
        assert_eq!(label.attachments.len(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entry_count(first), 2);
    }

    #[test]
    fn test_repeat_registration_fires_one_cleanup() {
        let registry = SubscriptionRegistry::<u32>::new();
        let label = Rc::new(Label::default());
        let handle = registry.register(&label, |_, _| {});
        registry.register(&label, |_, _| {});
        registry.register(&label, |_, _| {});

        // a replaced sentinel would have cleaned up early and lost the first entries
        assert_eq!(registry.evictions(), 0);
        assert_eq!(registry.entry_count(handle), 3);

        drop(label);
        assert_eq!(registry.evictions(), 1);
    }

    #[test]
    fn test_sentinels_of_dropped_registries_do_not_accumulate() {
        let label = Rc::new(Label::default());
        for _ in 0..100 {
            let registry = SubscriptionRegistry::<u32>::new();
            registry.register(&label, |_, _| {});
            assert!(label.attachments.len() <= 2);
        }
        assert_eq!(label.attachments.len(), 1);

        let kept = SubscriptionRegistry::<u32>::new();
        let handle = kept.register(&label, |_, _| {});
        assert_eq!(label.attachments.len(), 1);

        drop(label);
        assert!(!kept.contains(handle));
        assert_eq!(kept.evictions(), 1);
    }

    #[test]
    fn test_drop_evicts_all_entries_for_consumer() {
        let registry = SubscriptionRegistry::<u32>::new();
        let label = Rc::new(Label::default());
        let handle = registry.register(&label, |_, _| {});
        registry.register(&label, |_, _| {});

        drop(label);

        assert!(!registry.contains(handle));
        assert_eq!(registry.entry_count(handle), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_evict_is_idempotent() {
        let registry = SubscriptionRegistry::<u32>::new();
        let label = Rc::new(Label::default());
        let handle = registry.register(&label, |_, _| {});

        assert!(registry.evict(handle));
        assert!(!registry.evict(handle));
        // the sentinel still fires on drop, against an absent handle
        drop(label);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let registry = SubscriptionRegistry::<u32>::new();
        let label = Rc::new(Label::default());
        registry.register(&label, |label, value| label.text.borrow_mut().push_str(&format!("a{value}")));
        registry.register(&label, |label, value| label.text.borrow_mut().push_str(&format!("b{value}")));

        for entry in registry.snapshot() {
            entry.apply(&7);
        }
        assert_eq!(*label.text.borrow(), "a7b7");
    }

    #[test]
    fn test_registry_dropped_before_consumer() {
        let registry = SubscriptionRegistry::<u32>::new();
        let label = Rc::new(Label::default());
        registry.register(&label, |_, _| {});

        drop(registry);
        // cleanup finds no registry and does nothing
        drop(label);
    }

    #[test]
    fn test_purge_removes_handles_of_dead_consumers() {
        let registry = SubscriptionRegistry::<u32>::new();
        let label = Rc::new(Label::default());
        let handle = registry.register(&label, |_, _| {});

        // keep the sentinel alive past the consumer so nothing evicts on drop
        let sentinel = label.attachments.detach(registry.id()).expect("sentinel attached");
        drop(label);

        assert!(registry.contains(handle));
        assert!(registry.snapshot().is_empty());
        assert_eq!(registry.purge(), 1);
        assert!(!registry.contains(handle));

        drop(sentinel);
        assert!(registry.is_empty());
    }
}
