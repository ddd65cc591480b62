use std::any::Any;
use std::cell::RefCell;
use std::rc::Weak;

use crate::handle::RegistryId;

/// Runs a cleanup closure exactly once, when the sentinel is dropped.
///
/// Stored inside the [`Attachments`] of a consumer, it ties the cleanup to the consumer's own
/// lifetime without the consumer having to call anything.
///
/// A sentinel may be bound to the object its cleanup acts on. Once that object is gone the
/// sentinel is orphaned: its cleanup has nothing left to do, and [`Attachments`] discards it.
pub struct LifetimeSentinel {
    cleanup: Option<Box<dyn FnOnce()>>,
    target: Option<Weak<dyn Any>>,
}

impl LifetimeSentinel {
    pub fn new<F: FnOnce() + 'static>(cleanup: F) -> Self { Self { cleanup: Some(Box::new(cleanup)), target: None } }

    /// A sentinel whose cleanup only matters while `target` is alive
    pub fn bound<F: FnOnce() + 'static>(target: Weak<dyn Any>, cleanup: F) -> Self {
        Self { cleanup: Some(Box::new(cleanup)), target: Some(target) }
    }

    /// Whether the object this sentinel cleans up after has already been dropped
    pub fn is_orphaned(&self) -> bool { self.target.as_ref().is_some_and(|target| target.strong_count() == 0) }

    /// Cancel the cleanup. The sentinel then drops silently.
    pub fn disarm(&mut self) { self.cleanup = None; }

    pub fn is_armed(&self) -> bool { self.cleanup.is_some() }
}

impl Drop for LifetimeSentinel {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl std::fmt::Debug for LifetimeSentinel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifetimeSentinel").field("armed", &self.is_armed()).field("orphaned", &self.is_orphaned()).finish()
    }
}

/// Values associated with a consumer and owned by it.
///
/// Each registry stores at most one value under its [`RegistryId`]. Everything attached is dropped
/// together with the `Attachments`, in attachment order. Orphaned [`LifetimeSentinel`]s are
/// discarded whenever something new is attached.
#[derive(Default)]
pub struct Attachments(RefCell<Vec<(RegistryId, Box<dyn Any>)>>);

impl Attachments {
    pub fn new() -> Self { Self::default() }

    /// Attach `value` under `key`, returning the value previously stored there
    pub fn attach<V: Any>(&self, key: RegistryId, value: V) -> Option<Box<dyn Any>> {
        self.prune();
        let mut slots = self.0.borrow_mut();
        match slots.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, Box::new(value))),
            None => {
                slots.push((key, Box::new(value)));
                None
            }
        }
    }

    /// Discard sentinels whose target is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let orphans: Vec<_> = {
            let mut slots = self.0.borrow_mut();
            let (orphans, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *slots).into_iter().partition(|(_, value)| {
                value.downcast_ref::<LifetimeSentinel>().is_some_and(LifetimeSentinel::is_orphaned)
            });
            *slots = kept;
            orphans
        };
        let count = orphans.len();
        // cleanups run here, outside the borrow
        drop(orphans);
        count
    }

    pub fn contains(&self, key: RegistryId) -> bool { self.0.borrow().iter().any(|(k, _)| *k == key) }

    /// Remove and return the value stored under `key`.
    /// The caller decides when it drops, outside of this bag's borrow.
    pub fn detach(&self, key: RegistryId) -> Option<Box<dyn Any>> {
        let mut slots = self.0.borrow_mut();
        let index = slots.iter().position(|(k, _)| *k == key)?;
        Some(slots.remove(index).1)
    }

    pub fn len(&self) -> usize { self.0.borrow().len() }

    pub fn is_empty(&self) -> bool { self.0.borrow().is_empty() }
}

impl std::fmt::Debug for Attachments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.borrow().iter().map(|(key, _)| key)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counting_sentinel(counter: &Rc<Cell<usize>>) -> LifetimeSentinel {
        let counter = counter.clone();
        LifetimeSentinel::new(move || counter.set(counter.get() + 1))
    }

    #[test]
    fn test_cleanup_runs_once_on_drop() {
        let fired = Rc::new(Cell::new(0));
        let sentinel = counting_sentinel(&fired);
        assert_eq!(fired.get(), 0);
        drop(sentinel);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_disarmed_sentinel_is_silent() {
        let fired = Rc::new(Cell::new(0));
        let mut sentinel = counting_sentinel(&fired);
        sentinel.disarm();
        assert!(!sentinel.is_armed());
        drop(sentinel);
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn test_attachments_drop_their_sentinels() {
        let fired = Rc::new(Cell::new(0));
        let attachments = Attachments::new();
        attachments.attach(RegistryId::next(), counting_sentinel(&fired));
        attachments.attach(RegistryId::next(), counting_sentinel(&fired));
        assert_eq!(attachments.len(), 2);

        drop(attachments);
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn test_orphaned_sentinels_are_pruned_on_attach() {
        let attachments = Attachments::new();
        let target: Rc<dyn Any> = Rc::new(());
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        attachments.attach(RegistryId::next(), LifetimeSentinel::bound(Rc::downgrade(&target), move || counter.set(counter.get() + 1)));
        attachments.attach(RegistryId::next(), counting_sentinel(&fired));
        assert_eq!(attachments.prune(), 0);

        drop(target);
        attachments.attach(RegistryId::next(), 7u8);

        // the unbound sentinel and the plain value stay, the orphan is gone
        assert_eq!(attachments.len(), 2);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_attach_replaces_value_under_same_key() {
        let attachments = Attachments::new();
        let key = RegistryId::next();
        assert!(attachments.attach(key, 1u32).is_none());
        let previous = attachments.attach(key, 2u32).expect("previous value");
        assert_eq!(previous.downcast_ref::<u32>(), Some(&1));
        assert_eq!(attachments.len(), 1);

        let detached = attachments.detach(key).expect("detached value");
        assert_eq!(detached.downcast_ref::<u32>(), Some(&2));
        assert!(!attachments.contains(key));
        assert!(attachments.is_empty());
    }
}
