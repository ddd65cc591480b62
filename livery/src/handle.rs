use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Identity of a registered consumer, derived from the address of its `Rc` allocation.
///
/// The registry holds a `Weak` to the consumer for as long as the handle is a key, and the
/// allocation (and therefore the address) stays reserved until every `Weak` is gone. A handle
/// is never reused while it is present in the registry. It is only ever used as a map key.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConsumerHandle(usize);

impl ConsumerHandle {
    /// The handle for a consumer held in an `Rc`
    pub fn of<C: ?Sized>(consumer: &Rc<C>) -> Self { ConsumerHandle(Rc::as_ptr(consumer) as *const () as usize) }
}

impl std::fmt::Display for ConsumerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "consumer:{:#x}", self.0) }
}

static NEXT_REGISTRY_ID: AtomicUsize = AtomicUsize::new(1);

/// A unique identifier for a subscription registry.
/// Unlike an address, it is never reused within the process, so a sentinel left behind by a
/// dropped registry can't be mistaken for one belonging to a new registry.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegistryId(usize);

impl RegistryId {
    pub(crate) fn next() -> Self { RegistryId(NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed)) }
}

impl std::fmt::Display for RegistryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "registry:{}", self.0) }
}
