use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type Callback<T> = Rc<dyn Fn(Rc<T>)>;
type Slots<T> = RefCell<Vec<(u64, Callback<T>)>>;

/// Listeners told about every value a broadcaster applies, whether or not they are consumers.
pub(crate) struct ChangeListeners<T> {
    slots: Rc<Slots<T>>,
    next_id: Cell<u64>,
}

impl<T: 'static> ChangeListeners<T> {
    pub fn new() -> Self { Self { slots: Rc::new(RefCell::new(Vec::new())), next_id: Cell::new(0) } }

    pub fn listen(&self, callback: Callback<T>) -> ChangeGuard<T> {
        let id = self.next_id.replace(self.next_id.get() + 1);
        self.slots.borrow_mut().push((id, callback));
        ChangeGuard { slots: Rc::downgrade(&self.slots), id }
    }

    /// Call every listener registered so far with `value`.
    /// Listeners added or removed while posting take effect from the next post.
    pub fn post(&self, value: &Rc<T>) {
        let callbacks: Vec<Callback<T>> = self.slots.borrow().iter().map(|(_, callback)| callback.clone()).collect();
        for callback in callbacks {
            callback(value.clone());
        }
    }
}

impl<T> ChangeListeners<T> {
    pub fn len(&self) -> usize { self.slots.borrow().len() }
}

/// Keeps a change listener registered. Dropping it removes the listener.
#[must_use = "dropping the guard removes the listener"]
pub struct ChangeGuard<T> {
    slots: Weak<Slots<T>>,
    id: u64,
}

impl<T> Drop for ChangeGuard<T> {
    fn drop(&mut self) {
        let Some(slots) = self.slots.upgrade() else { return };
        let removed = {
            let mut slots = slots.borrow_mut();
            slots.iter().position(|(id, _)| *id == self.id).map(|index| slots.remove(index))
        };
        // the listener may own other guards; drop it outside the borrow
        drop(removed);
    }
}

/// Things that can listen for applied values
pub trait IntoChangeListener<T> {
    fn into_change_listener(self) -> Rc<dyn Fn(Rc<T>)>;
}

impl<F, T> IntoChangeListener<T> for F
where F: Fn(Rc<T>) + 'static
{
    fn into_change_listener(self) -> Rc<dyn Fn(Rc<T>)> { Rc::new(self) }
}

#[cfg(feature = "tokio")]
impl<T: 'static> IntoChangeListener<T> for tokio::sync::mpsc::UnboundedSender<Rc<T>> {
    fn into_change_listener(self) -> Rc<dyn Fn(Rc<T>)> {
        Rc::new(move |value| {
            // a closed receiver just stops listening
            let _ = self.send(value);
        })
    }
}
