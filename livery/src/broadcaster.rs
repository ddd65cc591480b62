use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::animation::{AnimationBlock, AnimationWork, Animator, DEFAULT_ANIMATION_DURATION, Immediate};
use crate::consumer::{Consumer, is_animatable};
use crate::error::BroadcastError;
use crate::handle::ConsumerHandle;
use crate::changes::{ChangeGuard, ChangeListeners, IntoChangeListener};
use crate::registry::{ApplyFn, SubscriptionRegistry};

/// Holds the current value and pushes every new value to the registered consumers.
///
/// Cloning yields another handle to the same broadcaster.
pub struct ValueBroadcaster<T>(Rc<Inner<T>>);

struct Inner<T> {
    value: RefCell<Rc<T>>,
    registry: SubscriptionRegistry<T>,
    animator: Rc<dyn Animator>,
    // shared with the default animation block so later changes still apply
    animation_duration: Rc<Cell<Duration>>,
    animation_block: RefCell<Option<AnimationBlock>>,
    changes: ChangeListeners<T>,
    applying: Cell<bool>,
}

impl<T> Clone for ValueBroadcaster<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ValueBroadcaster<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueBroadcaster")
            .field("value", &self.0.value.borrow())
            .field("consumers", &self.0.registry.len())
            .field("change_listeners", &self.0.changes.len())
            .field("animation_duration", &self.0.animation_duration.get())
            .finish()
    }
}

/// Marks a broadcaster as applying until dropped
struct Applying<'a>(&'a Cell<bool>);

impl<'a> Applying<'a> {
    fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            return None;
        }
        Some(Applying(flag))
    }
}

impl Drop for Applying<'_> {
    fn drop(&mut self) { self.0.set(false); }
}

impl<T: 'static> ValueBroadcaster<T> {
    /// A broadcaster whose animated updates run synchronously through [`Immediate`]
    pub fn new(value: T) -> Self { Self::with_animator(value, Immediate) }

    pub fn with_animator<A: Animator + 'static>(value: T, animator: A) -> Self {
        Self(Rc::new(Inner {
            value: RefCell::new(Rc::new(value)),
            registry: SubscriptionRegistry::new(),
            animator: Rc::new(animator),
            animation_duration: Rc::new(Cell::new(DEFAULT_ANIMATION_DURATION)),
            animation_block: RefCell::new(None),
            changes: ChangeListeners::new(),
            applying: Cell::new(false),
        }))
    }

    /// Register `callback` for `consumer` and call it right away with the current value.
    ///
    /// The registration lasts until the consumer is dropped. Registering the same consumer again
    /// adds another callback; both are called, in registration order.
    pub fn register<C, F>(&self, consumer: &Rc<C>, callback: F) -> ConsumerHandle
    where
        C: Consumer,
        F: Fn(&C, &T) + 'static,
    {
        let callback = Rc::new(callback);
        let handle = {
            let callback = callback.clone();
            self.0.registry.register(consumer, move |consumer: &C, value: &T| (*callback)(consumer, value))
        };
        let value = self.value();
        (*callback)(&**consumer, &*value);
        handle
    }

    /// Like [`register`](Self::register), but a missing consumer is silently ignored
    pub fn register_opt<C, F>(&self, consumer: Option<&Rc<C>>, callback: F) -> Option<ConsumerHandle>
    where
        C: Consumer,
        F: Fn(&C, &T) + 'static,
    {
        match consumer {
            Some(consumer) => Some(self.register(consumer, callback)),
            None => {
                trace!("{} ignored registration without a consumer", self.0.registry.id());
                None
            }
        }
    }

    /// Apply a new value, animating consumers that are currently on screen
    pub fn apply(&self, value: T) { self.apply_with(value, true) }

    /// Apply a new value. With `animated` set, callbacks of visible, attached consumers run inside
    /// the animation block; all others run before this returns.
    ///
    /// A re-entrant call is logged and dropped; see [`try_apply`](Self::try_apply).
    pub fn apply_with(&self, value: T, animated: bool) {
        if let Err(err) = self.try_apply(value, animated) {
            warn!("{}: {}", self.0.registry.id(), err);
        }
    }

    /// Apply a new value, rejecting calls made while another apply is still running.
    ///
    /// The value is stored unconditionally, even if it equals the current one. Every consumer
    /// alive when its turn comes receives exactly one callback with the new value. Consumers
    /// dropped before their turn are skipped.
    ///
    /// Change listeners are told once the consumers have been updated, after the apply has
    /// finished, so a listener may itself apply a follow-up value.
    pub fn try_apply(&self, value: T, animated: bool) -> Result<(), BroadcastError> {
        let value = {
            let _applying = Applying::enter(&self.0.applying).ok_or(BroadcastError::ReentrantApply)?;
            let value = Rc::new(value);
            let previous = self.0.value.replace(value.clone());
            drop(previous);
            self.update_consumers(&value, animated);
            value
        };
        self.0.changes.post(&value);
        Ok(())
    }

    fn update_consumers(&self, value: &Rc<T>, animated: bool) {
        let entries = self.0.registry.snapshot();
        debug!("{} applying value to {} entries (animated: {})", self.0.registry.id(), entries.len(), animated);

        let mut deferred: Vec<ApplyFn<T>> = Vec::new();
        for entry in entries {
            let Some(consumer) = entry.resolve() else {
                trace!("{} skipped entry of a dropped consumer", self.0.registry.id());
                continue;
            };
            if animated && is_animatable(&*consumer) {
                deferred.push(entry.apply_fn());
            } else {
                entry.apply(value);
            }
        }

        if !deferred.is_empty() {
            trace!("{} handing {} callbacks to the animation block", self.0.registry.id(), deferred.len());
            let value = value.clone();
            let work: AnimationWork = Box::new(move || {
                for apply in deferred {
                    apply(&value);
                }
            });
            (self.animation_block())(work);
        }
    }

    /// The current value
    pub fn value(&self) -> Rc<T> { self.0.value.borrow().clone() }

    /// Calls a closure with a borrow of the current value
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.value();
        f(&value)
    }

    pub fn animation_duration(&self) -> Duration { self.0.animation_duration.get() }

    /// Takes effect from the next animated apply, including through an already cached default block
    pub fn set_animation_duration(&self, duration: Duration) { self.0.animation_duration.set(duration) }

    /// The animation block. Unless one was set, this is the default block running work through
    /// the animator with the current animation duration, created on first use and then cached.
    pub fn animation_block(&self) -> AnimationBlock {
        let mut slot = self.0.animation_block.borrow_mut();
        slot.get_or_insert_with(|| {
            let animator = self.0.animator.clone();
            let duration = self.0.animation_duration.clone();
            let block: AnimationBlock = Rc::new(move |work: AnimationWork| animator.run_animated(duration.get(), work));
            block
        })
        .clone()
    }

    pub fn set_animation_block(&self, block: AnimationBlock) {
        let previous = self.0.animation_block.replace(Some(block));
        drop(previous);
    }

    /// Listen for every applied value, independently of any consumer.
    /// The listener stays registered until the returned guard is dropped.
    pub fn on_change<L>(&self, listener: L) -> ChangeGuard<T>
    where L: IntoChangeListener<T> {
        self.0.changes.listen(listener.into_change_listener())
    }

    pub fn registry(&self) -> &SubscriptionRegistry<T> { &self.0.registry }
}

impl<T: Clone + 'static> ValueBroadcaster<T> {
    /// Returns a clone of the current value
    pub fn get(&self) -> T { (*self.value()).clone() }
}

impl<T: Default + 'static> Default for ValueBroadcaster<T> {
    fn default() -> Self { Self::new(T::default()) }
}
