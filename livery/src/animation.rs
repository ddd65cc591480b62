use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// A block of updates to run inside an animation
pub type AnimationWork = Box<dyn FnOnce() + 'static>;

/// Strategy that wraps a block of updates, typically by running it inside an animation
pub type AnimationBlock = Rc<dyn Fn(AnimationWork)>;

/// Default duration applied to animated updates
pub const DEFAULT_ANIMATION_DURATION: Duration = Duration::from_millis(300);

/// The animation executor.
pub trait Animator {
    /// Run `work` as an animation lasting `duration`. May run it now or on a later frame.
    fn run_animated(&self, duration: Duration, work: AnimationWork);
}

/// Runs work synchronously, without any timing
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl Animator for Immediate {
    fn run_animated(&self, _duration: Duration, work: AnimationWork) { work() }
}

/// Queues work until the host's next frame calls [`AnimationQueue::run_pending`].
///
/// Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct AnimationQueue(Rc<RefCell<VecDeque<(Duration, AnimationWork)>>>);

impl AnimationQueue {
    pub fn new() -> Self { Self::default() }

    /// Number of queued transactions
    pub fn pending(&self) -> usize { self.0.borrow().len() }

    /// Durations of the queued transactions, oldest first
    pub fn durations(&self) -> Vec<Duration> { self.0.borrow().iter().map(|(duration, _)| *duration).collect() }

    /// Run every transaction queued so far. Work queued while running waits for the next call.
    pub fn run_pending(&self) -> usize {
        let batch: Vec<_> = self.0.borrow_mut().drain(..).collect();
        let count = batch.len();
        for (_, work) in batch {
            work();
        }
        count
    }
}

impl Animator for AnimationQueue {
    fn run_animated(&self, duration: Duration, work: AnimationWork) { self.0.borrow_mut().push_back((duration, work)); }
}

impl std::fmt::Debug for AnimationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("AnimationQueue").field("pending", &self.pending()).finish() }
}
