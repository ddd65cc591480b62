/*!
Broadcast one shared value to many consumers, with subscriptions that end when the consumer does.

A [`ValueBroadcaster`] holds the current value. Consumers register an apply callback once; every
later [`apply`](ValueBroadcaster::apply) calls it again with the new value. There is no
unsubscribe: the first registration stores a [`LifetimeSentinel`] in the consumer's own
[`Attachments`], and dropping the consumer drops the sentinel, which evicts the consumer's
callbacks from the registry.

Consumers that expose the [`Visible`] capability and are currently attached get their callbacks
run inside the broadcaster's animation block. Everyone else is updated before `apply` returns.

This crate is single-threaded: everything lives behind `Rc`/`RefCell`, on the thread that owns the
consumers.

# Basic usage

```rust
use livery::*;
use std::cell::Cell;
use std::rc::Rc;

#[derive(Default)]
struct Label {
    attachments: Attachments,
    color: Cell<u32>,
}

impl Consumer for Label {
    fn attachments(&self) -> &Attachments { &self.attachments }
}

let theme = ValueBroadcaster::new(0x000000u32);
let label = Rc::new(Label::default());

theme.register(&label, |label, color| label.color.set(*color));
theme.apply(0xffffff);
assert_eq!(label.color.get(), 0xffffff);

let handle = ConsumerHandle::of(&label);
drop(label); // no unsubscribe needed
assert_eq!(theme.registry().entry_count(handle), 0);
```
*/

mod animation;
mod broadcaster;
mod changes;
mod consumer;
mod error;
mod handle;
mod registry;
mod sentinel;

pub use animation::*;
pub use broadcaster::*;
pub use changes::*;
pub use consumer::*;
pub use error::*;
pub use handle::*;
pub use registry::*;
pub use sentinel::*;
