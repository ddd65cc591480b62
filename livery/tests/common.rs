use livery::{Attachments, Consumer, Visible};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[allow(unused)]
pub fn init_tracing() { let _ = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).with_test_writer().try_init(); }

/// A consumer that records every value applied to it
#[derive(Default)]
pub struct Recorder {
    pub attachments: Attachments,
    pub seen: RefCell<Vec<String>>,
}

impl Consumer for Recorder {
    fn attachments(&self) -> &Attachments { &self.attachments }
}

#[allow(unused)]
impl Recorder {
    pub fn new() -> Rc<Self> { Rc::new(Self::default()) }
    pub fn push(&self, entry: impl Into<String>) { self.seen.borrow_mut().push(entry.into()); }
    pub fn take(&self) -> Vec<String> { self.seen.borrow_mut().drain(..).collect() }
}

/// An on-screen element
#[derive(Default)]
pub struct View {
    pub attachments: Attachments,
    pub in_window: Cell<bool>,
    pub tint: Cell<u32>,
}

impl Visible for View {
    fn is_attached(&self) -> bool { self.in_window.get() }
}

impl Consumer for View {
    fn attachments(&self) -> &Attachments { &self.attachments }
    fn as_visible(&self) -> Option<&dyn Visible> { Some(self) }
}

#[allow(unused)]
impl View {
    pub fn new(in_window: bool) -> Rc<Self> { Rc::new(Self { in_window: Cell::new(in_window), ..Default::default() }) }
}

/// Collects values pushed from callbacks and drains them on check
#[allow(unused)]
pub fn watcher<T: 'static>() -> (Rc<dyn Fn(T)>, Box<dyn Fn() -> Vec<T>>) {
    let changes = Rc::new(RefCell::new(Vec::new()));
    let watcher = {
        let changes = changes.clone();
        Rc::new(move |value: T| changes.borrow_mut().push(value)) as Rc<dyn Fn(T)>
    };
    let check = Box::new(move || changes.borrow_mut().drain(..).collect::<Vec<T>>());
    (watcher, check)
}
