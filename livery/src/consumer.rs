use crate::sentinel::Attachments;

/// An object that receives broadcast values.
///
/// A consumer owns an [`Attachments`] bag by value. Subscriptions store their lifetime sentinel in
/// it, so the subscription ends exactly when the consumer is dropped.
pub trait Consumer: 'static {
    /// The consumer's attachment storage
    fn attachments(&self) -> &Attachments;

    /// Query for the optional [`Visible`] capability.
    /// Consumers that return `None` are always updated immediately.
    fn as_visible(&self) -> Option<&dyn Visible> { None }
}

/// Capability of consumers that are on-screen elements.
pub trait Visible {
    /// Whether the element is currently attached to a visible hierarchy
    fn is_attached(&self) -> bool;
}

/// Whether updates to this consumer should go through the animation block
pub(crate) fn is_animatable(consumer: &dyn Consumer) -> bool { consumer.as_visible().is_some_and(|visible| visible.is_attached()) }
