use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastError {
    /// A callback or change listener tried to apply a value while the broadcaster was still
    /// applying the previous one
    #[error("apply called re-entrantly while a broadcast is in progress")]
    ReentrantApply,
}
