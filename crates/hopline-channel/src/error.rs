use thiserror::Error;

/// Result type local to hopline-channel.
pub type Result<T> = std::result::Result<T, ChannelError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel was aborted; both ends must stop and unwind.
    #[error("channel aborted")]
    Aborted,

    /// `put` after the producer already signalled end-of-stream.
    #[error("channel closed: producer already finished")]
    Closed,
}
