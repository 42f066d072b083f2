#![forbid(unsafe_code)]
//! hopline-channel: the bounded queues that implement hops at runtime.
//!
//! Each channel has exactly one writer and one reader. Fan-out and fan-in are
//! built by allocating one channel per hop, never by sharing a channel.
//! Blocking `put`/`get` are the only suspension points of the data-flow path;
//! `abort` releases both ends immediately.

pub mod channel;
pub mod error;
pub mod tracking;
pub mod wakeup;

pub use channel::{BoundedChannel, Poll, RowChannel};
pub use error::{ChannelError, Result};
pub use tracking::{ChannelStats, StatsSnapshot};
pub use wakeup::Wakeup;
