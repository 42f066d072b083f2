//! Bounded single-writer/single-reader channel with end-of-stream and abort.
//!
//! Invariants:
//! - capacity is fixed at creation (a requested capacity of 0 becomes 1);
//! - rows come out in the order they went in, none lost or duplicated;
//! - once aborted, every blocked or future `put`/`get` fails with `Aborted`,
//!   regardless of how full or empty the queue is.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use hopline_core::id::ChannelId;
use hopline_core::types::Row;

use crate::error::{ChannelError, Result};
use crate::tracking::ChannelStats;
use crate::wakeup::Wakeup;

/// The channel type that implements one hop at runtime.
pub type RowChannel = BoundedChannel<Row>;

/// Outcome of a non-blocking read.
#[derive(Debug, PartialEq)]
pub enum Poll<T> {
    Item(T),
    /// Nothing queued yet; the producer is still running.
    Empty,
    /// Producer finished and the queue is drained.
    EndOfStream,
}

struct State<T> {
    queue: VecDeque<T>,
    producer_done: bool,
    aborted: bool,
}

pub struct BoundedChannel<T> {
    id: ChannelId,
    capacity: usize,
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    consumer: Option<Arc<Wakeup>>,
    stats: ChannelStats,
}

impl<T> BoundedChannel<T> {
    pub fn new(id: ChannelId, capacity: usize) -> Self {
        Self::build(id, capacity, None)
    }

    /// Channel that also notifies the consumer's shared `Wakeup`.
    pub fn with_wakeup(id: ChannelId, capacity: usize, consumer: Arc<Wakeup>) -> Self {
        Self::build(id, capacity, Some(consumer))
    }

    fn build(id: ChannelId, capacity: usize, consumer: Option<Arc<Wakeup>>) -> Self {
        let capacity = capacity.max(1);
        Self {
            id,
            capacity,
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity.min(1024)),
                producer_done: false,
                aborted: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            consumer,
            stats: ChannelStats::new(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // No code path panics while holding the lock; recover the state if one ever does.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake_consumer(&self) {
        if let Some(w) = &self.consumer {
            w.notify();
        }
    }

    /// Enqueue `item`, blocking while the queue is full.
    pub fn put(&self, item: T) -> Result<()> {
        let st = self.lock();
        let mut st = self
            .not_full
            .wait_while(st, |s| {
                s.queue.len() >= self.capacity && !s.aborted && !s.producer_done
            })
            .unwrap_or_else(PoisonError::into_inner);
        if st.aborted {
            return Err(ChannelError::Aborted);
        }
        if st.producer_done {
            return Err(ChannelError::Closed);
        }
        st.queue.push_back(item);
        self.stats.record_put(st.queue.len());
        drop(st);
        self.not_empty.notify_one();
        self.wake_consumer();
        Ok(())
    }

    /// Next item in FIFO order; `Ok(None)` once the producer is done and the
    /// queue has drained. Blocks while empty.
    pub fn get(&self) -> Result<Option<T>> {
        let st = self.lock();
        let mut st = self
            .not_empty
            .wait_while(st, |s| s.queue.is_empty() && !s.producer_done && !s.aborted)
            .unwrap_or_else(PoisonError::into_inner);
        if st.aborted {
            return Err(ChannelError::Aborted);
        }
        match st.queue.pop_front() {
            Some(item) => {
                drop(st);
                self.stats.record_take();
                self.not_full.notify_one();
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// Non-blocking `get`.
    pub fn try_get(&self) -> Result<Poll<T>> {
        let mut st = self.lock();
        if st.aborted {
            return Err(ChannelError::Aborted);
        }
        match st.queue.pop_front() {
            Some(item) => {
                drop(st);
                self.stats.record_take();
                self.not_full.notify_one();
                Ok(Poll::Item(item))
            }
            None if st.producer_done => Ok(Poll::EndOfStream),
            None => Ok(Poll::Empty),
        }
    }

    /// Signal that no more items will be written. Idempotent.
    pub fn mark_producer_done(&self) {
        let mut st = self.lock();
        if st.producer_done {
            return;
        }
        st.producer_done = true;
        drop(st);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.wake_consumer();
        #[cfg(feature = "tracing")]
        tracing::trace!(channel = %self.id, "producer done");
    }

    /// Release both ends immediately. Idempotent.
    pub fn abort(&self) {
        let mut st = self.lock();
        if st.aborted {
            return;
        }
        st.aborted = true;
        drop(st);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.wake_consumer();
        #[cfg(feature = "tracing")]
        tracing::trace!(channel = %self.id, "aborted");
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    pub fn is_producer_done(&self) -> bool {
        self.lock().producer_done
    }

    /// Producer done and nothing left to read.
    pub fn is_drained(&self) -> bool {
        let st = self.lock();
        st.producer_done && st.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }
}

impl<T> std::fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.lock();
        f.debug_struct("BoundedChannel")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("len", &st.queue.len())
            .field("producer_done", &st.producer_done)
            .field("aborted", &st.aborted)
            .finish()
    }
}
