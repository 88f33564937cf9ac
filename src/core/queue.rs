//! # Message Queue
//!
//! Multi-producer, multi-consumer FIFO of [`MessageBlock`]s built on a
//! crossbeam channel. The channel is the synchronization point between the
//! I/O side and a service's logic thread: everything a producer wrote into a
//! block happens-before the consumer that pops it.
//!
//! ## Ordering
//! Blocks pushed by one producer are popped in push order. Nothing is promised
//! about the interleaving of different producers.
//!
//! ## Usage
//! ```rust
//! use service_runtime::core::block::{MessageBlock, SessionId};
//! use service_runtime::core::queue::MessageQueue;
//!
//! let queue = MessageQueue::unbounded();
//! queue.push_back(MessageBlock::data(SessionId(1), vec![1u8, 2, 3])).unwrap();
//! let block = queue.try_pop_front().unwrap();
//! assert_eq!(block.payload(), &[1, 2, 3]);
//! assert!(queue.try_pop_front().is_none());
//! ```

use crate::core::block::MessageBlock;
use crate::error::{constants, Error, Result};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};

/// Cloneable handle to one queue; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    tx: Sender<MessageBlock>,
    rx: Receiver<MessageBlock>,
    capacity: Option<usize>,
}

impl MessageQueue {
    pub fn unbounded() -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            tx,
            rx,
            capacity: None,
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity);
        Self {
            tx,
            rx,
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Enqueue a block, taking ownership of it.
    ///
    /// Never blocks. On a full bounded queue the block is released and a
    /// `Limit` error returned; use [`try_push_back`](Self::try_push_back) to
    /// keep it.
    pub fn push_back(&self, block: MessageBlock) -> Result<()> {
        match self.tx.try_send(block) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::limit(format!(
                "message queue full (capacity {})",
                self.capacity.unwrap_or_default()
            ))),
            Err(TrySendError::Disconnected(_)) => Err(Error::QueueClosed),
        }
    }

    /// Like [`push_back`](Self::push_back) but returns the block on failure.
    pub fn try_push_back(&self, block: MessageBlock) -> std::result::Result<(), MessageBlock> {
        self.tx.try_send(block).map_err(|e| e.into_inner())
    }

    /// Non-blocking dequeue; `None` when empty.
    pub fn try_pop_front(&self) -> Option<MessageBlock> {
        match self.rx.try_recv() {
            Ok(block) => Some(block),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                tracing::trace!("{}", constants::ERR_QUEUE_CLOSED);
                None
            }
        }
    }

    /// Pop up to `max` blocks into `out`, returning how many were taken.
    pub fn drain_into(&self, out: &mut Vec<MessageBlock>, max: usize) -> usize {
        let mut taken = 0;
        while taken < max {
            match self.try_pop_front() {
                Some(block) => {
                    out.push(block);
                    taken += 1;
                }
                None => break,
            }
        }
        taken
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drop every queued block, returning how many were released.
    pub fn clear(&self) -> usize {
        let mut released = 0;
        while self.try_pop_front().is_some() {
            released += 1;
        }
        released
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Secondary queue that mirrors primary traffic for monitoring.
///
/// Disabled or full sampler queues silently drop copies; the primary path
/// never waits on or fails because of the sampler.
#[derive(Debug, Clone)]
pub struct SamplerQueue {
    queue: Option<MessageQueue>,
}

impl SamplerQueue {
    pub fn disabled() -> Self {
        Self { queue: None }
    }

    pub fn enabled(capacity: usize) -> Self {
        Self {
            queue: Some(MessageQueue::bounded(capacity.max(1))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.queue.is_some()
    }

    /// Offer a copy of `block`. Returns whether the copy was queued.
    pub fn sample(&self, block: &MessageBlock) -> bool {
        match &self.queue {
            Some(queue) => queue.try_push_back(block.sampler_copy()).is_ok(),
            None => false,
        }
    }

    pub fn try_pop_front(&self) -> Option<MessageBlock> {
        self.queue.as_ref().and_then(MessageQueue::try_pop_front)
    }
}
