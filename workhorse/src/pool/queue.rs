use std::fmt;
use std::time::Duration;

use flume::{Receiver, Sender};
use workhorse_api::{WorkerError, WorkerResult};

use crate::error::PoolError;

/// The bounded FIFO shared by every worker of a pool.
///
/// Producers go through [`WorkQueue::offer`]; workers hold a
/// [`QueueConsumer`] obtained from [`WorkQueue::consumer`].
///
/// # Thread Safety
/// - Backed by a bounded `flume` channel, safe for many producers and consumers
/// - Capacity is enforced by the channel, not by the pool
pub struct WorkQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: usize,
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.receiver.len())
            .finish()
    }
}

impl<T: Send + 'static> WorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = flume::bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Enqueue `item`, waiting up to `timeout` for space.
    ///
    /// Returns `Ok(false)` when the queue stayed full for the whole timeout; the
    /// item is dropped in that case.
    pub async fn offer(&self, item: T, timeout: Duration) -> Result<bool, PoolError> {
        if timeout.is_zero() {
            return Err(PoolError::InvalidArgument("offer timeout must be greater than zero".into()));
        }

        match tokio::time::timeout(timeout, self.sender.send_async(item)).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(_)) => Err(PoolError::Disconnected),
            Err(_elapsed) => Ok(false),
        }
    }

    /// Enqueue without waiting. Returns the item back if the queue is full.
    pub fn try_offer(&self, item: T) -> Result<(), T> {
        self.sender.try_send(item).map_err(|e| e.into_inner())
    }

    pub fn consumer(&self) -> QueueConsumer<T> {
        QueueConsumer {
            receiver: self.receiver.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.receiver.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A worker's handle on the shared queue.
pub struct QueueConsumer<T> {
    receiver: Receiver<T>,
}

impl<T> Clone for QueueConsumer<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> fmt::Debug for QueueConsumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConsumer")
            .field("len", &self.receiver.len())
            .finish()
    }
}

impl<T: Send + 'static> QueueConsumer<T> {
    /// Take one item, waiting at most `timeout`.
    ///
    /// `Ok(None)` means the queue stayed empty for the whole timeout.
    pub async fn poll(&self, timeout: Duration) -> WorkerResult<Option<T>> {
        match tokio::time::timeout(timeout, self.receiver.recv_async()).await {
            Ok(Ok(item)) => Ok(Some(item)),
            Ok(Err(_)) => Err(WorkerError::QueueDisconnected),
            Err(_elapsed) => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
