//! Bounded, cancellable hand-off queue
//!
//! Producers block while the queue is full, consumers block while it is
//! empty. Closing is a first-class state: it wakes every blocked producer
//! and consumer immediately, so a stage waiting on the queue can be stopped
//! without polling.

use crate::packet::Packet;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Queue of compressed packets feeding one decode stage
pub type PacketQueue = BoundedQueue<Packet>;

/// Errors returned when an item could not be queued
///
/// The rejected item is handed back to the caller.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError<T> {
    /// The queue was closed
    #[error("queue is closed")]
    Closed(T),
    /// The queue is at capacity
    #[error("queue is full")]
    Full(T),
}

impl<T> QueueError<T> {
    /// Recover the rejected item
    pub fn into_inner(self) -> T {
        match self {
            QueueError::Closed(item) | QueueError::Full(item) => item,
        }
    }
}

/// Result of a non-blocking or timed dequeue
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeued<T> {
    /// An item was available
    Item(T),
    /// Nothing arrived in time
    Empty,
    /// The queue was closed
    Closed,
}

#[derive(Debug)]
struct QueueInner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Ordered bounded queue with close semantics
#[derive(Debug)]
pub struct BoundedQueue<T> {
    name: String,
    capacity: usize,
    inner: Mutex<QueueInner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.clamp(1, 1024)),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Queue name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of queued items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Check if the queue holds no items
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Check if the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Append an item, blocking while the queue is full
    pub fn enqueue(&self, item: T) -> Result<(), QueueError<T>> {
        let mut inner = self.inner.lock();
        while !inner.closed && inner.items.len() >= self.capacity {
            self.not_full.wait(&mut inner);
        }
        if inner.closed {
            return Err(QueueError::Closed(item));
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append an item without blocking
    pub fn try_enqueue(&self, item: T) -> Result<(), QueueError<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueueError::Closed(item));
        }
        if inner.items.len() >= self.capacity {
            return Err(QueueError::Full(item));
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Take the oldest item, blocking until one is available
    ///
    /// Returns `None` once the queue is closed.
    pub fn dequeue(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(item) = inner.items.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Some(item);
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Take the oldest item if one is immediately available
    pub fn try_dequeue(&self) -> Dequeued<T> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Dequeued::Closed;
        }
        match inner.items.pop_front() {
            Some(item) => {
                drop(inner);
                self.not_full.notify_one();
                Dequeued::Item(item)
            }
            None => Dequeued::Empty,
        }
    }

    /// Take the oldest item, waiting at most `timeout`
    pub fn dequeue_timeout(&self, timeout: Duration) -> Dequeued<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return Dequeued::Closed;
            }
            if let Some(item) = inner.items.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Dequeued::Item(item);
            }
            if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                if inner.closed {
                    return Dequeued::Closed;
                }
                let Some(item) = inner.items.pop_front() else {
                    return Dequeued::Empty;
                };
                drop(inner);
                self.not_full.notify_one();
                return Dequeued::Item(item);
            }
        }
    }

    /// Close the queue, dropping queued items and waking every waiter
    ///
    /// Closing is idempotent. Returns the number of items dropped.
    pub fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        if inner.closed {
            return 0;
        }
        inner.closed = true;
        let dropped = inner.items.len();
        inner.items.clear();
        drop(inner);

        self.not_empty.notify_all();
        self.not_full.notify_all();
        debug!(queue = %self.name, dropped, "Queue closed");
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new("fifo", 4);
        for i in 0..4 {
            queue.enqueue(i).unwrap();
        }
        assert_eq!(queue.len(), 4);
        for i in 0..4 {
            assert_eq!(queue.dequeue(), Some(i));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_try_enqueue_full() {
        let queue = BoundedQueue::new("full", 1);
        queue.try_enqueue(1).unwrap();
        assert_eq!(queue.try_enqueue(2), Err(QueueError::Full(2)));
        assert_eq!(queue.try_dequeue(), Dequeued::Item(1));
        assert_eq!(queue.try_dequeue(), Dequeued::Empty);
    }

    #[test]
    fn test_close_rejects_and_drops() {
        let queue = BoundedQueue::new("closed", 4);
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();

        assert_eq!(queue.close(), 2);
        assert_eq!(queue.close(), 0);
        assert!(queue.is_closed());
        assert_eq!(queue.dequeue(), None);
        assert_eq!(queue.try_dequeue(), Dequeued::Closed);
        assert_eq!(queue.enqueue(3).unwrap_err().into_inner(), 3);
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new("wake", 2));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.dequeue())
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_close_wakes_blocked_producer() {
        let queue = Arc::new(BoundedQueue::new("backpressure", 1));
        queue.enqueue(1).unwrap();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.enqueue(2))
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert_eq!(producer.join().unwrap(), Err(QueueError::Closed(2)));
    }

    #[test]
    fn test_dequeue_timeout() {
        let queue: BoundedQueue<u8> = BoundedQueue::new("timeout", 1);
        let started = Instant::now();
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(20)), Dequeued::Empty);
        assert!(started.elapsed() >= Duration::from_millis(20));

        queue.enqueue(7).unwrap();
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(20)), Dequeued::Item(7));
    }
}
