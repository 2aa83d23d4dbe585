//! ## utkik-core::mailbox
//! **Fixed-capacity message queue for cross-thread signaling**
//!
//! A `Mailbox` is a circular buffer of fixed-size messages guarded by a
//! single mutex. It is the only channel reactor threads use to talk to each
//! other: virtual-signal numbers, task handouts and completion reports all
//! travel as small `Copy` records through one of these.
//!
//! ## Key Design Features
//! 1. **Bounded** - capacity is fixed at construction; a full mailbox is a
//!    back-pressure signal (`MailboxError::Full`), never a silent drop
//! 2. **Non-blocking** - no operation waits for space or data; a reactor
//!    must never block inside a handler, so retry/backoff belongs to the
//!    caller
//! 3. **Single lock** - every buffer mutation happens under one mutex,
//!    which keeps the queue safe for concurrent producers and consumers

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Mailbox error conditions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MailboxError {
    /// The buffer already holds `capacity` messages.
    #[error("mailbox capacity exceeded")]
    Full,
    /// A mailbox with no slots can never accept a message.
    #[error("invalid capacity (must be at least one slot)")]
    InvalidCapacity,
}

struct Ring<T> {
    slots: Box<[Option<T>]>,
    /// Index of the oldest queued message.
    head: usize,
    len: usize,
}

struct Inner<T> {
    ring: Mutex<Ring<T>>,
    capacity: usize,
}

/// Fixed-capacity, mutex-protected message queue.
///
/// Cheap to hand across threads: `share()` clones an `Arc` to the same
/// buffer, so producer and consumer sides are interchangeable handles.
pub struct Mailbox<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Copy> Mailbox<T> {
    /// Creates a mailbox with room for `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Result<Self, MailboxError> {
        if capacity == 0 {
            return Err(MailboxError::InvalidCapacity);
        }

        let slots = (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice();

        Ok(Self {
            inner: Arc::new(Inner {
                ring: Mutex::new(Ring { slots, head: 0, len: 0 }),
                capacity,
            }),
        })
    }

    /// Creates a new handle to the same shared buffer.
    #[inline]
    pub fn share(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }

    /// Copies `msg` into the next free slot.
    ///
    /// `Err(Full)` is the back-pressure contract: the caller decides whether
    /// to drop, retry, or slow down. Submission order is preserved (FIFO).
    pub fn submit(&self, msg: T) -> Result<(), MailboxError> {
        let mut ring = self.inner.ring.lock();
        if ring.len == self.inner.capacity {
            return Err(MailboxError::Full);
        }
        let tail = (ring.head + ring.len) % self.inner.capacity;
        ring.slots[tail] = Some(msg);
        ring.len += 1;
        Ok(())
    }

    /// Removes and returns the oldest queued message, never blocking.
    pub fn extract(&self) -> Option<T> {
        let mut ring = self.inner.ring.lock();
        if ring.len == 0 {
            return None;
        }
        let head = ring.head;
        let msg = ring.slots[head].take();
        ring.head = (head + 1) % self.inner.capacity;
        ring.len -= 1;
        msg
    }

    /// Scans queued messages oldest-first without removing any,
    /// short-circuiting as soon as `predicate` matches.
    ///
    /// Answers "is a specific message pending" without consuming unrelated
    /// traffic queued around it.
    pub fn inspect(&self, mut predicate: impl FnMut(&T) -> bool) -> bool {
        let ring = self.inner.ring.lock();
        for i in 0..ring.len {
            let idx = (ring.head + i) % self.inner.capacity;
            if let Some(msg) = ring.slots[idx].as_ref() {
                if predicate(msg) {
                    return true;
                }
            }
        }
        false
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.inner.ring.lock().len
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot count fixed at construction.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}
