//! Ordered storage for messages produced while the sink had no demand.
//!
//! [`PendingBuffer`] is a FIFO queue with an optional capacity. When a
//! bounded buffer is full the configured [`OverflowPolicy`] decides whether
//! the newest message is rejected, the oldest one is evicted, or the message
//! is kept and the decoder is asked to pause.

use std::{collections::VecDeque, fmt, num::NonZeroUsize};

/// Behaviour when a bounded buffer is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OverflowPolicy {
    /// Refuse the incoming message.
    RejectNewest,
    /// Evict the oldest buffered message to make room.
    DropOldest,
    /// Keep the message and signal the decoder to stop reading until demand
    /// frees space.
    #[default]
    Backpressure,
}

impl OverflowPolicy {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RejectNewest => "reject_newest",
            Self::DropOldest => "drop_oldest",
            Self::Backpressure => "backpressure",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Result of [`PendingBuffer::push`].
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<M> {
    /// The message was appended.
    Queued,
    /// The message was appended after evicting the returned oldest message.
    Evicted(M),
    /// The buffer was full and the message is handed back.
    Rejected(M),
    /// The message was appended but the buffer is at or beyond capacity.
    Saturated,
}

/// FIFO queue of undelivered messages.
pub struct PendingBuffer<M> {
    queue: VecDeque<M>,
    capacity: Option<NonZeroUsize>,
    policy: OverflowPolicy,
}

impl<M> fmt::Debug for PendingBuffer<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingBuffer")
            .field("len", &self.queue.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<M> PendingBuffer<M> {
    /// Create a buffer with no capacity limit.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: None,
            policy: OverflowPolicy::default(),
        }
    }

    /// Create a buffer holding at most `capacity` messages before `policy`
    /// applies.
    #[must_use]
    pub fn bounded(capacity: NonZeroUsize, policy: OverflowPolicy) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity.get()),
            capacity: Some(capacity),
            policy,
        }
    }

    /// Configured capacity, `None` when unbounded.
    #[must_use]
    pub fn capacity(&self) -> Option<NonZeroUsize> { self.capacity }

    /// Policy applied when the buffer is full.
    #[must_use]
    pub fn policy(&self) -> OverflowPolicy { self.policy }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize { self.queue.len() }

    /// Returns `true` when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.queue.is_empty() }

    /// Returns `true` when a bounded buffer holds at least `capacity`
    /// messages. Unbounded buffers are never full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.capacity
            .is_some_and(|capacity| self.queue.len() >= capacity.get())
    }

    /// Append `message`, applying the overflow policy if the buffer is full.
    pub fn push(&mut self, message: M) -> Admission<M> {
        if !self.is_full() {
            self.queue.push_back(message);
            return if self.is_full() && self.policy == OverflowPolicy::Backpressure {
                Admission::Saturated
            } else {
                Admission::Queued
            };
        }
        match self.policy {
            OverflowPolicy::RejectNewest => Admission::Rejected(message),
            OverflowPolicy::DropOldest => {
                let evicted = self.queue.pop_front();
                self.queue.push_back(message);
                match evicted {
                    Some(oldest) => Admission::Evicted(oldest),
                    None => Admission::Queued,
                }
            }
            OverflowPolicy::Backpressure => {
                self.queue.push_back(message);
                Admission::Saturated
            }
        }
    }

    /// Remove the oldest message.
    pub fn pop(&mut self) -> Option<M> { self.queue.pop_front() }

    /// Remove every buffered message in FIFO order.
    pub fn drain_all(&mut self) -> std::collections::vec_deque::Drain<'_, M> { self.queue.drain(..) }

    /// Iterate over buffered messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &M> { self.queue.iter() }
}

impl<M> Default for PendingBuffer<M> {
    fn default() -> Self { Self::unbounded() }
}
