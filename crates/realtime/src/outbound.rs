//! Bounded FIFO of frames that could not go straight to the transport.

use std::collections::VecDeque;

/// Outbound frames waiting for the next open, or for room in the write
/// channel of an open transport.
///
/// When full, the oldest frame is evicted to make room.
#[derive(Debug)]
pub(crate) struct OutboundQueue {
    frames: VecDeque<String>,
    capacity: usize,
}

/// Result of [`OutboundQueue::push`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Enqueued {
    Stored,
    /// Stored after evicting the oldest frame.
    Evicted,
    /// Capacity is zero; nothing stored.
    Disabled,
}

impl OutboundQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, frame: String) -> Enqueued {
        if self.capacity == 0 {
            return Enqueued::Disabled;
        }
        let evicted = if self.frames.len() >= self.capacity {
            self.frames.pop_front();
            true
        } else {
            false
        };
        self.frames.push_back(frame);
        if evicted {
            Enqueued::Evicted
        } else {
            Enqueued::Stored
        }
    }

    /// Takes all frames, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<String> {
        self.frames.drain(..).collect()
    }

    pub(crate) fn pop_front(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    /// Puts frames back at the front, keeping their order.
    pub(crate) fn requeue_front(&mut self, frames: Vec<String>) {
        for frame in frames.into_iter().rev() {
            self.frames.push_front(frame);
        }
        while self.frames.len() > self.capacity {
            self.frames.pop_back();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
