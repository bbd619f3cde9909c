//! Bounded per-session outbound queue
//!
//! Sits between the turn controller's paced playback and the connection
//! writer. Capacity is bounded; on overflow the oldest frame is dropped and
//! counted, so a slow consumer degrades playback instead of growing memory.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::frame::Frame;

pub struct OutboundQueue {
    inner: Mutex<VecDeque<Frame>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Enqueue a frame. Never blocks: at capacity the oldest queued frame is
    /// dropped to make room.
    pub fn push(&self, frame: Frame) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut queue = self.inner.lock();
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(frame);
        }
        self.notify.notify_one();
    }

    /// Dequeue the next frame, waiting until one is available. Returns
    /// `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Frame> {
        loop {
            let notified = self.notify.notified();
            if let Some(frame) = self.inner.lock().pop_front() {
                return Some(frame);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Discard everything queued but not yet written. Used on barge-in.
    pub fn clear(&self) -> usize {
        let mut queue = self.inner.lock();
        let discarded = queue.len();
        queue.clear();
        discarded
    }

    /// Close the queue. Idempotent; wakes all waiters.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Total frames dropped by the overflow policy.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_agent_core::FRAME_BYTES;

    fn audio(tag: u8) -> Frame {
        Frame::audio(vec![tag; FRAME_BYTES]).unwrap()
    }

    #[tokio::test]
    async fn test_push_pop_order() {
        let queue = OutboundQueue::new(8);
        queue.push(audio(1));
        queue.push(audio(2));

        assert!(matches!(queue.pop().await, Some(Frame::Audio { payload }) if payload[0] == 1));
        assert!(matches!(queue.pop().await, Some(Frame::Audio { payload }) if payload[0] == 2));
    }

    #[tokio::test]
    async fn test_drop_oldest_on_overflow() {
        let queue = OutboundQueue::new(2);
        queue.push(audio(1));
        queue.push(audio(2));
        queue.push(audio(3)); // evicts frame 1

        assert_eq!(queue.dropped(), 1);
        assert!(matches!(queue.pop().await, Some(Frame::Audio { payload }) if payload[0] == 2));
        assert!(matches!(queue.pop().await, Some(Frame::Audio { payload }) if payload[0] == 3));
    }

    #[tokio::test]
    async fn test_pop_returns_none_after_close() {
        let queue = OutboundQueue::new(2);
        queue.push(audio(1));
        queue.close();

        // Drains remaining frames, then None
        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = OutboundQueue::new(2);
        let q = Arc::clone(&queue);
        let waiter = tokio::spawn(async move { q.pop().await });

        tokio::task::yield_now().await;
        queue.push(audio(9));

        let frame = waiter.await.unwrap();
        assert!(matches!(frame, Some(Frame::Audio { payload }) if payload[0] == 9));
    }

    #[tokio::test]
    async fn test_clear_discards_queued() {
        let queue = OutboundQueue::new(8);
        queue.push(audio(1));
        queue.push(audio(2));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
