//! Bounded per-subscriber frame queue with drop-oldest overflow
//!
//! The enqueue side is called from the relay's fan-out path under its state
//! lock and must never block: overflow evicts the oldest undelivered frame
//! and bumps the drop counter. The freshest state is always the most
//! valuable, so drop-newest would be wrong, and blocking the writer is
//! forbidden outright.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

pub struct FrameQueue {
    inner: Mutex<VecDeque<Bytes>>,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Enqueue a frame, evicting the oldest on overflow. Never blocks.
    pub fn push(&self, frame: Bytes) {
        {
            let mut inner = self.inner.lock();
            if inner.len() == self.capacity {
                inner.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            inner.push_back(frame);
        }
        self.notify.notify_one();
    }

    /// Await the next frame; `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Bytes> {
        loop {
            // Arm the notification before checking so a push between the
            // check and the await cannot be lost.
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

    /// Close the queue; pending frames remain poppable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Frames evicted because the subscriber fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
