//! Pending-emit queue
//!
//! Buffers items until the router is ready, then drains them once in FIFO order. Items
//! offered while the drain runs wait for it, so they always come after the buffered ones.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// One-shot FIFO buffer in front of readiness
#[derive(Debug)]
pub struct PendingQueue<T> {
    ready: AtomicBool,
    queue: Mutex<VecDeque<T>>,
}

impl<T> PendingQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Buffer `item` while not ready; hand it back once ready
    pub async fn push_or_pass(&self, item: T) -> Option<T> {
        if self.is_ready() {
            return Some(item);
        }

        let mut queue = self.queue.lock().await;
        if self.is_ready() {
            return Some(item);
        }
        queue.push_back(item);
        None
    }

    /// Run `deliver` over every buffered item in order and switch to ready.
    ///
    /// Only the first call drains; later calls return 0.
    pub async fn drain_with<F, Fut>(&self, mut deliver: F) -> usize
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut queue = self.queue.lock().await;
        if self.is_ready() {
            return 0;
        }

        let mut drained = 0;
        while let Some(item) = queue.pop_front() {
            deliver(item).await;
            drained += 1;
        }

        self.ready.store(true, Ordering::SeqCst);
        drained
    }

    /// Number of buffered items
    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
