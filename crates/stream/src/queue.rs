use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Bounded MPSC buffer with drop-oldest overflow. `push` is synchronous
/// and never blocks the reader task; when the queue is full the oldest
/// item is discarded and the drop is counted, so a stalled consumer
/// always sees the most recent market data when it catches up.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    inner: Mutex<QueueInner<T>>,
    capacity: usize,
    notify: Notify,
}

#[derive(Debug)]
struct QueueInner<T> {
    items: VecDeque<T>,
    dropped: u64,
}

impl<T> BoundedQueue<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be nonzero");
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity),
                dropped: 0,
            }),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Enqueue one item, evicting the oldest entry if full. Returns true
    /// when an item was evicted.
    pub fn push(&self, item: T) -> bool {
        let evicted = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let evicted = if inner.items.len() >= self.capacity {
                inner.items.pop_front();
                inner.dropped += 1;
                true
            } else {
                false
            };
            inner.items.push_back(item);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .items
            .pop_front()
    }

    /// Wait until an item is available. The notified future is created
    /// before checking the queue so a push between the check and the
    /// await cannot be missed.
    pub async fn recv(&self) -> T {
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.try_pop() {
                // Pass the permit on; another item may already be queued.
                self.notify.notify_one();
                return item;
            }
            notified.await;
        }
    }

    /// Remove and return everything currently queued.
    pub fn drain(&self) -> Vec<T> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .items
            .drain(..)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total items evicted since creation.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).dropped
    }
}
