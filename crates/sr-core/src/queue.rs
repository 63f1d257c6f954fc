use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// Result of a bounded push, mirroring the three ways a queue can refuse (or
/// accept with loss) an item under backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    DroppedOldest,
    /// The queue has a fixed capacity, is full, and is configured to reject
    /// rather than drop the oldest entry.
    Full,
    /// `stop()` was called; the queue no longer accepts pushes.
    Stopped,
}

struct Inner<T> {
    items: VecDeque<T>,
    stopped: bool,
}

/// A mutex + condvar backed queue with a bounded capacity and configurable
/// overflow discipline (drop-oldest, by default, everywhere this is used in
/// the engine). Blocking `pop()` wakes on push or on `stop()`.
///
/// This is the engine's one hand-rolled concurrency primitive: `rtrb` and
/// `crossbeam-channel` both assume a single producer/consumer pair or an
/// unbounded channel, whereas every queue in this engine is bounded,
/// multi-producer in places (ready rings), and must be externally stoppable
/// to let worker threads join cleanly.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    capacity: usize,
    drop_oldest: bool,
}

impl<T> BoundedQueue<T> {
    /// `capacity` of 0 means unbounded (used for queues where the producer
    /// side is already self-limiting, e.g. the MP3 output queue is always
    /// given an explicit cap instead).
    pub fn new(capacity: usize, drop_oldest: bool) -> Self {
        Self {
            inner: Mutex::new(Inner { items: VecDeque::new(), stopped: false }),
            not_empty: Condvar::new(),
            capacity,
            drop_oldest,
        }
    }

    /// Convenience constructor for the common drop-oldest bounded ring used
    /// by inbound queues, ready rings, and consumer rings throughout.
    pub fn drop_oldest(capacity: usize) -> Self {
        Self::new(capacity, true)
    }

    pub fn push(&self, item: T) -> PushOutcome {
        let mut guard = self.inner.lock();
        if guard.stopped {
            return PushOutcome::Stopped;
        }
        let outcome = if self.capacity > 0 && guard.items.len() >= self.capacity {
            if self.drop_oldest {
                guard.items.pop_front();
                PushOutcome::DroppedOldest
            } else {
                return PushOutcome::Full;
            }
        } else {
            PushOutcome::Pushed
        };
        guard.items.push_back(item);
        drop(guard);
        self.not_empty.notify_one();
        outcome
    }

    /// Blocks until an item is available or the queue is stopped and
    /// drained, returning `None` in the latter case.
    pub fn pop(&self) -> Option<T> {
        let mut guard = self.inner.lock();
        loop {
            if let Some(item) = guard.items.pop_front() {
                return Some(item);
            }
            if guard.stopped {
                return None;
            }
            self.not_empty.wait(&mut guard);
        }
    }

    /// Like `pop()` but gives up after `timeout`, returning `None` either
    /// because the queue was stopped+drained or because the wait timed out.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut guard = self.inner.lock();
        loop {
            if let Some(item) = guard.items.pop_front() {
                return Some(item);
            }
            if guard.stopped {
                return None;
            }
            let result = self.not_empty.wait_for(&mut guard, timeout);
            if result.timed_out() {
                return guard.items.pop_front();
            }
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Drains every item currently queued, applying `f` to each in FIFO
    /// order. Used by command-dispatch loops that want to process a batch
    /// per wakeup rather than one item at a time.
    pub fn drain<F: FnMut(T)>(&self, mut f: F) {
        let mut guard = self.inner.lock();
        while let Some(item) = guard.items.pop_front() {
            drop(guard);
            f(item);
            guard = self.inner.lock();
        }
    }

    /// Stops the queue: wakes all blocked poppers, after which `pop()`
    /// drains remaining items then returns `None` forever, and `push()`
    /// always returns `Stopped`.
    pub fn stop(&self) {
        self.inner.lock().stopped = true;
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn drop_oldest_discipline_never_drops_the_newest() {
        let q = BoundedQueue::drop_oldest(3);
        assert_eq!(q.push(1), PushOutcome::Pushed);
        assert_eq!(q.push(2), PushOutcome::Pushed);
        assert_eq!(q.push(3), PushOutcome::Pushed);
        assert_eq!(q.push(4), PushOutcome::DroppedOldest);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), Some(4));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn full_without_drop_oldest_rejects() {
        let q: BoundedQueue<i32> = BoundedQueue::new(2, false);
        assert_eq!(q.push(1), PushOutcome::Pushed);
        assert_eq!(q.push(2), PushOutcome::Pushed);
        assert_eq!(q.push(3), PushOutcome::Full);
    }

    #[test]
    fn stop_unblocks_pop_and_drains() {
        let q = Arc::new(BoundedQueue::drop_oldest(4));
        q.push(1);
        q.stop();
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), None);
        assert_eq!(q.push(2), PushOutcome::Stopped);
    }

    #[test]
    fn blocking_pop_wakes_on_push_from_another_thread() {
        let q = Arc::new(BoundedQueue::drop_oldest(4));
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(std::time::Duration::from_millis(20));
        q.push(42);
        assert_eq!(handle.join().unwrap(), Some(42));
    }
}
