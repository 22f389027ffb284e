//! Generic thread-safe concurrency primitives (C1, C2).
//!
//! Every mutable container in the hub is one of these two: a [`LockedQueue`]
//! for FIFO work items shared between an I/O thread and a worker thread, or
//! a [`LockedStore`] for the keyed result map. Handlers never hold two locks
//! at once.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// A thread-safe FIFO over `Arc<T>` with optional blocking `front` reads.
///
/// Items are reference-counted so a worker can hold the head item while it
/// processes it and a concurrent `find`/`for_each` still observes it as
/// queued.
pub struct LockedQueue<T> {
    inner: Mutex<Inner<T>>,
    cvar: Condvar,
}

struct Inner<T> {
    items: VecDeque<Arc<T>>,
    blocking: bool,
}

impl<T> Default for LockedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LockedQueue<T> {
    pub fn new() -> Self {
        LockedQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                blocking: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Enables or disables blocking. Disabling wakes every waiter in
    /// `front_blocking`, which then observes `None`.
    pub fn set_blocking(&self, on: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.blocking = on;
        if !on {
            self.cvar.notify_all();
        }
    }

    pub fn push_back(&self, v: T) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.push_back(Arc::new(v));
        if inner.blocking {
            self.cvar.notify_one();
        }
    }

    /// Inserts at the front of the queue ("urgent" routing hint).
    pub fn push_front(&self, v: T) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.push_front(Arc::new(v));
        if inner.blocking {
            self.cvar.notify_one();
        }
    }

    /// Returns a shared handle to the head item without removing it.
    ///
    /// If blocking is enabled and the queue is empty, waits until an item is
    /// pushed, blocking is disabled, or `timeout` elapses (whichever first).
    /// Never removes the item — callers that finished processing it must
    /// call [`LockedQueue::remove`].
    pub fn front_blocking(&self, timeout: Option<Duration>) -> Option<Arc<T>> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.blocking {
            return inner.items.front().cloned();
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        while inner.items.is_empty() && inner.blocking {
            inner = match deadline {
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return None;
                    }
                    let (next, timed_out) = self.cvar.wait_timeout(inner, dl - now).unwrap();
                    if timed_out.timed_out() && next.items.is_empty() {
                        return None;
                    }
                    next
                }
                None => self.cvar.wait(inner).unwrap(),
            };
        }
        inner.items.front().cloned()
    }

    /// Removes the first element pointer-equal to `v`.
    pub fn remove(&self, v: &Arc<T>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(pos) = inner.items.iter().position(|x| Arc::ptr_eq(x, v)) {
            inner.items.remove(pos);
        }
    }

    /// Zero-based position of the first element satisfying `pred`, if any.
    pub fn find_qorder(&self, pred: impl Fn(&T) -> bool) -> Option<usize> {
        let inner = self.inner.lock().unwrap();
        inner.items.iter().position(|x| pred(x))
    }

    /// Applies `f` to each queued element under the lock. `f` must not
    /// re-enter the queue (push/pop/remove), or it will deadlock.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<T>)) {
        let inner = self.inner.lock().unwrap();
        for item in inner.items.iter() {
            f(item);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }
}

/// A thread-safe map with consume-on-fetch semantics, used for the job
/// result store (C2).
pub struct LockedStore<K, V> {
    inner: Mutex<std::collections::HashMap<K, V>>,
}

impl<K, V> Default for LockedStore<K, V>
where
    K: Eq + std::hash::Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> LockedStore<K, V>
where
    K: Eq + std::hash::Hash,
{
    pub fn new() -> Self {
        LockedStore {
            inner: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Inserts `v` under `k`, overwriting any previous value.
    pub fn insert(&self, k: K, v: V) {
        self.inner.lock().unwrap().insert(k, v);
    }

    /// Removes and returns the value under `k`, if present. A second call
    /// for the same key returns `None` until the next `insert`.
    pub fn fetch(&self, k: &K) -> Option<V> {
        self.inner.lock().unwrap().remove(k)
    }

    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        let inner = self.inner.lock().unwrap();
        for (k, v) in inner.iter() {
            f(k, v);
        }
    }

    pub fn contains(&self, k: &K) -> bool {
        self.inner.lock().unwrap().contains_key(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;

    #[test]
    fn fifo_order_preserved_for_push_back() {
        let q: LockedQueue<i32> = LockedQueue::new();
        q.push_back(1);
        q.push_back(2);
        q.push_back(3);
        let a = q.front_blocking(None).unwrap();
        assert_eq!(*a, 1);
        q.remove(&a);
        let b = q.front_blocking(None).unwrap();
        assert_eq!(*b, 2);
    }

    #[test]
    fn push_front_is_urgent() {
        let q: LockedQueue<i32> = LockedQueue::new();
        q.push_back(1);
        q.push_back(2);
        q.push_front(99);
        let front = q.front_blocking(None).unwrap();
        assert_eq!(*front, 99);
    }

    #[test]
    fn front_blocking_times_out_on_empty_queue() {
        let q: LockedQueue<i32> = LockedQueue::new();
        q.set_blocking(true);
        let start = Instant::now();
        let r = q.front_blocking(Some(Duration::from_millis(50)));
        assert!(r.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn front_blocking_released_by_push() {
        let q: StdArc<LockedQueue<i32>> = StdArc::new(LockedQueue::new());
        q.set_blocking(true);
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.front_blocking(None));
        thread::sleep(Duration::from_millis(30));
        q.push_back(42);
        let got = handle.join().unwrap();
        assert_eq!(*got.unwrap(), 42);
    }

    #[test]
    fn front_blocking_released_by_set_blocking_false_yields_none() {
        let q: StdArc<LockedQueue<i32>> = StdArc::new(LockedQueue::new());
        q.set_blocking(true);
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.front_blocking(None));
        thread::sleep(Duration::from_millis(30));
        q.set_blocking(false);
        let got = handle.join().unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn find_qorder_returns_zero_based_position() {
        let q: LockedQueue<i32> = LockedQueue::new();
        q.push_back(10);
        q.push_back(20);
        q.push_back(30);
        assert_eq!(q.find_qorder(|v| *v == 20), Some(1));
        assert_eq!(q.find_qorder(|v| *v == 999), None);
    }

    #[test]
    fn store_fetch_consumes_entry() {
        let store: LockedStore<u32, String> = LockedStore::new();
        store.insert(1, "hello".to_string());
        assert_eq!(store.fetch(&1), Some("hello".to_string()));
        assert_eq!(store.fetch(&1), None);
        store.insert(1, "again".to_string());
        assert_eq!(store.fetch(&1), Some("again".to_string()));
    }
}
