//! Worker template (C5): a thread that drains one queue, processes each
//! head item, and removes it once the result has been recorded.
//!
//! Mirrors the reference codebase's `ThreadBuilder().name(..).priority(..)`
//! pattern for its real-time-ish threads (see `core/src/world.rs`): workers
//! that touch the SPI/MIDI planes ask for elevated priority since a stall
//! there is audible.

use crate::queue::LockedQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thread_priority::{ThreadBuilder, ThreadPriority};

/// A started worker's handle: `stop` reverses exactly what `start` did.
pub struct Worker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a thread that repeatedly calls `front_blocking` on `queue`
    /// and, for each head item, invokes `step`. `step` is responsible for
    /// eventually calling `queue.remove` on the item it was given (workers
    /// that write a result before removing rely on this to satisfy the
    /// "never disappears without a result" guarantee).
    pub fn start<T>(
        name: &str,
        realtime: bool,
        queue: Arc<LockedQueue<T>>,
        mut step: impl FnMut(Arc<T>) + Send + 'static,
    ) -> Worker
    where
        T: Send + Sync + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        queue.set_blocking(true);
        let running_thread = running.clone();
        let queue_thread = queue;
        let priority = if realtime { ThreadPriority::Max } else { ThreadPriority::Min };
        let handle = ThreadBuilder::default()
            .name(name.to_string())
            .priority(priority)
            .spawn(move |_| {
                while running_thread.load(Ordering::SeqCst) {
                    let Some(item) = queue_thread.front_blocking(Some(Duration::from_millis(250)))
                    else {
                        // Non-blocking queues return `None` immediately
                        // rather than waiting out the timeout; sleep a
                        // little so an empty non-blocking queue doesn't
                        // spin the CPU.
                        std::thread::sleep(Duration::from_millis(2));
                        continue;
                    };
                    step(item);
                }
            })
            .expect("failed to spawn worker thread");
        Worker { running, handle: Some(handle) }
    }

    /// Stops the worker: clears the running flag, disables blocking on
    /// `queue` to release the drain thread if it is waiting, then joins.
    pub fn stop<T>(&mut self, queue: &LockedQueue<T>) {
        self.running.store(false, Ordering::SeqCst);
        queue.set_blocking(false);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn worker_drains_items_in_order() {
        let queue: Arc<LockedQueue<i32>> = Arc::new(LockedQueue::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_thread = seen.clone();
        let queue_for_worker = queue.clone();
        let mut worker = Worker::start("test-worker", false, queue.clone(), move |item| {
            seen_thread.lock().unwrap().push(*item);
            queue_for_worker.remove(&item);
        });
        queue.push_back(1);
        queue.push_back(2);
        queue.push_back(3);
        // Give the worker a moment to drain.
        std::thread::sleep(Duration::from_millis(100));
        worker.stop(&queue);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
