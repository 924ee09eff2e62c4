//! # The event-loop thread
//!
//! One dedicated OS thread drains a lock-free MPMC task queue and a small
//! heap of delayed tasks. It is the only thread that ever touches the host
//! APIs: bridge code and host backends both reach it through the
//! [`Dispatch`] handle.
//!
//! The loop never blocks inside a task. When idle it sleeps briefly rather
//! than spinning.

use hostio_core::dispatch::{Dispatch, Task};

use crossbeam_queue::ArrayQueue;

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const IDLE_SLEEP: Duration = Duration::from_micros(50);

/// Event-loop configuration.
pub struct EventLoopConfig {
    /// Capacity of the task queue.
    pub queue_capacity: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self { queue_capacity: 4096 }
    }
}

/// Delayed task; ordered by due time (earliest first out of the heap),
/// sequence number breaking ties to keep per-caller submission order.
struct TimedTask {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for TimedTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}
impl Eq for TimedTask {}
impl PartialOrd for TimedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest due first.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct LoopShared {
    queue: ArrayQueue<Task>,
    delayed: Mutex<BinaryHeap<TimedTask>>,
    seq: AtomicU64,
    shutdown: AtomicBool,
}

/// Cloneable handle implementing [`Dispatch`].
pub struct Dispatcher {
    shared: Arc<LoopShared>,
}

impl Clone for Dispatcher {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl Dispatch for Dispatcher {
    fn post(&self, task: Task) {
        // If the queue is full, yield and retry. In practice the queue is
        // sized large enough that this is rare.
        let mut pending = task;
        loop {
            match self.shared.queue.push(pending) {
                Ok(()) => return,
                Err(returned) => {
                    thread::yield_now();
                    pending = returned;
                }
            }
        }
    }

    fn post_after(&self, delay: Duration, task: Task) {
        let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed);
        let mut delayed = self.shared.delayed.lock().unwrap();
        delayed.push(TimedTask { due: Instant::now() + delay, seq, task });
    }
}

/// Handle to the event loop (owns the thread).
pub struct EventLoop {
    shared: Arc<LoopShared>,
    thread: Option<thread::JoinHandle<()>>,
}

impl EventLoop {
    /// Spawn the event-loop thread with default configuration.
    pub fn start() -> Self {
        Self::start_with(EventLoopConfig::default())
    }

    pub fn start_with(config: EventLoopConfig) -> Self {
        let shared = Arc::new(LoopShared {
            queue: ArrayQueue::new(config.queue_capacity),
            delayed: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        });
        let shared_clone = shared.clone();

        let thread = thread::Builder::new()
            .name("hostio-loop".into())
            .spawn(move || {
                run_loop(shared_clone);
            })
            .expect("failed to spawn event-loop thread");

        Self { shared, thread: Some(thread) }
    }

    /// Get a dispatch handle for bridge objects and host backends.
    pub fn handle(&self) -> Arc<dyn Dispatch> {
        Arc::new(Dispatcher { shared: self.shared.clone() })
    }

    /// Stop the loop and join the thread. Pending tasks are dropped.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(shared: Arc<LoopShared>) {
    log::debug!("hostio-loop: started");

    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }

        let mut did_work = false;

        // ── Step 1: run queued tasks (bounded batch per iteration) ──
        for _ in 0..128 {
            match shared.queue.pop() {
                Some(task) => {
                    task();
                    did_work = true;
                }
                None => break,
            }
        }

        // ── Step 2: run due delayed tasks ──
        loop {
            let task = {
                let mut delayed = shared.delayed.lock().unwrap();
                match delayed.peek() {
                    Some(entry) if entry.due <= Instant::now() => {
                        Some(delayed.pop().unwrap().task)
                    }
                    _ => None,
                }
            };
            match task {
                Some(task) => {
                    task();
                    did_work = true;
                }
                None => break,
            }
        }

        if !did_work {
            thread::sleep(IDLE_SLEEP);
        }
    }

    log::debug!("hostio-loop: shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn tasks_run_in_submission_order() {
        let ev = EventLoop::start();
        let handle = ev.handle();
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            handle.post(Box::new(move || {
                tx.send(i).unwrap();
            }));
        }
        let got: Vec<i32> = (0..10).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn delayed_task_fires_after_delay() {
        let ev = EventLoop::start();
        let handle = ev.handle();
        let (tx, rx) = mpsc::channel();
        let started = Instant::now();
        handle.post_after(
            Duration::from_millis(20),
            Box::new(move || {
                tx.send(()).unwrap();
            }),
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn shutdown_joins_thread() {
        let mut ev = EventLoop::start();
        ev.shutdown();
        // Second shutdown is a no-op.
        ev.shutdown();
    }
}
