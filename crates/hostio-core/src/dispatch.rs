//! Event-loop dispatch abstraction.
//!
//! The host environment is single-threaded: every host API call and every
//! host completion runs on one event-loop thread. `Dispatch` is the handle
//! worker-side code (and host backends) use to get there.

use std::time::Duration;

/// A unit of work for the event-loop thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Schedules tasks onto the single event-loop thread.
///
/// **Contract:** tasks from one caller execute in submission order; there is
/// no cross-caller ordering guarantee. `post()` must not block indefinitely
/// (a full queue is retried, not dropped). Implementations never run a task
/// on the calling thread.
pub trait Dispatch: Send + Sync {
    /// Run `task` on the event-loop thread at the next opportunity.
    fn post(&self, task: Task);

    /// Run `task` on the event-loop thread no sooner than `delay` from now.
    fn post_after(&self, delay: Duration, task: Task);
}
