//! # Synchronization hub
//!
//! One mutex, one condition variable, one dispatcher handle — shared by
//! every stream of a session. All mutation of stream state happens while
//! holding the hub mutex; completions write a result slot under the lock and
//! then broadcast. Waiters always recheck their own predicate in a loop:
//! completions wake *all* waiters, and unrelated ones must go back to sleep.
//!
//! The hub is passed explicitly to every bridge object at construction; it
//! is not a global.
//!
//! ## `HubCell`
//!
//! Stream state lives in [`HubCell`]s: `UnsafeCell` wrappers whose contents
//! may only be touched while holding the owning hub's mutex, witnessed by a
//! `&mut` borrow of the guard.
//!
//! # Safety
//!
//! Every `HubCell` of a session is protected by that session's single hub
//! mutex. Access requires an exclusive borrow of the hub guard, so at most
//! one `&mut` into any cell exists at a time. Callers must pass the guard of
//! the hub that owns the cell's stream; bridge objects guarantee this by
//! construction (each stores the one hub it was built with).

use hostio_core::dispatch::{Dispatch, Task};

use std::cell::UnsafeCell;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Guard for the hub mutex.
pub type HubGuard<'a> = MutexGuard<'a, ()>;

/// Sentinel slot value: operation still pending.
pub const PENDING: i64 = i64::MIN;

/// The per-session synchronization hub.
pub struct Hub {
    dispatcher: Arc<dyn Dispatch>,
    lock: Mutex<()>,
    cond: Condvar,
}

impl Hub {
    pub fn new(dispatcher: Arc<dyn Dispatch>) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            lock: Mutex::new(()),
            cond: Condvar::new(),
        })
    }

    /// Run `task` on the event-loop thread.
    pub fn dispatch(&self, task: Task) {
        self.dispatcher.post(task);
    }

    /// Run `task` on the event-loop thread after `delay`.
    pub fn dispatch_after(&self, delay: Duration, task: Task) {
        self.dispatcher.post_after(delay, task);
    }

    /// The dispatch handle, for host backends constructed per-session.
    pub fn dispatcher(&self) -> Arc<dyn Dispatch> {
        self.dispatcher.clone()
    }

    pub fn lock(&self) -> HubGuard<'_> {
        self.lock.lock().unwrap()
    }

    /// Sleep on the condition variable. The caller rechecks its predicate.
    pub fn wait<'a>(&self, guard: HubGuard<'a>) -> HubGuard<'a> {
        self.cond.wait(guard).unwrap()
    }

    /// Wake every waiter.
    pub fn broadcast(&self) {
        self.cond.notify_all();
    }

    /// Block the calling thread until `slot` is no longer pending and
    /// return its final value. Tolerates spurious wakeups and broadcasts
    /// meant for other waiters.
    pub fn wait_while_pending(&self, slot: &OpSlot) -> i64 {
        let mut guard = self.lock();
        loop {
            let value = slot.get(&mut guard);
            if value != PENDING {
                return value;
            }
            guard = self.wait(guard);
        }
    }

    /// Write `value` into `slot` and wake all waiters.
    pub fn complete(&self, guard: &mut HubGuard<'_>, slot: &OpSlot, value: i64) {
        slot.set(guard, value);
        self.cond.notify_all();
    }
}

/// State cell guarded by the hub mutex. See the module-level safety notes.
pub struct HubCell<T> {
    value: UnsafeCell<T>,
}

// Safety: contents are only reachable through `get_mut`, which demands an
// exclusive borrow of the hub guard (module-level invariant).
unsafe impl<T: Send> Sync for HubCell<T> {}

impl<T> HubCell<T> {
    pub fn new(value: T) -> Self {
        Self { value: UnsafeCell::new(value) }
    }

    /// Exclusive access to the contents while the hub is locked.
    #[allow(clippy::mut_from_ref)]
    pub fn get_mut<'a>(&'a self, _guard: &'a mut HubGuard<'_>) -> &'a mut T {
        unsafe { &mut *self.value.get() }
    }
}

/// Result slot for one pending operation.
///
/// Transient: created by the blocking call, shared with the event-loop
/// closures of that one operation, discarded when the call returns. Holds
/// [`PENDING`] until the completion writes a final value (result ≥ 0, or a
/// negative errno-style code).
pub struct OpSlot {
    value: HubCell<i64>,
}

impl OpSlot {
    pub fn pending() -> Arc<Self> {
        Arc::new(Self { value: HubCell::new(PENDING) })
    }

    pub fn get(&self, guard: &mut HubGuard<'_>) -> i64 {
        *self.value.get_mut(guard)
    }

    pub fn set(&self, guard: &mut HubGuard<'_>, value: i64) {
        *self.value.get_mut(guard) = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use std::thread;

    #[test]
    fn wait_while_pending_returns_completion_value() {
        let ev = EventLoop::start();
        let hub = Hub::new(ev.handle());
        let slot = OpSlot::pending();

        let hub2 = hub.clone();
        let slot2 = slot.clone();
        let completer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            let mut guard = hub2.lock();
            hub2.complete(&mut guard, &slot2, 7);
        });

        assert_eq!(hub.wait_while_pending(&slot), 7);
        completer.join().unwrap();
    }

    #[test]
    fn waiter_survives_unrelated_broadcasts() {
        let ev = EventLoop::start();
        let hub = Hub::new(ev.handle());
        let slot = OpSlot::pending();

        let hub2 = hub.clone();
        let slot2 = slot.clone();
        let completer = thread::spawn(move || {
            // Broadcasts that do not complete the slot must not wake the
            // waiter for good.
            for _ in 0..5 {
                thread::sleep(Duration::from_millis(5));
                hub2.broadcast();
            }
            let mut guard = hub2.lock();
            hub2.complete(&mut guard, &slot2, -(libc::EIO as i64));
        });

        assert_eq!(hub.wait_while_pending(&slot), -(libc::EIO as i64));
        completer.join().unwrap();
    }

    #[test]
    fn dispatch_runs_on_event_loop() {
        let ev = EventLoop::start();
        let hub = Hub::new(ev.handle());
        let slot = OpSlot::pending();

        let hub2 = hub.clone();
        let slot2 = slot.clone();
        hub.dispatch(Box::new(move || {
            let mut guard = hub2.lock();
            hub2.complete(&mut guard, &slot2, 1);
        }));

        assert_eq!(hub.wait_while_pending(&slot), 1);
    }
}
