//! Fair Output Lock
//!
//! A FIFO ticket lock. Waiters are served strictly in arrival order, so no
//! caller can be starved by others re-acquiring. The lock is not
//! reentrant and only the holding thread can release it, which makes a
//! stray second release harmless.
//!
//! `interrupt` fails every current and future waiter with
//! `LockInterrupted`; sessions use it when they are closed.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct TicketState {
    next_ticket: u64,
    now_serving: u64,
    holder: Option<ThreadId>,
    interrupted: bool,
}

/// First-come-first-served mutual exclusion
#[derive(Debug, Default)]
pub struct FairLock {
    state: Mutex<TicketState>,
    turn: Condvar,
}

impl FairLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every earlier caller has had its turn
    pub fn lock(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.interrupted {
            return Err(Error::LockInterrupted);
        }
        if state.holder == Some(me) {
            return Err(Error::SessionMisuse("output lock is already held by this thread"));
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        while state.now_serving != ticket {
            self.turn.wait(&mut state);
            if state.interrupted {
                return Err(Error::LockInterrupted);
            }
        }
        state.holder = Some(me);
        log::trace!("output lock granted to ticket {ticket}");
        Ok(())
    }

    /// Release the lock if the calling thread holds it.
    ///
    /// Returns whether anything was released.
    pub fn release(&self) -> bool {
        let mut state = self.state.lock();
        if state.holder != Some(thread::current().id()) {
            return false;
        }
        state.holder = None;
        state.now_serving += 1;
        self.turn.notify_all();
        true
    }

    /// Fail all waiters and refuse further acquisition
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupted = true;
        self.turn.notify_all();
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().holder.is_some()
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().holder == Some(thread::current().id())
    }

    /// Tickets issued but not yet released, the holder included
    pub fn queued(&self) -> u64 {
        let state = self.state.lock();
        state.next_ticket - state.now_serving
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn wait_for_queue(lock: &FairLock, len: u64) {
        while lock.queued() < len {
            thread::yield_now();
        }
    }

    #[test]
    fn test_lock_release() {
        let lock = FairLock::new();
        lock.lock().unwrap();
        assert!(lock.is_held_by_current_thread());
        assert!(lock.release());
        assert!(!lock.release());
        assert!(!lock.is_held());
    }

    #[test]
    fn test_not_reentrant() {
        let lock = FairLock::new();
        lock.lock().unwrap();
        assert!(matches!(lock.lock(), Err(Error::SessionMisuse(_))));
        assert!(lock.release());
    }

    #[test]
    fn test_release_from_other_thread_is_ignored() {
        let lock = Arc::new(FairLock::new());
        lock.lock().unwrap();
        let other = Arc::clone(&lock);
        assert!(!thread::spawn(move || other.release()).join().unwrap());
        assert!(lock.is_held_by_current_thread());
        lock.release();
    }

    #[test]
    fn test_fifo_order() {
        let lock = Arc::new(FairLock::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        lock.lock().unwrap();

        let mut handles = Vec::new();
        for i in 0..6u64 {
            let thread_lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                thread_lock.lock().unwrap();
                order.lock().push(i);
                thread_lock.release();
            }));
            // Each thread must hold its ticket before the next one starts
            wait_for_queue(&lock, i + 2);
        }
        lock.release();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_interrupt_wakes_waiters() {
        let lock = Arc::new(FairLock::new());
        lock.lock().unwrap();
        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.lock())
        };
        wait_for_queue(&lock, 2);
        thread::sleep(Duration::from_millis(10));
        lock.interrupt();
        assert!(matches!(waiter.join().unwrap(), Err(Error::LockInterrupted)));
        assert!(matches!(lock.lock(), Err(Error::LockInterrupted)));
    }
}
