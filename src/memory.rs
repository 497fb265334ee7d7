//! Global memory budget. A single counter bounded by
//! `base`; `acquire` suspends the caller (FIFO) until enough is available,
//! `release` credits back and wakes the next waiter in line.
//!
//! `acquire` returns a RAII [`MemoryPermit`]: dropping it releases the debit
//! automatically, which is what gives the "a cancelled upload still
//! releases its memory debit" property for free -
//! there is no code path that can forget to call `release`.

use std::sync::{Arc, Condvar, Mutex};

struct State {
    available: usize,
    base: usize,
    /// Ticket of the next waiter allowed to attempt an acquire, enforcing
    /// FIFO fairness so a large allocation is never starved by a stream of
    /// small ones.
    next_ticket: u64,
    now_serving: u64,
}

pub struct MemoryManager {
    state: Mutex<State>,
    condvar: Condvar,
}

pub struct MemoryPermit {
    manager: Arc<MemoryManager>,
    amount: usize,
}

impl MemoryManager {
    pub fn new(base: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                available: base,
                base,
                next_ticket: 0,
                now_serving: 0,
            }),
            condvar: Condvar::new(),
        })
    }

    pub fn base(&self) -> usize {
        self.state.lock().expect("memory lock poisoned").base
    }

    pub fn available(&self) -> usize {
        self.state.lock().expect("memory lock poisoned").available
    }

    /// Blocks the calling thread until `amount` bytes are available, then
    /// debits them and returns a permit. `amount` may exceed `base`, in
    /// which case this blocks forever unless the budget is later resized -
    /// callers should validate requests against `base()` up front.
    pub fn acquire(self: &Arc<Self>, amount: usize) -> MemoryPermit {
        let mut guard = self.state.lock().expect("memory lock poisoned");
        let my_ticket = guard.next_ticket;
        guard.next_ticket += 1;
        loop {
            if guard.now_serving == my_ticket && guard.available >= amount {
                guard.available -= amount;
                guard.now_serving += 1;
                // Wake the next waiter in case it can also proceed (e.g. a
                // small request behind a still-blocked large one would
                // otherwise never get re-checked).
                self.condvar.notify_all();
                return MemoryPermit {
                    manager: Arc::clone(self),
                    amount,
                };
            }
            guard = self.condvar.wait(guard).expect("memory lock poisoned");
        }
    }

    /// Non-blocking variant used by callers that want to reject a task
    /// instead of waiting (e.g. tests asserting the invariant holds without
    /// a dedicated thread).
    pub fn try_acquire(self: &Arc<Self>, amount: usize) -> Option<MemoryPermit> {
        let mut guard = self.state.lock().expect("memory lock poisoned");
        if guard.now_serving == guard.next_ticket && guard.available >= amount {
            guard.available -= amount;
            guard.next_ticket += 1;
            guard.now_serving += 1;
            Some(MemoryPermit {
                manager: Arc::clone(self),
                amount,
            })
        } else {
            None
        }
    }

    fn release(&self, amount: usize) {
        let mut guard = self.state.lock().expect("memory lock poisoned");
        let (new_available, overflowed) = guard.available.overflowing_add(amount);
        if overflowed || new_available > guard.base {
            log::error!(
                "critical: memory manager release overflow (available={}, base={}, release={})",
                guard.available,
                guard.base,
                amount
            );
            guard.available = guard.base;
        } else {
            guard.available = new_available;
        }
        self.condvar.notify_all();
    }
}

impl Drop for MemoryPermit {
    fn drop(&mut self) {
        self.manager.release(self.amount);
    }
}

impl MemoryPermit {
    pub fn amount(&self) -> usize {
        self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_then_release_restores_availability() {
        let mgr = MemoryManager::new(100);
        {
            let _permit = mgr.acquire(40);
            assert_eq!(mgr.available(), 60);
        }
        assert_eq!(mgr.available(), 100);
    }

    #[test]
    fn second_waiter_unblocks_after_release() {
        let mgr = MemoryManager::new(10);
        let permit = mgr.acquire(10);
        assert_eq!(mgr.available(), 0);

        let mgr2 = Arc::clone(&mgr);
        let handle = thread::spawn(move || {
            let _p = mgr2.acquire(10);
        });

        thread::sleep(Duration::from_millis(50));
        drop(permit);
        handle.join().unwrap();
        assert_eq!(mgr.available(), 10);
    }

    #[test]
    fn fifo_ordering_serves_first_waiter_first() {
        let mgr = MemoryManager::new(10);
        let permit = mgr.acquire(10);

        let order = Arc::new(Mutex::new(Vec::new()));
        let mgr_a = Arc::clone(&mgr);
        let order_a = Arc::clone(&order);
        let a = thread::spawn(move || {
            let _p = mgr_a.acquire(10);
            order_a.lock().unwrap().push('a');
        });
        thread::sleep(Duration::from_millis(20));

        let mgr_b = Arc::clone(&mgr);
        let order_b = Arc::clone(&order);
        let b = thread::spawn(move || {
            let _p = mgr_b.acquire(10);
            order_b.lock().unwrap().push('b');
        });
        thread::sleep(Duration::from_millis(20));

        drop(permit);
        a.join().unwrap();
        b.join().unwrap();
        assert_eq!(*order.lock().unwrap(), vec!['a', 'b']);
    }

    #[test]
    fn never_exceeds_base() {
        let mgr = MemoryManager::new(50);
        let _p1 = mgr.try_acquire(30).unwrap();
        assert!(mgr.try_acquire(30).is_none());
        assert_eq!(mgr.available(), 20);
    }
}
