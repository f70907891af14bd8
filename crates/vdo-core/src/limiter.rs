//! limiter.rs — a fair counted semaphore
//!
//! A counted semaphore with FIFO-fair blocking acquire, non-blocking poll,
//! bulk release, and an idle wait. Built on `parking_lot::{Mutex, Condvar}`
//! rather than `std::sync`'s equivalents, for cheaper uncontended locking
//! and no poisoning to thread through every call site.
//!
//! Fairness is implemented with an explicit FIFO queue of waiter tickets
//! rather than relying on the OS's notification order, which `Condvar`
//! alone does not guarantee: each blocked caller parks on its own ticket
//! and `release` grants tickets strictly in arrival order.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

/// A single unit of admission capacity, acquired from a [`Limiter`] and
/// handed to the Engine. Carries no data; release is by count
/// ([`Limiter::release_many`]), not by returning this token, because the
/// Engine is the sole owner of a permit for the lifetime of the request and
/// frees it only through the completion-batch path.
#[derive(Debug)]
#[must_use = "a permit must be handed to the Engine or explicitly forgotten on an error path"]
pub struct Permit {
    _private: (),
}

impl Permit {
    fn new() -> Self {
        Self { _private: () }
    }
}

struct Ticket {
    granted: Mutex<bool>,
    woken: Condvar,
}

impl Ticket {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            granted: Mutex::new(false),
            woken: Condvar::new(),
        })
    }

    fn wait(&self) {
        let mut granted = self.granted.lock();
        while !*granted {
            self.woken.wait(&mut granted);
        }
    }

    fn grant(&self) {
        *self.granted.lock() = true;
        self.woken.notify_one();
    }
}

struct State {
    limit: u32,
    free: u32,
    waiters: VecDeque<Arc<Ticket>>,
}

/// A fair counted semaphore.
///
/// Invariant held at every quiescent point: `outstanding + free == limit`,
/// where `outstanding` is `limit - free` (see [`Limiter::outstanding`]).
pub struct Limiter {
    name: &'static str,
    state: Mutex<State>,
    idle: Condvar,
}

impl Limiter {
    pub fn new(name: &'static str, limit: u32) -> Self {
        Self {
            name,
            state: Mutex::new(State {
                limit,
                free: limit,
                waiters: VecDeque::new(),
            }),
            idle: Condvar::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.state.lock().limit
    }

    /// Units currently held by in-flight requests.
    pub fn outstanding(&self) -> u32 {
        let state = self.state.lock();
        state.limit - state.free
    }

    /// Non-blocking acquire. Returns `None` immediately if no capacity is
    /// free or another caller is already queued ahead (queued callers must
    /// be served first to preserve FIFO order for blocked acquirers).
    pub fn acquire_poll(&self) -> Option<Permit> {
        let mut state = self.state.lock();
        if state.free > 0 && state.waiters.is_empty() {
            state.free -= 1;
            Some(Permit::new())
        } else {
            None
        }
    }

    /// Blocking acquire. Parks the calling thread in FIFO order with
    /// respect to other blocked waiters until a unit is free.
    ///
    /// Callers on an Engine worker thread must never reach this method —
    /// that is the entire purpose of the reentrancy test in
    /// `AdmissionController::submit`.
    pub fn acquire_blocking(&self) -> Permit {
        let mut state = self.state.lock();
        if state.free > 0 && state.waiters.is_empty() {
            state.free -= 1;
            return Permit::new();
        }
        let ticket = Ticket::new();
        state.waiters.push_back(Arc::clone(&ticket));
        drop(state);
        ticket.wait();
        Permit::new()
    }

    /// Release one unit.
    pub fn release_one(&self) {
        self.release_many(1)
    }

    /// Release `n` units, waking up to `n` FIFO-ordered waiters. Safe to
    /// call from any context, including a context that never blocks.
    pub fn release_many(&self, n: u32) {
        if n == 0 {
            return;
        }
        let mut state = self.state.lock();
        let mut remaining = n;
        while remaining > 0 {
            match state.waiters.pop_front() {
                Some(ticket) => {
                    ticket.grant();
                    remaining -= 1;
                }
                None => break,
            }
        }
        state.free += remaining;
        trace!(limiter = self.name, released = n, free = state.free, "limiter release");
        if state.free == state.limit {
            self.idle.notify_all();
        }
    }

    /// Release `n` units, but reassign up to `reserve` of them directly to
    /// the caller as fresh [`Permit`]s instead of making them available to
    /// `acquire_*`. The reassigned units are never added back to `free`, so
    /// `outstanding + free == limit` holds throughout — they are a direct
    /// transfer, not a release-then-reacquire.
    ///
    /// Used by the deadlock-queue drain on completion: entries already
    /// deferred there must be serviced before any ordinary blocked waiter
    /// gets a chance at the capacity a completion just freed.
    pub fn release_reserving(&self, n: u32, reserve: u32) -> Vec<Permit> {
        let reserve = reserve.min(n);
        let reserved: Vec<Permit> = (0..reserve).map(|_| Permit::new()).collect();
        self.release_many(n - reserve);
        reserved
    }

    /// True iff no permits are currently outstanding.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.free == state.limit
    }

    /// Block until [`Limiter::is_idle`] transiently holds.
    ///
    /// Callers are responsible for having already stopped new admissions;
    /// this call does not itself prevent new `acquire_*` calls, and will
    /// never return if admission continues concurrently.
    pub fn wait_for_idle(&self) {
        let mut state = self.state.lock();
        while state.free != state.limit {
            self.idle.wait(&mut state);
        }
    }
}
