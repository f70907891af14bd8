//! deadlock_queue.rs — the deadlock-avoidance queue
//!
//! An intrusive bounded-memory FIFO guarded by a single lock, used on the
//! rare path where admitting a request from an Engine worker thread would
//! otherwise deadlock. A single arrival timestamp is attached to the queue
//! as a whole rather than to each entry: an accepted statistical
//! approximation, not a bug — the timestamp reflects only the oldest
//! deferral in a burst.

use std::collections::VecDeque;

use parking_lot::Mutex;

struct State<T> {
    items: VecDeque<T>,
    arrival_ticks: Option<u64>,
}

/// FIFO queue of deferred items of type `T`, plus the single shared arrival
/// timestamp described above.
pub struct DeadlockQueue<T> {
    state: Mutex<State<T>>,
}

impl<T> Default for DeadlockQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeadlockQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                arrival_ticks: None,
            }),
        }
    }

    /// Push a deferred item. If the queue was empty, `arrival_ticks`
    /// becomes the queue's shared timestamp; if it was already non-empty,
    /// `arrival_ticks` is discarded (the stored value, from the first push
    /// of this burst, is kept).
    pub fn push(&self, item: T, arrival_ticks: u64) {
        let mut state = self.state.lock();
        if state.items.is_empty() {
            state.arrival_ticks = Some(arrival_ticks);
        }
        state.items.push_back(item);
    }

    /// Pop the oldest deferred item along with the queue's shared arrival
    /// timestamp. Clears the timestamp once the queue drains to empty.
    pub fn pop(&self) -> Option<(T, u64)> {
        let mut state = self.state.lock();
        let item = state.items.pop_front()?;
        let ticks = state
            .arrival_ticks
            .expect("arrival_ticks must be set while items is non-empty");
        if state.items.is_empty() {
            state.arrival_ticks = None;
        }
        Some((item, ticks))
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
