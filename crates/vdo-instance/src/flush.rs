//! flush.rs — the flush pipeline
//!
//! Any request carrying a pre-flush marker must not complete until every
//! previously acknowledged write is durable. The engine-owned path
//! serializes flush hand-off through a dedicated lock over a waiter list;
//! the delegated path just counts the flush and tells the host to redirect
//! it to the backing device.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use vdo_core::{Request, Route};

use crate::admission::DispatchOutcome;
use crate::engine::EngineFacade;
use crate::error::ErrorKind;

struct FlushState {
    waiters: VecDeque<u64>,
    next_id: u64,
    passthrough_count: u64,
}

pub struct FlushPipeline {
    engine: Arc<dyn EngineFacade>,
    state: Mutex<FlushState>,
}

impl FlushPipeline {
    pub fn new(engine: Arc<dyn EngineFacade>) -> Self {
        FlushPipeline {
            engine,
            state: Mutex::new(FlushState {
                waiters: VecDeque::new(),
                next_id: 0,
                passthrough_count: 0,
            }),
        }
    }

    /// Route a classified flush request. Panics if `route` is not one of
    /// the two flush routes — callers are expected to have already
    /// matched on `Route` before reaching here.
    pub fn handle(&self, request: Request, route: Route) -> DispatchOutcome {
        match route {
            Route::FlushOwn => self.handle_owned(request),
            Route::FlushPassthrough => self.handle_passthrough(),
            _ => unreachable!("FlushPipeline only handles flush routes"),
        }
    }

    fn handle_owned(&self, request: Request) -> DispatchOutcome {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.waiters.push_back(id);
            id
        };
        let outcome = match self.engine.submit_flush(request) {
            Ok(()) => DispatchOutcome::Submitted,
            Err(e) => DispatchOutcome::Error(e.to_return_code()),
        };
        self.state.lock().waiters.retain(|&w| w != id);
        outcome
    }

    fn handle_passthrough(&self) -> DispatchOutcome {
        self.state.lock().passthrough_count += 1;
        DispatchOutcome::Remapped
    }

    pub fn passthrough_count(&self) -> u64 {
        self.state.lock().passthrough_count
    }

    pub fn outstanding_flushes(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Issue a single write-preflush request to the backing device and
    /// block until it completes. On failure the Instance is latched
    /// read-only through the Engine and the error surfaces as `read-only`.
    pub fn synchronous_flush(&self) -> Result<(), ErrorKind> {
        const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(1);
        loop {
            match self.engine.synchronous_flush() {
                Ok(()) => return Ok(()),
                Err(ErrorKind::BadState(ref msg)) if msg == "interrupted" => {
                    std::thread::sleep(RETRY_DELAY);
                    continue;
                }
                Err(e) => {
                    self.engine.set_read_only(e.to_return_code());
                    return Err(ErrorKind::ReadOnly);
                }
            }
        }
    }
}
