//! admission.rs — the AdmissionController
//!
//! Gates every incoming request through the request limiter (and, for
//! discards, the discard limiter too), defers to the deadlock queue when
//! admission is attempted from one of the Engine's own worker threads, and
//! drains that queue again as completions free capacity.

use std::sync::Arc;

use tracing::{instrument, warn};
use vdo_core::{classify, DeadlockQueue, Limiter, Operation, Permit, Request, Route};

use crate::engine::{Completion, EngineFacade, PermitBundle};
use crate::error::ErrorKind;
use crate::flush::FlushPipeline;
use crate::lifecycle::{LifecycleMachine, LifecycleState};
use crate::stats::Stats;

pub const DEFAULT_REQUEST_LIMIT: u32 = 2000;

pub fn default_discard_limit(request_limit: u32) -> u32 {
    (request_limit as u64 * 3 / 4) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Submitted,
    Remapped,
    Error(i32),
}

pub struct AdmissionController {
    request_limiter: Limiter,
    discard_limiter: Limiter,
    deadlock_queue: DeadlockQueue<Request>,
    stats: Stats,
    engine: Arc<dyn EngineFacade>,
    lifecycle: Arc<LifecycleMachine>,
    flush: Arc<FlushPipeline>,
}

impl AdmissionController {
    pub fn new(
        request_limit: u32,
        engine: Arc<dyn EngineFacade>,
        lifecycle: Arc<LifecycleMachine>,
        flush: Arc<FlushPipeline>,
    ) -> Self {
        AdmissionController {
            request_limiter: Limiter::new("request", request_limit),
            discard_limiter: Limiter::new("discard", default_discard_limit(request_limit)),
            deadlock_queue: DeadlockQueue::new(),
            stats: Stats::new(),
            engine,
            lifecycle,
            flush,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn request_limiter(&self) -> &Limiter {
        &self.request_limiter
    }

    pub fn discard_limiter(&self) -> &Limiter {
        &self.discard_limiter
    }

    pub fn deadlock_queue_len(&self) -> usize {
        self.deadlock_queue.len()
    }

    #[instrument(skip(self, request), fields(op = ?request.operation))]
    pub fn submit(&self, request: Request) -> DispatchOutcome {
        if self.lifecycle.state() != LifecycleState::Running {
            self.stats.record_rejected();
            return DispatchOutcome::Error(
                ErrorKind::BadState("submit is only permitted while RUNNING".into()).to_return_code(),
            );
        }

        self.stats.record_operation(request.operation);

        let route = match classify(&request, self.engine.flush_delegated()) {
            Ok(route) => route,
            Err(e) => {
                self.stats.record_rejected();
                return DispatchOutcome::Error(ErrorKind::InvalidRequest(e).to_return_code());
            }
        };

        self.stats.record_submitted();
        match route {
            Route::FlushOwn | Route::FlushPassthrough => self.flush.handle(request, route),
            Route::Discard => self.admit(request, true),
            Route::Data => self.admit(request, false),
        }
    }

    fn admit(&self, request: Request, is_discard: bool) -> DispatchOutcome {
        if self.engine.worker_pool_contains() {
            self.admit_reentrant(request, is_discard)
        } else {
            self.admit_blocking(request, is_discard)
        }
    }

    /// The non-blocking path: submission from one of this Instance's own
    /// Engine worker threads must never block.
    fn admit_reentrant(&self, request: Request, is_discard: bool) -> DispatchOutcome {
        match self.request_limiter.acquire_poll() {
            Some(request_permit) => {
                let discard_permit = if is_discard { self.discard_limiter.acquire_poll() } else { None };
                self.hand_off(request, request_permit, discard_permit)
            }
            None => {
                let arrival_ticks = request.arrival_ticks;
                self.deadlock_queue.push(request, arrival_ticks);
                self.stats.record_deferred();
                warn!("deferred request to the deadlock queue to avoid an engine worker re-entry deadlock");
                DispatchOutcome::Submitted
            }
        }
    }

    /// The normal blocking path. A discard acquires its sub-limit permit
    /// before the request permit, so a discard can never hold a request
    /// permit while parked on the discard limiter.
    fn admit_blocking(&self, request: Request, is_discard: bool) -> DispatchOutcome {
        let discard_permit = if is_discard {
            Some(self.discard_limiter.acquire_blocking())
        } else {
            None
        };
        let request_permit = self.request_limiter.acquire_blocking();
        self.hand_off(request, request_permit, discard_permit)
    }

    fn hand_off(&self, request: Request, request_permit: Permit, discard_permit: Option<Permit>) -> DispatchOutcome {
        let bundle = PermitBundle { request_permit, discard_permit };
        match self.engine.submit(request, bundle) {
            Ok(()) => DispatchOutcome::Submitted,
            // The Engine is the contractual owner of the permits from this
            // point even on error; the controller never releases them here.
            Err(e) => DispatchOutcome::Error(e.to_return_code()),
        }
    }

    /// Consume a completion report: drain up to `completion.count` deferred
    /// requests off the deadlock queue, transferring the freed capacity to
    /// them directly so they are serviced ahead of any ordinary blocked
    /// waiter, then return whatever is left over to the limiter.
    pub fn on_completion(&self, completion: Completion) {
        if completion.discard_permits > 0 {
            self.discard_limiter.release_many(completion.discard_permits as u32);
        }

        let mut permits = self
            .request_limiter
            .release_reserving(completion.count as u32, completion.count as u32);

        while let Some(permit) = permits.pop() {
            match self.deadlock_queue.pop() {
                Some((request, _arrival_ticks)) => self.relaunch(request, permit),
                None => {
                    permits.push(permit);
                    break;
                }
            }
        }

        if !permits.is_empty() {
            self.request_limiter.release_many(permits.len() as u32);
        }
    }

    fn relaunch(&self, request: Request, request_permit: Permit) {
        let discard_permit = if request.operation == Operation::Discard {
            self.discard_limiter.acquire_poll()
        } else {
            None
        };
        if let DispatchOutcome::Error(code) = self.hand_off(request, request_permit, discard_permit) {
            tracing::error!(code, "relaunch of a deferred request failed at the engine");
        }
    }
}
