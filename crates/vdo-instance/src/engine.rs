//! engine.rs — the external engine contract
//!
//! The trait the admission/flush/lifecycle machinery requires from the
//! underlying storage engine. `#[cfg_attr(test, mockall::automock)]`
//! generates `MockEngineFacade` for unit tests, mocking the engine's
//! OS-facing surface instead of standing up a real backing resource per
//! test.
//!
//! Completion is modeled as a message, not a direct upcall: an
//! `EngineFacade` implementation reports work done by sending a
//! [`Completion`] down the channel it was constructed with, and the
//! `AdmissionController` drains that channel on a thread it controls, so
//! permit release never happens inside an arbitrary engine callback stack.

use crossbeam::channel::{unbounded, Receiver, Sender};
use vdo_core::{Permit, Request};

use crate::error::ErrorKind;

/// Permits transferred to the Engine for the lifetime of one request. The
/// discard permit is present only for discard requests, and even then only
/// when the best-effort poll on the reentrant admission path succeeded.
pub struct PermitBundle {
    pub request_permit: Permit,
    pub discard_permit: Option<Permit>,
}

/// A completion report: `request_id` is opaque to the core (the Engine
/// assigns and remembers it), `count` is how many requests this message
/// completes — batched completions release `count` permits at once via
/// `release_many`.
#[derive(Debug, Clone, Copy)]
pub struct Completion {
    pub request_id: u64,
    pub count: usize,
    pub discard_permits: usize,
}

pub type CompletionSender = Sender<Completion>;
pub type CompletionReceiver = Receiver<Completion>;

pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    unbounded()
}

#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
pub trait EngineFacade: Send + Sync {
    /// Take ownership of `request` and `permits`. Must eventually result in
    /// a [`Completion`] sent on the channel this Engine was wired to,
    /// even if that completion happens synchronously and immediately.
    fn submit(&self, request: Request, permits: PermitBundle) -> Result<(), ErrorKind>;

    /// Take ownership of a flush request that carries no permits (flush
    /// payload size is always zero). Completion is still reported through
    /// the same channel as [`EngineFacade::submit`].
    fn submit_flush(&self, request: Request) -> Result<(), ErrorKind>;

    /// Toggle the write packer; returns the previous value.
    fn set_compressing(&self, enabled: bool) -> bool;

    fn suspend(&self, no_flush: bool) -> Result<(), ErrorKind>;
    fn resume(&self) -> Result<(), ErrorKind>;
    fn stop(&self) -> Result<(), ErrorKind>;
    fn destroy(&self);

    /// Suspend the external deduplication collaborator, persisting its
    /// state iff `save` is set.
    fn suspend_dedupe(&self, save: bool) -> Result<(), ErrorKind>;
    fn resume_dedupe(&self) -> Result<(), ErrorKind>;

    /// Force the Engine into a fail-safe state where only reads of
    /// already-mapped data succeed.
    fn set_read_only(&self, error_code: i32);

    fn prepare_grow_logical(&self, logical_bytes: u64) -> Result<(), ErrorKind>;
    fn grow_logical(&self, logical_bytes: u64) -> Result<(), ErrorKind>;
    fn prepare_grow_physical(&self, physical_blocks: u64) -> Result<(), ErrorKind>;
    fn grow_physical(&self, physical_blocks: u64) -> Result<(), ErrorKind>;

    /// The reentrancy test: true iff the calling thread is registered with
    /// this Engine's own worker-pool subsystem.
    fn worker_pool_contains(&self) -> bool;

    /// True when the underlying device, not this Engine, owns flush
    /// semantics ("flush-passthrough").
    fn flush_delegated(&self) -> bool;

    /// Issue a single write-preflush request to the backing device and
    /// block until it completes.
    fn synchronous_flush(&self) -> Result<(), ErrorKind>;

    /// Read the geometry block at block 0 through a single-block reader
    /// installed temporarily on this Engine's layer.
    fn read_geometry_block(&self) -> Result<[u8; crate::geometry::GEOMETRY_BLOCK_SIZE], ErrorKind>;
}
