//! Leaf concurrency primitives for request admission.
//!
//! This crate has no notion of a virtual block device, an engine, or a
//! lifecycle. It only provides the pieces that are safe to reason about in
//! isolation: a fair counted semaphore ([`limiter`]), a single-timestamp
//! deadlock-avoidance FIFO ([`deadlock_queue`]), and the request data model
//! plus its pure classification function ([`classifier`]).

pub mod classifier;
pub mod deadlock_queue;
pub mod error;
pub mod limiter;
pub mod request;

pub use classifier::{classify, Route};
pub use deadlock_queue::DeadlockQueue;
pub use error::ClassifyError;
pub use limiter::{Limiter, Permit};
pub use request::{Operation, Request, RequestFlags};
