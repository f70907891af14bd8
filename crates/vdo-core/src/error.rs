//! error.rs

use thiserror::Error;

/// Rejection from [`crate::classify`]. Mirrors the `invalid-request` leaf of
/// the wider error taxonomy in `vdo-instance`, kept local here so this crate
/// does not depend on the aggregate.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClassifyError {
    /// A flush or pre-flush marked request carried a nonzero payload.
    #[error("flush-bearing request must carry zero payload bytes")]
    FlushPayloadNotEmpty,
    /// A non-flush request carried a zero payload.
    #[error("data request must carry a nonzero payload")]
    EmptyDataPayload,
}
