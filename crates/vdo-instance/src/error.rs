//! error.rs — error handling
//!
//! `ErrorKind` is the crate's internal error taxonomy; `HostCode` is the
//! small, stable surface handed back across the block-layer boundary. The
//! mapping from one to the other is generated by `#[derive(HostErrorCode)]`
//! from the `#[host_code(...)]` attribute on each `ErrorKind` variant,
//! reading codegen metadata straight off the variant it describes instead
//! of hand-writing a separate dispatch table.
//!
//! `capacity-exhausted` has no variant here: it is never surfaced
//! synchronously, so there is nothing to map.

use thiserror::Error;
use vdo_core::ClassifyError;
use vdo_macros::HostErrorCode;

/// The stable, small set of codes returned to the host block layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCode {
    /// `EINVAL`-equivalent: the classifier rejected the request.
    Invalid,
    /// A lifecycle transition was attempted from a state that disallows it.
    BadState,
    /// An administrative call attempted to modify an immutable field.
    ParameterMismatch,
    /// An administrative operation is already in progress.
    ComponentBusy,
    /// `EIO`-equivalent: read-only latch, or any unmapped engine failure.
    IoError,
    /// `ENOSPC`-equivalent: the backing device is out of space.
    OutOfSpace,
}

impl HostCode {
    /// The numeric code returned to the host, following Linux errno
    /// convention (negative magnitude of the corresponding `E*` constant).
    pub fn as_i32(self) -> i32 {
        match self {
            HostCode::Invalid => -22,           // EINVAL
            HostCode::BadState => -16,          // EBUSY
            HostCode::ParameterMismatch => -22, // EINVAL
            HostCode::ComponentBusy => -16,      // EBUSY
            HostCode::IoError => -5,            // EIO
            HostCode::OutOfSpace => -28,        // ENOSPC
        }
    }
}

/// The crate's internal error taxonomy.
#[derive(Error, Debug, Clone, HostErrorCode)]
pub enum ErrorKind {
    #[error("request rejected: {0}")]
    #[host_code(Invalid)]
    InvalidRequest(#[from] ClassifyError),

    #[error("lifecycle transition rejected: {0}")]
    #[host_code(BadState)]
    BadState(String),

    #[error("attempted to modify immutable field `{0}`")]
    #[host_code(ParameterMismatch)]
    ParameterMismatch(&'static str),

    #[error("administrative operation already in progress")]
    #[host_code(ComponentBusy)]
    ComponentBusy,

    #[error("engine has latched read-only")]
    #[host_code(IoError)]
    ReadOnly,

    #[error("backing device is out of space")]
    #[host_code(OutOfSpace)]
    NoSpace,

    #[error("internal engine failure: {0}")]
    #[host_code(IoError)]
    Internal(String),
}

impl ErrorKind {
    /// Convenience wrapper around the generated `to_host_code`.
    pub fn to_return_code(&self) -> i32 {
        self.to_host_code().as_i32()
    }
}

pub type VdoResult<T> = Result<T, ErrorKind>;

/// Raw numeric codes an Engine implementation may report to
/// [`crate::engine::EngineFacade`] callers. These two constants fill in an
/// otherwise-unspecified engine error numbering; see DESIGN.md.
pub const ENGINE_CODE_READ_ONLY: i32 = 1024;
pub const ENGINE_CODE_NO_SPACE: i32 = 1025;

/// Map a raw numeric code reported by the Engine to the code returned to
/// the host.
///
/// - Codes `<= 0` are system codes and pass through unchanged.
/// - Small positive codes (`1..1024`) are negated.
/// - Codes `>= 1024` are internal VDO codes mapped through the table above;
///   anything not explicitly recognized becomes a generic I/O error, logged
///   once at `error` level so the unmapped code is not silently lost.
pub fn map_engine_code(code: i32) -> i32 {
    match code {
        c if c <= 0 => c,
        c if c < 1024 => -c,
        ENGINE_CODE_READ_ONLY => HostCode::IoError.as_i32(),
        ENGINE_CODE_NO_SPACE => HostCode::OutOfSpace.as_i32(),
        other => {
            tracing::error!(code = other, "unmapped engine failure code, returning generic I/O error");
            HostCode::IoError.as_i32()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_codes_pass_through() {
        assert_eq!(map_engine_code(0), 0);
        assert_eq!(map_engine_code(-5), -5);
    }

    #[test]
    fn small_positive_codes_are_negated() {
        assert_eq!(map_engine_code(5), -5);
        assert_eq!(map_engine_code(1023), -1023);
    }

    #[test]
    fn internal_codes_map_through_table() {
        assert_eq!(map_engine_code(ENGINE_CODE_READ_ONLY), HostCode::IoError.as_i32());
        assert_eq!(map_engine_code(ENGINE_CODE_NO_SPACE), HostCode::OutOfSpace.as_i32());
        assert_eq!(map_engine_code(9999), HostCode::IoError.as_i32());
    }

    #[test]
    fn taxonomy_variants_map_to_expected_host_codes() {
        assert_eq!(ErrorKind::ComponentBusy.to_return_code(), -16);
        assert_eq!(ErrorKind::ReadOnly.to_return_code(), -5);
        assert_eq!(ErrorKind::NoSpace.to_return_code(), -28);
        assert_eq!(
            ErrorKind::ParameterMismatch("logical_block_size").to_return_code(),
            -22
        );
    }
}
