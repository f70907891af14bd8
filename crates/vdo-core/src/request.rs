//! request.rs
//!
//! The data model: an opaque unit of host I/O carrying an operation, a
//! payload size, the pre-flush/FUA markers, and an arrival timestamp in
//! monotonic ticks.

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// The four operations the host block layer may submit.
///
/// Decoded from the host's raw wire opcode via [`Operation::from_wire`]; an
/// opcode that does not map to one of these is rejected at the boundary: an
/// out-of-range opcode simply never becomes an `Operation` value in the
/// first place.
#[derive(FromPrimitive, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    Read = 0,
    Write = 1,
    Flush = 2,
    Discard = 3,
}

impl Operation {
    /// Decode a raw host opcode. `None` is the in-memory analogue of the
    /// classifier's "operation not in {READ,WRITE,FLUSH,DISCARD}" rejection.
    pub fn from_wire(opcode: u8) -> Option<Self> {
        Self::from_u8(opcode)
    }
}

bitflags! {
    /// Markers carried alongside an [`Operation`].
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct RequestFlags: u8 {
        /// All previously acknowledged writes must be durable before this
        /// request is acknowledged.
        const PRE_FLUSH = 0b0000_0001;
        /// This request's own data must be durable before it is acknowledged.
        const FUA = 0b0000_0010;
    }
}

/// A unit of host I/O.
///
/// Invariant (enforced by [`crate::classify`], not by the constructor): a
/// request with `operation == Flush` or `PRE_FLUSH` set has `payload_bytes
/// == 0`; every other request has a nonzero `payload_bytes`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub operation: Operation,
    pub payload_bytes: u32,
    pub flags: RequestFlags,
    pub arrival_ticks: u64,
}

impl Request {
    pub fn new(
        operation: Operation,
        payload_bytes: u32,
        flags: RequestFlags,
        arrival_ticks: u64,
    ) -> Self {
        Self {
            operation,
            payload_bytes,
            flags,
            arrival_ticks,
        }
    }

    pub fn is_pre_flush(&self) -> bool {
        self.operation == Operation::Flush || self.flags.contains(RequestFlags::PRE_FLUSH)
    }

    pub fn is_fua(&self) -> bool {
        self.flags.contains(RequestFlags::FUA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_opcodes() {
        assert_eq!(Operation::from_wire(0), Some(Operation::Read));
        assert_eq!(Operation::from_wire(3), Some(Operation::Discard));
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert_eq!(Operation::from_wire(4), None);
        assert_eq!(Operation::from_wire(255), None);
    }

    #[test]
    fn is_pre_flush_true_for_flush_operation_even_without_marker() {
        let req = Request::new(Operation::Flush, 0, RequestFlags::empty(), 0);
        assert!(req.is_pre_flush());
    }

    #[test]
    fn is_pre_flush_true_for_marker_on_a_write() {
        let req = Request::new(Operation::Write, 4096, RequestFlags::PRE_FLUSH, 0);
        assert!(req.is_pre_flush());
    }
}
