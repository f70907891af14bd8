//! classifier.rs — the request classifier
//!
//! A pure function over a [`Request`]. No locks, no I/O, no side effects;
//! easy to property-test exhaustively.

use crate::error::ClassifyError;
use crate::request::{Operation, Request};

/// The dispatch route a classified request is handed to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// FLUSH/pre-flush, engine owns flush semantics: enters the FlushPipeline.
    FlushOwn,
    /// FLUSH/pre-flush, flush delegated to the backing device: acknowledge
    /// and return REMAPPED so the host redirects it unchanged.
    FlushPassthrough,
    /// DISCARD: admission through both limiters.
    Discard,
    /// READ or WRITE: admission through the request limiter only.
    Data,
}

/// Classify `req`, given whether this Instance is currently configured to
/// delegate flush handling to the backing device.
///
/// Rules, in order:
/// 1. An opcode that never decoded into an [`Operation`] is rejected before
///    it reaches this function — see [`Operation::from_wire`].
/// 2. FLUSH or pre-flush-marked requests must carry a zero payload.
/// 3. Every other request must carry a nonzero payload.
pub fn classify(req: &Request, flush_delegated: bool) -> Result<Route, ClassifyError> {
    if req.is_pre_flush() {
        if req.payload_bytes != 0 {
            return Err(ClassifyError::FlushPayloadNotEmpty);
        }
        return Ok(if flush_delegated {
            Route::FlushPassthrough
        } else {
            Route::FlushOwn
        });
    }

    if req.payload_bytes == 0 {
        return Err(ClassifyError::EmptyDataPayload);
    }

    Ok(match req.operation {
        Operation::Discard => Route::Discard,
        Operation::Read | Operation::Write => Route::Data,
        // Flush without the pre-flush marker is impossible: is_pre_flush()
        // is true whenever operation == Flush.
        Operation::Flush => unreachable!("Flush always satisfies is_pre_flush"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestFlags;

    fn req(op: Operation, bytes: u32, flags: RequestFlags) -> Request {
        Request::new(op, bytes, flags, 0)
    }

    #[test]
    fn flush_with_payload_is_rejected() {
        let r = req(Operation::Flush, 512, RequestFlags::empty());
        assert_eq!(classify(&r, false), Err(ClassifyError::FlushPayloadNotEmpty));
    }

    #[test]
    fn pre_flush_write_with_payload_is_rejected() {
        let r = req(Operation::Write, 512, RequestFlags::PRE_FLUSH);
        assert_eq!(classify(&r, false), Err(ClassifyError::FlushPayloadNotEmpty));
    }

    #[test]
    fn zero_length_write_is_rejected() {
        let r = req(Operation::Write, 0, RequestFlags::empty());
        assert_eq!(classify(&r, false), Err(ClassifyError::EmptyDataPayload));
    }

    #[test]
    fn flush_routes_own_or_passthrough_by_config() {
        let r = req(Operation::Flush, 0, RequestFlags::empty());
        assert_eq!(classify(&r, false), Ok(Route::FlushOwn));
        assert_eq!(classify(&r, true), Ok(Route::FlushPassthrough));
    }

    #[test]
    fn discard_routes_discard() {
        let r = req(Operation::Discard, 4096, RequestFlags::empty());
        assert_eq!(classify(&r, false), Ok(Route::Discard));
    }

    #[test]
    fn read_and_write_route_data() {
        let read = req(Operation::Read, 4096, RequestFlags::empty());
        let write = req(Operation::Write, 4096, RequestFlags::FUA);
        assert_eq!(classify(&read, false), Ok(Route::Data));
        assert_eq!(classify(&write, false), Ok(Route::Data));
    }
}
