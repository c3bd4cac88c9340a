//! Crate-wide error type for caller-facing precondition violations.
//!
//! Decoding errors from the consumed decoder are deliberately *not* a
//! variant here: they are captured inside
//! [`crate::checkpoints::PacketCheckpoints`] and surfaced as a terminal
//! `Error` region plus [`crate::packet::Packet::error`], never as an
//! `Err` returned from a query method.

use thiserror::Error;

/// Errors returned by the packet engine's public query methods.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PacketEngineError {
    /// `region_at`/`append_regions` was asked for an offset outside
    /// `[0, effective_total_size.bits())`.
    #[error("query offset {offset} is out of range (packet has {size} bits)")]
    OffsetOutOfRange { offset: u64, size: u64 },

    /// `event_record_at` was asked for an index outside
    /// `[0, event_record_count)`.
    #[error("event record index {index} is out of range ({count} event records)")]
    EventRecordIndexOutOfRange { index: u64, count: u64 },

    /// A cache invariant (contiguity, monotonicity, scope presence) was
    /// violated. Indicates a bug in the engine itself, not bad caller
    /// input; the engine stops rather than returning inconsistent data.
    #[error("packet cache invariant violated: {0}")]
    InternalInconsistency(String),
}
