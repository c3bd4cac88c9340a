//! The six CTF scopes a region or event record may lie in.

/// One of the six scopes a region of a packet can belong to. Copy rather
/// than a shared handle: the set is closed and carries no per-instance
/// data, so adjacent padding regions "reuse" a scope simply by copying the
/// same small value rather than sharing a reference to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    PacketHeader,
    PacketContext,
    EventRecordHeader,
    EventRecordCommonContext,
    EventRecordSpecificContext,
    EventRecordPayload,
}
