//! Collaborator seams: everything the packet engine consumes from, or hands
//! back to, code this crate does not own (the bit-level decoder, the
//! memory map, the metadata type dictionary, and a progress listener for
//! checkpoint building).
//!
//! These are trait objects rather than a generic decoder crate because the
//! engine's only requirement of the decoder is that it be drivable forward
//! one element at a time and seekable back to a previously observed
//! position, generalized from a flat packet enum to CTF's richer,
//! scope-nested element stream.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::scope::Scope;
use crate::units::{BitOffset, DataSize, DisplayBase};

/// A metadata bit-array type: its size, byte order, signedness, and
/// preferred display base. Implemented by the (external) metadata parser's
/// type objects.
pub trait DataType: fmt::Debug {
    fn size_bits(&self) -> u64;
    fn byte_order(&self) -> Option<crate::units::ByteOrder>;
    fn is_signed(&self) -> bool;
    fn display_base(&self) -> DisplayBase;
}

/// A named event record type from the metadata type dictionary.
pub trait EventRecordType: fmt::Debug {
    fn name(&self) -> &str;
}

/// A named data stream type from the metadata type dictionary.
pub trait DataStreamType: fmt::Debug {
    fn name(&self) -> &str;
}

/// A stable, read-only byte window into a packet's bytes, backed by a
/// memory map owned exclusively by the [`crate::packet::Packet`].
pub trait MmapWindow {
    fn bytes(&self) -> &[u8];
}

/// The kind-specific payload of a single decoding element, as yielded by
/// the consumed bit-level decoder.
#[derive(Debug, Clone)]
pub enum DecodingElement {
    ScopeBegin(Scope),
    ScopeEnd,

    EventRecordBegin,
    EventRecordEnd,

    /// A resolved event record type, back-patching the event record
    /// currently being built.
    EventRecordTypeResolved(Rc<dyn EventRecordType>),

    /// A resolved timestamp, back-patching the event record currently
    /// being built.
    TimestampResolved(u64),

    UnsignedInt {
        data_type: Rc<dyn DataType>,
        value: u64,
    },
    SignedInt {
        data_type: Rc<dyn DataType>,
        value: i64,
    },
    Float {
        data_type: Rc<dyn DataType>,
        value: f64,
    },

    /// A leaf bit-array element whose decoded value is a string; opening
    /// the string is its own region, the compound wrapper is not.
    StringBegin {
        data_type: Rc<dyn DataType>,
    },
    StringEnd,

    /// Compound openings/closings never themselves produce regions;
    /// only their leaf bit-array elements do.
    StructureBegin,
    StructureEnd,
    ArrayBegin,
    ArrayEnd,
    VariantBegin,
    VariantEnd,

    EndOfPacket,

    /// The decoder hit a structural or semantic violation and cannot
    /// continue. Terminal: no further elements follow in the stream.
    Error(PacketDecodingErrorInfo),
}

/// Enough information about a decoding error to build the terminal
/// [`crate::region::ErrorRegion`] and to report it via
/// [`crate::checkpoints::PacketCheckpoints::error`].
#[derive(Debug, Clone, PartialEq)]
pub struct PacketDecodingErrorInfo {
    pub message: String,
}

impl fmt::Display for PacketDecodingErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PacketDecodingErrorInfo {}

/// A forward-only, but seekable, stream of [`DecodingElement`]s positioned
/// relative to the enclosing data stream (not the packet). One instance
/// drives exactly one packet's worth of decoding.
pub trait PacketSequenceIterator {
    /// An opaque, resumable decoder position. Produced by [`Self::position`]
    /// and consumed by [`Self::seek`].
    type Position: Clone;

    /// The current element's bit offset, relative to the enclosing data
    /// stream (i.e. `packet.offset_in_data_stream_bits() +` offset in
    /// packet).
    fn bit_offset(&self) -> BitOffset;

    /// A resumable position at the iterator's current location.
    fn position(&self) -> Self::Position;

    /// Seeks the iterator back to a previously observed position.
    fn seek(&mut self, position: &Self::Position);

    /// Decodes and returns the next element, advancing the iterator.
    /// Returns `DecodingElement::EndOfPacket` at packet end and keeps
    /// returning it on subsequent calls; likewise idempotent on `Error`.
    fn next_element(&mut self) -> DecodingElement;
}

/// Invoked periodically while building a packet's checkpoints, so a host
/// can display progress for large packets. At-most-once per configured
/// stride; best-effort, may be dropped under pressure.
pub trait PacketCheckpointsBuildListener {
    fn on_progress(&mut self, packet: &PacketIndexEntry, build_step: usize, er_count_so_far: u64);
}

/// A listener that does nothing, for callers that don't need progress
/// reporting.
#[derive(Debug, Default)]
pub struct NoopCheckpointsBuildListener;

impl PacketCheckpointsBuildListener for NoopCheckpointsBuildListener {
    fn on_progress(&mut self, _packet: &PacketIndexEntry, _build_step: usize, _er_count_so_far: u64) {}
}

/// An immutable value describing one packet's place in its data stream,
/// constructed and owned by the host's trace-level index. Everything here
/// is fixed at construction except [`Self::event_record_count`], which is
/// filled in once this packet's checkpoints have been built.
#[derive(Debug)]
pub struct PacketIndexEntry {
    pub index_in_data_stream: u64,
    pub offset_in_data_stream_bytes: u64,
    pub packet_context_offset_in_packet_bits: Option<BitOffset>,

    /// Hint for the preamble size, when known up front from a prior index
    /// pass. Used only as a fast-path confirmation; the preamble is still
    /// derived purely by decoding when absent.
    pub preamble_size: Option<DataSize>,

    pub expected_total_size: Option<DataSize>,
    pub expected_content_size: Option<DataSize>,
    pub effective_total_size: DataSize,
    pub effective_content_size: DataSize,

    pub data_stream_type: Rc<dyn DataStreamType>,
    pub data_stream_id: Option<u64>,
    pub ts_begin: Option<u64>,
    pub ts_end: Option<u64>,
    pub seq_num: Option<u64>,
    pub discarded_event_record_counter: Option<u64>,
    pub is_invalid: bool,

    event_record_count: Cell<Option<u64>>,
}

impl PacketIndexEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index_in_data_stream: u64,
        offset_in_data_stream_bytes: u64,
        packet_context_offset_in_packet_bits: Option<BitOffset>,
        preamble_size: Option<DataSize>,
        expected_total_size: Option<DataSize>,
        expected_content_size: Option<DataSize>,
        effective_total_size: DataSize,
        effective_content_size: DataSize,
        data_stream_type: Rc<dyn DataStreamType>,
        data_stream_id: Option<u64>,
        ts_begin: Option<u64>,
        ts_end: Option<u64>,
        seq_num: Option<u64>,
        discarded_event_record_counter: Option<u64>,
        is_invalid: bool,
    ) -> Self {
        Self {
            index_in_data_stream,
            offset_in_data_stream_bytes,
            packet_context_offset_in_packet_bits,
            preamble_size,
            expected_total_size,
            expected_content_size,
            effective_total_size,
            effective_content_size,
            data_stream_type,
            data_stream_id,
            ts_begin,
            ts_end,
            seq_num,
            discarded_event_record_counter,
            is_invalid,
            event_record_count: Cell::new(None),
        }
    }

    pub fn offset_in_data_stream_bits(&self) -> BitOffset {
        self.offset_in_data_stream_bytes * 8
    }

    pub fn end_offset_in_data_stream_bytes(&self) -> u64 {
        self.offset_in_data_stream_bytes + self.effective_total_size.bytes()
    }

    pub fn end_offset_in_data_stream_bits(&self) -> u64 {
        self.end_offset_in_data_stream_bytes() * 8
    }

    pub fn event_record_count(&self) -> Option<u64> {
        self.event_record_count.get()
    }

    pub fn set_event_record_count(&self, count: u64) {
        self.event_record_count.set(Some(count));
    }
}
