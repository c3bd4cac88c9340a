//! [`PacketCheckpoints`]: a sparse index of resumable decoder positions at
//! event-record granularity, built once when a packet is constructed.

use crate::collab::{PacketDecodingErrorInfo, PacketSequenceIterator};
use crate::event_record::EventRecordSnapshot;
use crate::units::BitOffset;

/// One recorded checkpoint: a resumable decoder position at the start of
/// event record `start_index`, plus that event record's snapshot.
#[derive(Debug, Clone)]
pub struct Checkpoint<P> {
    pub position: P,
    pub bit_offset: BitOffset,
    pub start_index: u64,
    pub event_record: EventRecordSnapshot,
}

/// A decoding error captured while building checkpoints. Once set, the
/// packet's cache is terminated with an `Error` region and no further
/// event records exist past `offset_in_packet_bits`.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketDecodingError {
    pub offset_in_packet_bits: BitOffset,
    pub info: PacketDecodingErrorInfo,
}

/// Sparse `index -> (decoder position, EventRecord snapshot)` map built by
/// iterating a packet's decoder once, from packet start to end (or to the
/// first decoding error).
#[derive(Debug, Clone)]
pub struct PacketCheckpoints<P> {
    checkpoints: Vec<Checkpoint<P>>,
    first_event_record: Option<EventRecordSnapshot>,
    last_event_record: Option<EventRecordSnapshot>,
    event_record_count: u64,
    error: Option<PacketDecodingError>,
    preamble_end_bit_offset: BitOffset,
}

impl<P: Clone> PacketCheckpoints<P> {
    pub(crate) fn builder(preamble_end_bit_offset: BitOffset) -> PacketCheckpointsBuilder<P> {
        PacketCheckpointsBuilder {
            checkpoints: Vec::new(),
            first_event_record: None,
            last_event_record: None,
            event_record_count: 0,
            error: None,
            preamble_end_bit_offset,
        }
    }

    pub fn event_record_count(&self) -> u64 {
        self.event_record_count
    }

    pub fn first_event_record(&self) -> Option<&EventRecordSnapshot> {
        self.first_event_record.as_ref()
    }

    pub fn last_event_record(&self) -> Option<&EventRecordSnapshot> {
        self.last_event_record.as_ref()
    }

    pub fn error(&self) -> Option<&PacketDecodingError> {
        self.error.as_ref()
    }

    /// The bit offset where the preamble ends: the first event record's
    /// start, or packet end if there are no event records.
    pub fn preamble_end_bit_offset(&self) -> BitOffset {
        self.preamble_end_bit_offset
    }

    /// The greatest checkpoint with `start_index <= index`, or `None` if
    /// `index` precedes every checkpoint (i.e. it's within the preamble,
    /// or there are no event records at all).
    pub fn nearest_checkpoint_at_or_before(&self, index: u64) -> Option<&Checkpoint<P>> {
        match self.checkpoints.partition_point(|cp| cp.start_index <= index) {
            0 => None,
            n => Some(&self.checkpoints[n - 1]),
        }
    }

    /// The event-record index whose span contains `offset_in_packet_bits`,
    /// found by locating the greatest checkpoint starting at or before
    /// that offset. Returns `None` if the offset lies in the preamble.
    ///
    /// This only narrows down to a checkpoint, not an exact event record:
    /// callers resolve the exact index by replaying forward from the
    /// returned checkpoint.
    pub fn nearest_checkpoint_at_or_before_offset(
        &self,
        offset_in_packet_bits: BitOffset,
    ) -> Option<&Checkpoint<P>> {
        if offset_in_packet_bits < self.preamble_end_bit_offset {
            return None;
        }

        match self
            .checkpoints
            .partition_point(|cp| cp.bit_offset <= offset_in_packet_bits)
        {
            0 => None,
            n => Some(&self.checkpoints[n - 1]),
        }
    }
}

/// Accumulates checkpoints while driving the decoder forward once.
/// Produced by [`PacketCheckpoints::builder`], consumed by
/// [`Self::finish`].
pub(crate) struct PacketCheckpointsBuilder<P> {
    checkpoints: Vec<Checkpoint<P>>,
    first_event_record: Option<EventRecordSnapshot>,
    last_event_record: Option<EventRecordSnapshot>,
    event_record_count: u64,
    error: Option<PacketDecodingError>,
    preamble_end_bit_offset: BitOffset,
}

impl<P: Clone> PacketCheckpointsBuilder<P> {
    pub fn set_preamble_end(&mut self, offset: BitOffset) {
        self.preamble_end_bit_offset = offset;
    }

    pub fn record_event_record(
        &mut self,
        snapshot: EventRecordSnapshot,
        position: P,
        bit_offset: BitOffset,
        stride: usize,
    ) {
        if self.first_event_record.is_none() {
            self.first_event_record = Some(snapshot.clone());
        }
        self.last_event_record = Some(snapshot.clone());

        let index = self.event_record_count;
        self.event_record_count += 1;

        if stride == 0 || index % stride as u64 == 0 {
            self.checkpoints.push(Checkpoint {
                position,
                bit_offset,
                start_index: index,
                event_record: snapshot,
            });
        }
    }

    pub fn set_error(&mut self, error: PacketDecodingError) {
        self.error = Some(error);
    }

    pub fn finish(self) -> PacketCheckpoints<P> {
        PacketCheckpoints {
            checkpoints: self.checkpoints,
            first_event_record: self.first_event_record,
            last_event_record: self.last_event_record,
            event_record_count: self.event_record_count,
            error: self.error,
            preamble_end_bit_offset: self.preamble_end_bit_offset,
        }
    }
}

// Kept to document the dependency direction without importing it unused:
// checkpoints are always built by driving a `PacketSequenceIterator`.
#[allow(dead_code)]
fn _assert_iterator_bound<T: PacketSequenceIterator>() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pos(u64);

    fn snap(index: u64) -> EventRecordSnapshot {
        EventRecordSnapshot {
            index_in_packet: index,
            event_record_type: None,
            timestamp: None,
        }
    }

    #[test]
    fn stride_sparsifies_checkpoints() {
        let mut b: PacketCheckpointsBuilder<Pos> = PacketCheckpoints::builder(32);
        for i in 0..10u64 {
            b.record_event_record(snap(i), Pos(i), 32 + i * 72, 3);
        }
        let cps = b.finish();
        assert_eq!(cps.event_record_count(), 10);
        // checkpoints at indices 0, 3, 6, 9
        assert_eq!(cps.nearest_checkpoint_at_or_before(0).unwrap().start_index, 0);
        assert_eq!(cps.nearest_checkpoint_at_or_before(5).unwrap().start_index, 3);
        assert_eq!(cps.nearest_checkpoint_at_or_before(9).unwrap().start_index, 9);
    }

    #[test]
    fn offset_before_preamble_end_has_no_checkpoint() {
        let mut b: PacketCheckpointsBuilder<Pos> = PacketCheckpoints::builder(32);
        b.record_event_record(snap(0), Pos(0), 32, 1);
        let cps = b.finish();
        assert!(cps.nearest_checkpoint_at_or_before_offset(0).is_none());
        assert!(cps.nearest_checkpoint_at_or_before_offset(32).is_some());
    }
}
