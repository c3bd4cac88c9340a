//! The packet engine: the working and preamble region caches, the
//! event-record cache, and every public query method.
//!
//! This is the component the forward-only decoder/random-access query
//! bridge exists for. It never materializes a packet's regions eagerly
//! (packets can be gigabytes), instead seeking the decoder to the nearest
//! checkpoint and replaying forward on demand.

use std::rc::Rc;

use log::{debug, trace, warn};

use crate::checkpoints::{PacketCheckpoints, PacketDecodingError};
use crate::collab::{
    DataType, DecodingElement, MmapWindow, PacketCheckpointsBuildListener, PacketDecodingErrorInfo,
    PacketIndexEntry, PacketSequenceIterator,
};
use crate::config::EngineConfig;
use crate::error::PacketEngineError;
use crate::event_record::{EventRecord, EventRecordBuilder, EventRecordSnapshot};
use crate::lru_cache::OffsetLruCache;
use crate::region::{ContentRegion, ContentValue, ErrorRegion, PacketRegion, PaddingRegion};
use crate::scope::Scope;
use crate::segment::DataSegment;
use crate::units::BitOffset;

/// The packet decoding and caching engine. Owns the decoder iterator, the
/// memory map, the checkpoints, and every cache; not safe for concurrent
/// use.
pub struct Packet<I, M>
where
    I: PacketSequenceIterator,
{
    index_entry: Rc<PacketIndexEntry>,
    mmap: M,
    it: I,
    /// A resumable position at the packet's very first bit, captured
    /// before any decoding happens. The only anchor available for a
    /// packet whose first event record never finished decoding, since no
    /// checkpoint exists for it.
    packet_start_position: I::Position,
    checkpoints: PacketCheckpoints<I::Position>,
    preamble_cache: Vec<Rc<PacketRegion>>,
    working_cache: Vec<Rc<PacketRegion>>,
    event_record_cache: Vec<Rc<EventRecord>>,
    lru: OffsetLruCache,
    config: EngineConfig,
}

impl<I, M> Packet<I, M>
where
    I: PacketSequenceIterator,
    M: MmapWindow,
{
    /// Constructs a packet around an index entry, a decoder iterator
    /// positioned at the packet's first bit, and a memory map of its
    /// bytes. Builds the checkpoints and the preamble cache in a single
    /// forward pass over the decoder.
    pub fn new(
        index_entry: Rc<PacketIndexEntry>,
        it: I,
        mmap: M,
        config: EngineConfig,
        listener: &mut dyn PacketCheckpointsBuildListener,
    ) -> Result<Self, PacketEngineError> {
        let lru = OffsetLruCache::new(config.lru_capacity);
        let packet_start_position = it.position();
        let mut packet = Packet {
            index_entry,
            mmap,
            it,
            packet_start_position,
            checkpoints: PacketCheckpoints::builder(0).finish(),
            preamble_cache: Vec::new(),
            working_cache: Vec::new(),
            event_record_cache: Vec::new(),
            lru,
            config,
        };
        packet.build_checkpoints(listener)?;
        packet.index_entry.set_event_record_count(packet.checkpoints.event_record_count());
        Ok(packet)
    }

    fn packet_offset_in_data_stream_bits(&self) -> BitOffset {
        self.index_entry.offset_in_data_stream_bits()
    }

    fn effective_total_size_bits(&self) -> u64 {
        self.index_entry.effective_total_size.bits()
    }

    /// Drives the decoder from packet start to end (or to a decoding
    /// error), recording checkpoints at event-record boundaries and
    /// materializing the preamble cache.
    fn build_checkpoints(
        &mut self,
        listener: &mut dyn PacketCheckpointsBuildListener,
    ) -> Result<(), PacketEngineError> {
        let packet_offset_bits = self.packet_offset_in_data_stream_bits();
        let mut builder = PacketCheckpoints::builder(self.effective_total_size_bits());
        let mut cur_scope: Option<Scope> = None;
        let mut first_er_seen = false;
        let mut step: usize = 0;

        loop {
            let elem_offset_abs = self.it.bit_offset();
            let pending_position = self.it.position();
            let elem = self.it.next_element();

            match elem {
                DecodingElement::EventRecordBegin => {
                    let offset_in_packet = elem_offset_abs - packet_offset_bits;
                    if !first_er_seen {
                        builder.set_preamble_end(offset_in_packet);
                        first_er_seen = true;
                    }

                    let er_index = builder.event_record_count();
                    let (snapshot, outcome) = self.scan_event_record_header(er_index, packet_offset_bits)?;
                    if let Some(err) = outcome {
                        builder.set_error(err);
                        self.checkpoints = builder.finish();
                        return Ok(());
                    }

                    builder.record_event_record(
                        snapshot,
                        pending_position,
                        offset_in_packet,
                        self.config.checkpoint_stride,
                    );

                    step += 1;
                    if self.config.listener_stride > 0 && step % self.config.listener_stride == 0 {
                        listener.on_progress(&self.index_entry, step, builder.event_record_count());
                        trace!(
                            "checkpoint build progress: {} event records scanned",
                            builder.event_record_count()
                        );
                    }
                }
                DecodingElement::EndOfPacket => {
                    if !first_er_seen {
                        builder.set_preamble_end(self.effective_total_size_bits());
                        synthesize_padding_gap(&mut self.preamble_cache, self.effective_total_size_bits());
                    }
                    break;
                }
                DecodingElement::Error(info) => {
                    let offset_in_packet = elem_offset_abs - packet_offset_bits;
                    if !first_er_seen {
                        builder.set_preamble_end(self.effective_total_size_bits());
                        synthesize_padding_gap(&mut self.preamble_cache, offset_in_packet);
                        self.preamble_cache.push(Rc::new(PacketRegion::Error(ErrorRegion {
                            segment: DataSegment::new(
                                offset_in_packet,
                                self.effective_total_size_bits() - offset_in_packet,
                            ),
                        })));
                    }
                    warn!("decoding error at bit {offset_in_packet} of packet: {info}");
                    builder.set_error(PacketDecodingError {
                        offset_in_packet_bits: offset_in_packet,
                        info,
                    });
                    break;
                }
                other if !first_er_seen => {
                    let offset_in_packet = elem_offset_abs - packet_offset_bits;
                    apply_non_er_element(&mut self.preamble_cache, &mut cur_scope, offset_in_packet, other)?;
                }
                other => {
                    return Err(PacketEngineError::InternalInconsistency(format!(
                        "unexpected element {other:?} between event records"
                    )));
                }
            }
        }

        let count = builder.event_record_count();
        self.checkpoints = builder.finish();
        debug!(
            "built checkpoints over {count} event records for packet {}",
            self.index_entry.index_in_data_stream
        );
        Ok(())
    }

    /// Scans one event record's header-to-end span without materializing
    /// any regions, to learn its type/timestamp for the checkpoint
    /// snapshot. Returns `Ok((snapshot, None))` on a clean
    /// `EventRecordEnd`, or `Ok((_, Some(error)))` if decoding failed or
    /// truncated mid-record.
    fn scan_event_record_header(
        &mut self,
        er_index: u64,
        packet_offset_bits: BitOffset,
    ) -> Result<(EventRecordSnapshot, Option<PacketDecodingError>), PacketEngineError> {
        let mut er_type = None;
        let mut ts = None;

        loop {
            let pre_offset = self.it.bit_offset();
            match self.it.next_element() {
                DecodingElement::EventRecordTypeResolved(t) => er_type = Some(t),
                DecodingElement::TimestampResolved(v) => ts = Some(v),
                DecodingElement::EventRecordEnd => {
                    return Ok((
                        EventRecordSnapshot { index_in_packet: er_index, event_record_type: er_type, timestamp: ts },
                        None,
                    ));
                }
                DecodingElement::Error(info) => {
                    let offset = pre_offset - packet_offset_bits;
                    return Ok((
                        EventRecordSnapshot { index_in_packet: er_index, event_record_type: er_type, timestamp: ts },
                        Some(PacketDecodingError { offset_in_packet_bits: offset, info }),
                    ));
                }
                DecodingElement::EndOfPacket => {
                    let offset = pre_offset - packet_offset_bits;
                    return Ok((
                        EventRecordSnapshot { index_in_packet: er_index, event_record_type: er_type, timestamp: ts },
                        Some(PacketDecodingError {
                            offset_in_packet_bits: offset,
                            info: PacketDecodingErrorInfo {
                                message: "end of packet while decoding event record header".into(),
                            },
                        }),
                    ));
                }
                DecodingElement::EventRecordBegin => {
                    return Err(PacketEngineError::InternalInconsistency(format!(
                        "nested EventRecordBegin while scanning event record {er_index}"
                    )));
                }
                _ => {}
            }
        }
    }

    // ---- public queries --------------------------------------------------

    pub fn index_entry(&self) -> &PacketIndexEntry {
        &self.index_entry
    }

    /// The packet's memory map, for resolving a region's [`crate::segment::DataRange`]
    /// into actual bytes.
    pub fn mmap(&self) -> &M {
        &self.mmap
    }

    pub fn has_data(&self) -> bool {
        self.effective_total_size_bits() > 0
    }

    pub fn event_record_count(&self) -> u64 {
        self.checkpoints.event_record_count()
    }

    pub fn error(&self) -> Option<&PacketDecodingError> {
        self.checkpoints.error()
    }

    pub fn region_at(&mut self, offset_in_packet_bits: BitOffset) -> Result<Rc<PacketRegion>, PacketEngineError> {
        self.bounds_check_offset(offset_in_packet_bits)?;

        if let Some(region) = self.lru.get(offset_in_packet_bits) {
            return Ok(region);
        }

        self.ensure_coverage_offset(offset_in_packet_bits)?;
        let region = self.binary_search_working_cache(offset_in_packet_bits)?;
        self.lru.put(offset_in_packet_bits, region.clone());
        Ok(region)
    }

    pub fn first_region(&mut self) -> Result<Rc<PacketRegion>, PacketEngineError> {
        self.bounds_check_offset(0)?;
        self.ensure_coverage_offset(0)?;
        Ok(self.working_cache.first().expect("preamble always covers offset 0").clone())
    }

    pub fn last_region(&mut self) -> Result<Rc<PacketRegion>, PacketEngineError> {
        let size = self.effective_total_size_bits();
        if size == 0 {
            return Err(PacketEngineError::OffsetOutOfRange { offset: 0, size: 0 });
        }

        let count = self.event_record_count();
        if count == 0 {
            // No event record ever completed, so there is no checkpoint to
            // resolve the tail from; replay the whole packet from its first
            // bit instead of taking ensure_coverage_offset's preamble
            // shortcut, which would stop short of a terminal Error region.
            self.working_cache.clear();
            self.event_record_cache.clear();
            self.fill_whole_packet_best_effort()?;
        } else {
            self.ensure_coverage_index(count - 1)?;
        }

        Ok(self.working_cache.last().expect("tail fill always appends at least one region").clone())
    }

    pub fn event_record_at(&mut self, index_in_packet: u64) -> Result<Rc<EventRecord>, PacketEngineError> {
        let count = self.event_record_count();
        if index_in_packet >= count {
            return Err(PacketEngineError::EventRecordIndexOutOfRange { index: index_in_packet, count });
        }

        if let Some(er) = self.cached_event_record(index_in_packet) {
            return Ok(er);
        }

        self.ensure_coverage_index(index_in_packet)?;
        self.cached_event_record(index_in_packet).ok_or_else(|| {
            PacketEngineError::InternalInconsistency(
                "coverage fill did not include the requested event record".into(),
            )
        })
    }

    pub fn append_regions(
        &mut self,
        out: &mut Vec<Rc<PacketRegion>>,
        begin_offset_in_packet_bits: BitOffset,
        end_offset_in_packet_bits: BitOffset,
    ) -> Result<(), PacketEngineError> {
        self.bounds_check_offset(begin_offset_in_packet_bits)?;
        let mut cursor = begin_offset_in_packet_bits;
        while cursor < end_offset_in_packet_bits {
            let region = self.region_at(cursor)?;
            cursor = region.segment().end_offset_in_packet_bits();
            out.push(region);
        }
        Ok(())
    }

    // ---- coverage algorithm -----------------------------------------------

    fn bounds_check_offset(&self, offset: BitOffset) -> Result<(), PacketEngineError> {
        let size = self.effective_total_size_bits();
        if offset >= size {
            return Err(PacketEngineError::OffsetOutOfRange { offset, size });
        }
        Ok(())
    }

    fn cached_event_record(&self, index_in_packet: u64) -> Option<Rc<EventRecord>> {
        let front = self.event_record_cache.first()?;
        if index_in_packet < front.index_in_packet {
            return None;
        }
        let offset = (index_in_packet - front.index_in_packet) as usize;
        self.event_record_cache.get(offset).cloned()
    }

    fn working_cache_contains_offset(&self, offset: BitOffset) -> bool {
        match (self.working_cache.first(), self.working_cache.last()) {
            (Some(front), Some(back)) => {
                offset >= front.segment().offset_in_packet_bits && offset < back.segment().end_offset_in_packet_bits()
            }
            _ => false,
        }
    }

    fn binary_search_working_cache(&self, offset: BitOffset) -> Result<Rc<PacketRegion>, PacketEngineError> {
        let idx = self.working_cache.partition_point(|r| r.segment().offset_in_packet_bits <= offset);
        if idx == 0 {
            return Err(PacketEngineError::InternalInconsistency(
                "coverage fill did not reach the requested offset".into(),
            ));
        }
        let region = &self.working_cache[idx - 1];
        if !region.segment().contains(offset) {
            return Err(PacketEngineError::InternalInconsistency(
                "gap in working cache at requested offset".into(),
            ));
        }
        Ok(region.clone())
    }

    fn load_preamble(&mut self) {
        self.working_cache.clear();
        self.working_cache.extend(self.preamble_cache.iter().cloned());
        self.event_record_cache.clear();
    }

    fn ensure_coverage_offset(&mut self, offset: BitOffset) -> Result<(), PacketEngineError> {
        if offset < self.checkpoints.preamble_end_bit_offset() {
            self.load_preamble();
            return Ok(());
        }

        if self.working_cache_contains_offset(offset) {
            return Ok(());
        }

        if self.event_record_count() == 0 {
            // The packet's first event record never finished decoding
            // (an error or truncation struck before its `EventRecordEnd`),
            // so there is no checkpoint to resolve an index from. The only
            // anchor left is the packet's very first bit.
            self.working_cache.clear();
            self.event_record_cache.clear();
            return self.fill_whole_packet_best_effort();
        }

        let index = self.resolve_index_for_offset(offset)?;
        self.ensure_coverage_index(index)
    }

    /// Replays the decoder from the packet's first bit, materializing
    /// every region up to the terminal `Error`/`EndOfPacket`. Used only
    /// when no event record has ever been fully decoded, so no checkpoint
    /// exists to resolve a post-preamble offset from.
    fn fill_whole_packet_best_effort(&mut self) -> Result<(), PacketEngineError> {
        let packet_offset_bits = self.packet_offset_in_data_stream_bits();
        self.it.seek(&self.packet_start_position);
        let mut cur_scope: Option<Scope> = None;

        loop {
            let elem_offset_abs = self.it.bit_offset();
            let elem = self.it.next_element();
            let offset = elem_offset_abs - packet_offset_bits;

            match elem {
                DecodingElement::EndOfPacket => {
                    synthesize_padding_gap(&mut self.working_cache, self.effective_total_size_bits());
                    break;
                }
                DecodingElement::Error(info) => {
                    warn!("decoding error at bit {offset} while replaying packet from start: {info}");
                    synthesize_padding_gap(&mut self.working_cache, offset);
                    self.working_cache.push(Rc::new(PacketRegion::Error(ErrorRegion {
                        segment: DataSegment::new(offset, self.effective_total_size_bits() - offset),
                    })));
                    break;
                }
                other => apply_non_er_element(&mut self.working_cache, &mut cur_scope, offset, other)?,
            }
        }
        Ok(())
    }

    /// Finds the event record whose span contains `offset` by replaying
    /// from the nearest checkpoint. If `offset`
    /// lies past the last event record, resolves to the last index so the
    /// caller's fill naturally appends the trailing tail.
    fn resolve_index_for_offset(&mut self, offset: BitOffset) -> Result<u64, PacketEngineError> {
        let count = self.event_record_count();
        if count == 0 {
            return Err(PacketEngineError::InternalInconsistency(
                "offset past preamble in a packet with no event records".into(),
            ));
        }

        let cp = self
            .checkpoints
            .nearest_checkpoint_at_or_before_offset(offset)
            .cloned()
            .ok_or_else(|| {
                PacketEngineError::InternalInconsistency("no checkpoint covers a post-preamble offset".into())
            })?;

        self.it.seek(&cp.position);
        let mut idx = cp.start_index;
        loop {
            if idx >= count {
                return Ok(count - 1);
            }
            let end_offset = self.skip_one_event_record_tracking_end()?;
            if offset < end_offset {
                return Ok(idx);
            }
            idx += 1;
        }
    }

    fn skip_one_event_record_tracking_end(&mut self) -> Result<BitOffset, PacketEngineError> {
        let packet_offset_bits = self.packet_offset_in_data_stream_bits();
        match self.it.next_element() {
            DecodingElement::EventRecordBegin => {}
            other => {
                return Err(PacketEngineError::InternalInconsistency(format!(
                    "expected EventRecordBegin while skipping, got {other:?}"
                )));
            }
        }

        loop {
            let pre_offset = self.it.bit_offset();
            match self.it.next_element() {
                DecodingElement::EventRecordEnd => return Ok(pre_offset - packet_offset_bits),
                DecodingElement::Error(_) | DecodingElement::EndOfPacket | DecodingElement::EventRecordBegin => {
                    return Err(PacketEngineError::InternalInconsistency(
                        "unexpected element while skipping a previously counted event record".into(),
                    ));
                }
                _ => {}
            }
        }
    }

    /// The central coverage algorithm: clears
    /// both caches, seeks to the checkpoint at or before
    /// `max(0, req_index - er_cache_max/2)`, discards forward to that
    /// exact index, then fills up to `er_cache_max` event records,
    /// appending the trailing tail if the last one included is the
    /// packet's last.
    fn ensure_coverage_index(&mut self, req_index: u64) -> Result<(), PacketEngineError> {
        let count = self.event_record_count();
        if req_index >= count {
            return Err(PacketEngineError::EventRecordIndexOutOfRange { index: req_index, count });
        }

        self.working_cache.clear();
        self.event_record_cache.clear();

        let half = (self.config.er_cache_max / 2) as u64;
        let start_index = req_index.saturating_sub(half);

        let cp = self
            .checkpoints
            .nearest_checkpoint_at_or_before(start_index)
            .cloned()
            .ok_or_else(|| {
                PacketEngineError::InternalInconsistency("no checkpoint at or before start index".into())
            })?;

        self.it.seek(&cp.position);
        let mut idx = cp.start_index;
        while idx < start_index {
            self.skip_one_event_record_tracking_end()?;
            idx += 1;
        }

        trace!("filling working cache from event record {idx} (requested {req_index})");

        let mut cur_scope: Option<Scope> = None;
        let mut filled = 0usize;
        let mut reached_last = false;

        while filled < self.config.er_cache_max && idx < count {
            self.fill_one_event_record(idx, &mut cur_scope)?;
            filled += 1;
            if idx == count - 1 {
                reached_last = true;
                break;
            }
            idx += 1;
        }

        if reached_last {
            self.fill_tail(&mut cur_scope)?;
        }

        Ok(())
    }

    fn fill_one_event_record(&mut self, index: u64, cur_scope: &mut Option<Scope>) -> Result<(), PacketEngineError> {
        let packet_offset_bits = self.packet_offset_in_data_stream_bits();

        match self.it.next_element() {
            DecodingElement::EventRecordBegin => {}
            other => {
                return Err(PacketEngineError::InternalInconsistency(format!(
                    "expected EventRecordBegin for event record {index}, got {other:?}"
                )));
            }
        }

        let mut builder = EventRecordBuilder::new(index);

        loop {
            let elem_offset_abs = self.it.bit_offset();
            let elem = self.it.next_element();

            match elem {
                DecodingElement::EventRecordEnd => break,
                DecodingElement::EventRecordTypeResolved(t) => builder.event_record_type = Some(t),
                DecodingElement::TimestampResolved(ts) => builder.timestamp = Some(ts),
                DecodingElement::ScopeBegin(scope) => *cur_scope = Some(scope),
                DecodingElement::ScopeEnd => *cur_scope = None,
                DecodingElement::UnsignedInt { data_type, value } => {
                    let offset = elem_offset_abs - packet_offset_bits;
                    let segment =
                        self.append_content_region(offset, *cur_scope, data_type, ContentValue::UnsignedInt(value))?;
                    builder.note_region(segment);
                }
                DecodingElement::SignedInt { data_type, value } => {
                    let offset = elem_offset_abs - packet_offset_bits;
                    let segment =
                        self.append_content_region(offset, *cur_scope, data_type, ContentValue::SignedInt(value))?;
                    builder.note_region(segment);
                }
                DecodingElement::Float { data_type, value } => {
                    let offset = elem_offset_abs - packet_offset_bits;
                    let segment =
                        self.append_content_region(offset, *cur_scope, data_type, ContentValue::Float(value))?;
                    builder.note_region(segment);
                }
                DecodingElement::StringBegin { data_type } => {
                    let offset = elem_offset_abs - packet_offset_bits;
                    let segment = self.append_content_region(offset, *cur_scope, data_type, ContentValue::String)?;
                    builder.note_region(segment);
                }
                DecodingElement::StringEnd
                | DecodingElement::StructureBegin
                | DecodingElement::StructureEnd
                | DecodingElement::ArrayBegin
                | DecodingElement::ArrayEnd
                | DecodingElement::VariantBegin
                | DecodingElement::VariantEnd => {}
                other => {
                    return Err(PacketEngineError::InternalInconsistency(format!(
                        "unexpected element {other:?} while replaying counted event record {index}"
                    )));
                }
            }
        }

        let er = builder.finish();
        self.event_record_cache.push(Rc::new(er));
        Ok(())
    }

    fn fill_tail(&mut self, cur_scope: &mut Option<Scope>) -> Result<(), PacketEngineError> {
        let packet_offset_bits = self.packet_offset_in_data_stream_bits();
        loop {
            let elem_offset_abs = self.it.bit_offset();
            let elem = self.it.next_element();
            match elem {
                DecodingElement::EndOfPacket => {
                    synthesize_padding_gap(&mut self.working_cache, self.effective_total_size_bits());
                    break;
                }
                DecodingElement::Error(info) => {
                    let offset = elem_offset_abs - packet_offset_bits;
                    warn!("decoding error at bit {offset} while filling tail: {info}");
                    synthesize_padding_gap(&mut self.working_cache, offset);
                    self.working_cache.push(Rc::new(PacketRegion::Error(ErrorRegion {
                        segment: DataSegment::new(offset, self.effective_total_size_bits() - offset),
                    })));
                    break;
                }
                other => {
                    let offset = elem_offset_abs - packet_offset_bits;
                    apply_non_er_element(&mut self.working_cache, cur_scope, offset, other)?;
                }
            }
        }
        Ok(())
    }

    fn append_content_region(
        &mut self,
        offset_in_packet_bits: BitOffset,
        scope: Option<Scope>,
        data_type: Rc<dyn DataType>,
        value: ContentValue,
    ) -> Result<DataSegment, PacketEngineError> {
        append_content_region(&mut self.working_cache, offset_in_packet_bits, scope, data_type, value)
    }
}

/// Appends a padding region covering the gap (if any) between the working
/// cache's last region and `next_offset_in_packet_bits`.
fn synthesize_padding_gap(cache: &mut Vec<Rc<PacketRegion>>, next_offset_in_packet_bits: BitOffset) {
    if let Some(last) = cache.last() {
        let last_end = last.segment().end_offset_in_packet_bits();
        if next_offset_in_packet_bits > last_end {
            let byte_order = last.byte_order_for_successor_padding();
            cache.push(Rc::new(PacketRegion::Padding(PaddingRegion {
                segment: DataSegment::new(last_end, next_offset_in_packet_bits - last_end),
                byte_order,
            })));
        }
    }
}

fn append_content_region(
    cache: &mut Vec<Rc<PacketRegion>>,
    offset_in_packet_bits: BitOffset,
    scope: Option<Scope>,
    data_type: Rc<dyn DataType>,
    value: ContentValue,
) -> Result<DataSegment, PacketEngineError> {
    let scope = scope.ok_or_else(|| {
        PacketEngineError::InternalInconsistency("content element decoded outside any scope".into())
    })?;

    synthesize_padding_gap(cache, offset_in_packet_bits);

    let size_bits = data_type.size_bits();
    let segment = DataSegment::new(offset_in_packet_bits, size_bits);
    cache.push(Rc::new(PacketRegion::Content(ContentRegion {
        segment,
        data_range: segment.data_range(),
        scope,
        data_type,
        value: Some(value),
    })));
    Ok(segment)
}

/// Handles one decoding element outside of any event record: scope
/// tracking plus content-region synthesis for the preamble and the tail.
/// Compound openings/closings never themselves produce regions.
fn apply_non_er_element(
    cache: &mut Vec<Rc<PacketRegion>>,
    cur_scope: &mut Option<Scope>,
    offset_in_packet_bits: BitOffset,
    elem: DecodingElement,
) -> Result<(), PacketEngineError> {
    match elem {
        DecodingElement::ScopeBegin(scope) => *cur_scope = Some(scope),
        DecodingElement::ScopeEnd => *cur_scope = None,
        DecodingElement::UnsignedInt { data_type, value } => {
            append_content_region(cache, offset_in_packet_bits, *cur_scope, data_type, ContentValue::UnsignedInt(value))?;
        }
        DecodingElement::SignedInt { data_type, value } => {
            append_content_region(cache, offset_in_packet_bits, *cur_scope, data_type, ContentValue::SignedInt(value))?;
        }
        DecodingElement::Float { data_type, value } => {
            append_content_region(cache, offset_in_packet_bits, *cur_scope, data_type, ContentValue::Float(value))?;
        }
        DecodingElement::StringBegin { data_type } => {
            append_content_region(cache, offset_in_packet_bits, *cur_scope, data_type, ContentValue::String)?;
        }
        DecodingElement::StringEnd
        | DecodingElement::StructureBegin
        | DecodingElement::StructureEnd
        | DecodingElement::ArrayBegin
        | DecodingElement::ArrayEnd
        | DecodingElement::VariantBegin
        | DecodingElement::VariantEnd => {}
        // Reachable only from `Packet::fill_whole_packet_best_effort`, replaying
        // into a never-completed first event record with no cache to publish to.
        DecodingElement::EventRecordBegin
        | DecodingElement::EventRecordEnd
        | DecodingElement::EventRecordTypeResolved(_)
        | DecodingElement::TimestampResolved(_) => {}
        other => {
            return Err(PacketEngineError::InternalInconsistency(format!(
                "unexpected terminal element {other:?} reached as a plain decoding element"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{DataStreamType, NoopCheckpointsBuildListener};
    use crate::units::{ByteOrder, DisplayBase};

    #[derive(Debug)]
    struct FakeType {
        size_bits: u64,
    }

    impl DataType for FakeType {
        fn size_bits(&self) -> u64 {
            self.size_bits
        }
        fn byte_order(&self) -> Option<ByteOrder> {
            Some(ByteOrder::Little)
        }
        fn is_signed(&self) -> bool {
            false
        }
        fn display_base(&self) -> DisplayBase {
            DisplayBase::Decimal
        }
    }

    fn u32_type() -> Rc<dyn DataType> {
        Rc::new(FakeType { size_bits: 32 })
    }

    fn u8_type() -> Rc<dyn DataType> {
        Rc::new(FakeType { size_bits: 8 })
    }

    #[derive(Debug)]
    struct FakeDataStreamType;

    impl DataStreamType for FakeDataStreamType {
        fn name(&self) -> &str {
            "fake"
        }
    }

    struct FakeMmap;

    impl MmapWindow for FakeMmap {
        fn bytes(&self) -> &[u8] {
            &[]
        }
    }

    struct FakeIterator {
        script: Vec<(BitOffset, DecodingElement)>,
        pos: usize,
    }

    impl FakeIterator {
        fn new(script: Vec<(BitOffset, DecodingElement)>) -> Self {
            FakeIterator { script, pos: 0 }
        }
    }

    impl PacketSequenceIterator for FakeIterator {
        type Position = usize;

        fn bit_offset(&self) -> BitOffset {
            self.script[self.pos.min(self.script.len() - 1)].0
        }

        fn position(&self) -> usize {
            self.pos
        }

        fn seek(&mut self, position: &usize) {
            self.pos = *position;
        }

        fn next_element(&mut self) -> DecodingElement {
            let idx = self.pos.min(self.script.len() - 1);
            let elem = self.script[idx].1.clone();
            if self.pos < self.script.len() - 1 {
                self.pos += 1;
            }
            elem
        }
    }

    fn index_entry(total_bits: u64) -> Rc<PacketIndexEntry> {
        Rc::new(PacketIndexEntry::new(
            0,
            0,
            None,
            None,
            None,
            None,
            crate::units::DataSize::from_bits(total_bits),
            crate::units::DataSize::from_bits(total_bits),
            Rc::new(FakeDataStreamType),
            None,
            None,
            None,
            None,
            None,
            false,
        ))
    }

    fn packet_from(
        script: Vec<(BitOffset, DecodingElement)>,
        total_bits: u64,
        config: EngineConfig,
    ) -> Packet<FakeIterator, FakeMmap> {
        let it = FakeIterator::new(script);
        let entry = index_entry(total_bits);
        let mut listener = NoopCheckpointsBuildListener;
        Packet::new(entry, it, FakeMmap, config, &mut listener).expect("packet construction")
    }

    #[test]
    fn last_region_on_truncated_first_event_record_is_the_error_region() {
        let script = vec![
            (0, DecodingElement::ScopeBegin(Scope::PacketHeader)),
            (0, DecodingElement::UnsignedInt { data_type: u32_type(), value: 0xdead_beef }),
            (32, DecodingElement::ScopeEnd),
            (32, DecodingElement::EventRecordBegin),
            (32, DecodingElement::ScopeBegin(Scope::EventRecordPayload)),
            (
                40,
                DecodingElement::Error(PacketDecodingErrorInfo { message: "truncated payload".into() }),
            ),
        ];
        let mut packet = packet_from(script, 64, EngineConfig::default());

        assert_eq!(packet.event_record_count(), 0);
        assert!(packet.error().is_some());

        let last = packet.last_region().unwrap();
        assert!(last.is_error());
        assert_eq!(last.segment().offset_in_packet_bits, 40);
        assert_eq!(last.segment().end_offset_in_packet_bits(), 64);
    }

    #[test]
    fn last_region_after_completed_packet_returns_trailing_padding() {
        let script = vec![
            (0, DecodingElement::ScopeBegin(Scope::PacketHeader)),
            (0, DecodingElement::UnsignedInt { data_type: u32_type(), value: 1 }),
            (32, DecodingElement::ScopeEnd),
            (32, DecodingElement::EventRecordBegin),
            (32, DecodingElement::ScopeBegin(Scope::EventRecordPayload)),
            (32, DecodingElement::UnsignedInt { data_type: u8_type(), value: 1 }),
            (40, DecodingElement::ScopeEnd),
            (40, DecodingElement::EventRecordEnd),
            (40, DecodingElement::EndOfPacket),
        ];
        let mut packet = packet_from(script, 64, EngineConfig::default());

        assert_eq!(packet.event_record_count(), 1);
        let last = packet.last_region().unwrap();
        assert!(matches!(&*last, PacketRegion::Padding(_)));
        assert_eq!(last.segment().offset_in_packet_bits, 40);
        assert_eq!(last.segment().end_offset_in_packet_bits(), 64);
    }

    #[test]
    fn ensure_coverage_index_resolves_event_records_across_checkpoint_strides() {
        let mut script = vec![
            (0, DecodingElement::ScopeBegin(Scope::PacketHeader)),
            (0, DecodingElement::UnsignedInt { data_type: u32_type(), value: 0 }),
            (32, DecodingElement::ScopeEnd),
        ];
        let mut offset = 32u64;
        for i in 0..20u64 {
            script.push((offset, DecodingElement::EventRecordBegin));
            script.push((offset, DecodingElement::ScopeBegin(Scope::EventRecordPayload)));
            script.push((offset, DecodingElement::UnsignedInt { data_type: u8_type(), value: i }));
            offset += 8;
            script.push((offset, DecodingElement::ScopeEnd));
            script.push((offset, DecodingElement::EventRecordEnd));
        }
        script.push((offset, DecodingElement::EndOfPacket));

        let config = EngineConfig { er_cache_max: 4, checkpoint_stride: 3, ..EngineConfig::default() };
        let mut packet = packet_from(script, offset, config);

        assert_eq!(packet.event_record_count(), 20);

        let first = packet.event_record_at(0).unwrap();
        assert_eq!(first.index_in_packet, 0);

        let middle = packet.event_record_at(11).unwrap();
        assert_eq!(middle.index_in_packet, 11);

        let last = packet.event_record_at(19).unwrap();
        assert_eq!(last.index_in_packet, 19);

        // Re-querying an index the previous fill already evicted forces a
        // fresh coverage fill from the nearest checkpoint at or before it.
        let back_to_first = packet.event_record_at(0).unwrap();
        assert_eq!(back_to_first.index_in_packet, 0);
    }

    #[test]
    fn event_record_at_out_of_range_is_an_error() {
        let script = vec![(0, DecodingElement::EndOfPacket)];
        let mut packet = packet_from(script, 0, EngineConfig::default());

        assert!(matches!(
            packet.event_record_at(0),
            Err(PacketEngineError::EventRecordIndexOutOfRange { index: 0, count: 0 })
        ));
    }
}
