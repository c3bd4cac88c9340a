//! A [sans-I/O](https://sans-io.readthedocs.io/how-to-sans-io.html) bridge
//! between a forward-only, bit-level CTF trace decoder and random-access
//! queries over a packet's decoded structure: "give me the region at bit
//! offset N", "give me event record at index M", without re-decoding from
//! packet start on every call.
//!
//! A packet's regions are decoded lazily and cached in three tiers:
//!
//! - a one-time preamble cache, covering everything before the first event
//!   record (the packet header and packet context);
//! - a bounded working cache of regions and event records, centered on
//!   whichever part of the packet was last queried;
//! - a bounded, offset-keyed LRU cache of individual regions, which
//!   survives working-cache clears since a region handle is an immutable
//!   fact about the packet regardless of what's currently being decoded.
//!
//! Random access is made affordable by [`checkpoints::PacketCheckpoints`]:
//! a sparse index of resumable decoder positions recorded every few event
//! records while the packet is first opened, bounding how much replay any
//! later query needs.
//!
//! The decoder itself, the packet's memory map, and the metadata type
//! dictionary are all collaborators this crate consumes through the traits
//! in [`collab`] rather than implements.

pub mod checkpoints;
pub mod collab;
pub mod config;
pub mod error;
pub mod event_record;
pub mod lru_cache;
pub mod packet;
pub mod region;
pub mod scope;
pub mod segment;
pub mod units;

pub use checkpoints::{Checkpoint, PacketCheckpoints, PacketDecodingError};
pub use collab::{
    DataStreamType, DataType, DecodingElement, EventRecordType, MmapWindow, NoopCheckpointsBuildListener,
    PacketCheckpointsBuildListener, PacketDecodingErrorInfo, PacketIndexEntry, PacketSequenceIterator,
};
pub use config::EngineConfig;
pub use error::PacketEngineError;
pub use event_record::{EventRecord, EventRecordSnapshot};
pub use lru_cache::OffsetLruCache;
pub use packet::Packet;
pub use region::{ContentRegion, ContentValue, ErrorRegion, PacketRegion, PaddingRegion};
pub use scope::Scope;
pub use segment::{DataRange, DataSegment};
pub use units::{BitOffset, ByteOrder, DataSize, DisplayBase};
