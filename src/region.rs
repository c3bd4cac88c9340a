//! [`PacketRegion`]: the tagged union of content, padding, and terminal
//! error regions that make up a packet's decoded structure.
//!
//! Modeled as a closed enum rather than an inheritance hierarchy. The
//! source this crate's design is grounded on uses a visitor over a class
//! hierarchy for this, but a closed three-variant set is exactly what
//! pattern matching on an enum is for.

use std::rc::Rc;

use crate::collab::DataType;
use crate::scope::Scope;
use crate::segment::{DataRange, DataSegment};
use crate::units::ByteOrder;

/// A decoded scalar value. Compound types (enum/array/variant/struct)
/// never appear here directly; they're represented by their leaf
/// bit-array child regions instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentValue {
    UnsignedInt(u64),
    SignedInt(i64),
    Float(f64),
    /// Marks this region as the start of string content; the string's
    /// bytes are read lazily from the region's [`DataRange`].
    String,
}

#[derive(Debug, Clone)]
pub struct ContentRegion {
    pub segment: DataSegment,
    pub data_range: DataRange,
    pub scope: Scope,
    pub data_type: Rc<dyn DataType>,
    pub value: Option<ContentValue>,
}

#[derive(Debug, Clone)]
pub struct PaddingRegion {
    pub segment: DataSegment,
    /// Inherited from the predecessor region: `None` when the previous
    /// region was itself padding, an error, or there was no previous
    /// region at all.
    pub byte_order: Option<ByteOrder>,
}

#[derive(Debug, Clone)]
pub struct ErrorRegion {
    pub segment: DataSegment,
}

/// A contiguous bit range of a packet, classified as content, padding, or
/// a terminal decoding error.
#[derive(Debug, Clone)]
pub enum PacketRegion {
    Content(ContentRegion),
    Padding(PaddingRegion),
    Error(ErrorRegion),
}

impl PacketRegion {
    pub fn segment(&self) -> DataSegment {
        match self {
            PacketRegion::Content(c) => c.segment,
            PacketRegion::Padding(p) => p.segment,
            PacketRegion::Error(e) => e.segment,
        }
    }

    pub fn scope(&self) -> Option<Scope> {
        match self {
            PacketRegion::Content(c) => Some(c.scope),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PacketRegion::Error(_))
    }

    pub fn is_content(&self) -> bool {
        matches!(self, PacketRegion::Content(_))
    }

    /// The byte order a region immediately following this one should
    /// inherit, were it to be synthesized as padding.
    pub fn byte_order_for_successor_padding(&self) -> Option<ByteOrder> {
        match self {
            PacketRegion::Content(c) => c.data_type.byte_order(),
            PacketRegion::Padding(p) => p.byte_order,
            PacketRegion::Error(_) => None,
        }
    }
}
