//! The offset-keyed LRU region cache: a bounded map from
//! `offset_in_packet_bits` to the shared region handle covering it.

use std::rc::Rc;

use lru::LruCache;

use crate::region::PacketRegion;
use crate::units::BitOffset;

/// Bounded recency cache from a queried offset to the region that covered
/// it. Survives working-cache clears: region handles are immutable facts
/// about the packet, so a stale entry is never an incorrect one.
pub struct OffsetLruCache {
    inner: LruCache<BitOffset, Rc<PacketRegion>>,
}

impl OffsetLruCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
        OffsetLruCache {
            inner: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, offset_in_packet_bits: BitOffset) -> Option<Rc<PacketRegion>> {
        self.inner.get(&offset_in_packet_bits).cloned()
    }

    /// Inserts (or overwrites) the region covering `offset_in_packet_bits`.
    pub fn put(&mut self, offset_in_packet_bits: BitOffset, region: Rc<PacketRegion>) {
        self.inner.put(offset_in_packet_bits, region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::ErrorRegion;
    use crate::segment::DataSegment;

    fn region(offset: u64) -> Rc<PacketRegion> {
        Rc::new(PacketRegion::Error(ErrorRegion {
            segment: DataSegment::new(offset, 8),
        }))
    }

    #[test]
    fn hit_after_put() {
        let mut cache = OffsetLruCache::new(2);
        cache.put(0, region(0));
        assert!(cache.get(0).is_some());
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = OffsetLruCache::new(2);
        cache.put(0, region(0));
        cache.put(8, region(8));
        cache.get(0); // touch 0, making 8 the LRU entry
        cache.put(16, region(16));
        assert!(cache.get(0).is_some());
        assert!(cache.get(8).is_none());
        assert!(cache.get(16).is_some());
    }
}
