//! Tunable constants for the packet engine's caching policy, collected the
//! way [`itm::DecoderOptions`] collects its decoder's tunables: a plain
//! struct with a sensible [`Default`] rather than free-standing constants,
//! so a host can override one knob without repeating the others.

/// Tuning knobs for a [`crate::packet::Packet`]'s caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of event records held in the working event-record
    /// cache at once. Recommended default: 500.
    pub er_cache_max: usize,

    /// Capacity of the offset-keyed LRU region cache. Recommended
    /// default: 256.
    pub lru_capacity: usize,

    /// Record a checkpoint every `checkpoint_stride` event records. A
    /// stride of 1 checkpoints every event record (maximum memory,
    /// minimum replay); larger strides trade memory for replay cost
    /// bounded by `checkpoint_stride` per coverage fill.
    pub checkpoint_stride: usize,

    /// Checkpoint-build progress is reported at most once per this many
    /// event records built.
    pub listener_stride: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            er_cache_max: 500,
            lru_capacity: 256,
            checkpoint_stride: 50,
            listener_stride: 1000,
        }
    }
}
