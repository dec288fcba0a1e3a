//! Audio filter capability
//!
//! Filter *definitions* are owned by the caller; the engine creates and
//! owns per-voice and per-output *instances* from them. Replacing a
//! filter slot drops the previous instance, and dropping a voice drops
//! all of its instances.

use crate::types::Sample;

/// A filter definition; a factory for filter instances.
pub trait Filter {
    /// Create the processing state for one stream.
    fn create_instance(&self) -> Box<dyn FilterInstance>;
}

/// Per-stream filter state.
///
/// `filter` must be non-blocking and must not call back into the engine.
pub trait FilterInstance: Send {
    /// Process `samples` frames in place. `buffer` is channel-planar:
    /// `buffer[0..samples]` is channel 0, `buffer[samples..2*samples]`
    /// channel 1. `stream_time` is the engine's monotonic stream clock.
    fn filter(
        &mut self,
        buffer: &mut [Sample],
        samples: usize,
        channels: usize,
        sample_rate: f32,
        stream_time: f64,
    );
}
