//! Audio source capability
//!
//! Sources are opaque to the engine: a decoder, a synthesizer, a stream.
//! The caller owns the [`AudioSource`] definition; playing it creates a
//! [`SourceInstance`] that the engine owns for the lifetime of the voice.

use crate::error::{EngineError, EngineResult};
use crate::filter::Filter;
use crate::types::{Sample, FILTERS_PER_STREAM};

/// A playable sound definition.
///
/// One definition can be played any number of times; each play creates an
/// independent instance.
pub trait AudioSource {
    /// Create a fresh playback instance.
    fn create_instance(&self) -> Box<dyn SourceInstance>;

    /// Channel count of the produced audio (1 or 2).
    fn channels(&self) -> usize {
        1
    }

    /// Native sample rate of the produced audio.
    fn base_sample_rate(&self) -> f32 {
        44100.0
    }

    /// Filter definitions to instantiate on every voice playing this
    /// source. The engine owns the instances; the definitions stay with
    /// the caller.
    fn filters(&self) -> [Option<&dyn Filter>; FILTERS_PER_STREAM] {
        [None; FILTERS_PER_STREAM]
    }
}

/// A live playback of an [`AudioSource`], owned by a voice.
///
/// `get_audio` must be non-blocking and must not call back into the
/// engine; sources that need I/O have to pre-buffer.
pub trait SourceInstance: Send {
    /// Write `samples` frames into `buffer`, laid out channel-planar:
    /// `buffer[0..samples]` is channel 0, `buffer[samples..2*samples]`
    /// channel 1, and so on for this source's channel count.
    fn get_audio(&mut self, buffer: &mut [Sample], samples: usize);

    /// True once the source has no more audio to produce. Looping sources
    /// rewind themselves and never end; the engine-level looping flag only
    /// keeps the voice alive.
    fn has_ended(&self) -> bool;

    /// Restart from the beginning, where supported.
    fn rewind(&mut self) -> EngineResult<()> {
        Err(EngineError::NotImplemented)
    }
}
