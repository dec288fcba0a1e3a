//! Ensemble - a real-time polyphonic audio mixing engine
//!
//! On every device callback the engine composites a bounded set of
//! playing voices into an interleaved stereo buffer: each voice pulls
//! from an opaque [`AudioSource`], is resampled to the output rate with a
//! fixed-point phase accumulator, optionally filtered, panned and faded,
//! then summed, clipped, and handed to the device.
//!
//! ```no_run
//! use ensemble_core::{Engine, EngineConfig};
//! # use ensemble_core::{AudioSource, SourceInstance};
//! # struct Tone;
//! # impl AudioSource for Tone {
//! #     fn create_instance(&self) -> Box<dyn SourceInstance> { unimplemented!() }
//! # }
//!
//! let engine = Engine::init(&EngineConfig::default())?;
//! let tone = Tone;
//! let handle = engine.play(&tone);
//! engine.fade_volume(handle, 0.0, 2.0);
//! engine.schedule_stop(handle, 2.0);
//! # Ok::<(), ensemble_core::EngineError>(())
//! ```

pub mod audio;
pub mod engine;
pub mod error;
pub mod filter;
pub mod source;
pub mod types;

mod fader;
mod resampler;
mod voice;

#[cfg(test)]
mod test_util;

pub use audio::backend::BackendId;
pub use engine::{engine_flags, Engine, EngineConfig, Handle, PlayOptions};
pub use error::{EngineError, EngineResult};
pub use filter::{Filter, FilterInstance};
pub use source::{AudioSource, SourceInstance};
