//! Core audio engine
//!
//! This module contains the mixing engine proper:
//! - Engine: state, lifecycle, and the public control surface
//! - Mixer: the per-callback tick and the bus accumulator
//! - Selector: audibility classification and the voice cap
//! - Clipper: output amplitude bounding

mod clipper;
mod engine;
mod mixer;
mod selector;

pub use engine::{engine_flags, Engine, EngineConfig, Handle, PlayOptions, DEFAULT_SAMPLE_RATE};

pub(crate) use engine::EngineCore;
