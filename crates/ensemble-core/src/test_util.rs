//! Shared test fixtures: generated sources, a gain filter, and engines
//! on the null backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::backend::BackendId;
use crate::engine::{Engine, EngineConfig};
use crate::filter::{Filter, FilterInstance};
use crate::source::{AudioSource, SourceInstance};
use crate::types::{Sample, FILTERS_PER_STREAM};

/// Engine on the null backend, driven manually through `mix`.
pub fn test_engine(sample_rate: u32) -> Engine {
    test_engine_with_flags(sample_rate, 0)
}

pub fn test_engine_with_flags(sample_rate: u32, flags: u32) -> Engine {
    Engine::init(
        &EngineConfig::default()
            .with_backend(BackendId::Null)
            .with_sample_rate(sample_rate)
            .with_buffer_size(512)
            .with_flags(flags),
    )
    .expect("null backend init cannot fail")
}

/// Endless constant-valued source; counts the samples it serves.
pub struct ConstSource {
    values: [Sample; 2],
    channels: usize,
    rate: f32,
    filter: Option<GainFilter>,
    served: Arc<AtomicUsize>,
}

impl ConstSource {
    pub fn mono(value: Sample, rate: f32) -> Self {
        Self {
            values: [value, value],
            channels: 1,
            rate,
            filter: None,
            served: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn stereo(left: Sample, right: Sample, rate: f32) -> Self {
        Self {
            values: [left, right],
            channels: 2,
            rate,
            filter: None,
            served: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Attach a gain filter definition to slot 0.
    pub fn with_filter(mut self, gain: f32) -> Self {
        self.filter = Some(GainFilter { gain });
        self
    }

    /// Total source samples served across all instances.
    pub fn samples_served(&self) -> usize {
        self.served.load(Ordering::Relaxed)
    }
}

impl AudioSource for ConstSource {
    fn create_instance(&self) -> Box<dyn SourceInstance> {
        Box::new(ConstInstance {
            values: self.values,
            channels: self.channels,
            served: Arc::clone(&self.served),
        })
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn base_sample_rate(&self) -> f32 {
        self.rate
    }

    fn filters(&self) -> [Option<&dyn Filter>; FILTERS_PER_STREAM] {
        let mut slots: [Option<&dyn Filter>; FILTERS_PER_STREAM] = [None; FILTERS_PER_STREAM];
        slots[0] = self.filter.as_ref().map(|f| f as &dyn Filter);
        slots
    }
}

struct ConstInstance {
    values: [Sample; 2],
    channels: usize,
    served: Arc<AtomicUsize>,
}

impl SourceInstance for ConstInstance {
    fn get_audio(&mut self, buffer: &mut [Sample], samples: usize) {
        for ch in 0..self.channels {
            buffer[ch * samples..(ch + 1) * samples].fill(self.values[ch]);
        }
        self.served.fetch_add(samples, Ordering::Relaxed);
    }

    fn has_ended(&self) -> bool {
        false
    }
}

/// Mono `[1, 0, 1, 0, ...]` source for resampling tests.
pub struct PulseSource {
    rate: f32,
}

impl PulseSource {
    pub fn new(rate: f32) -> Self {
        Self { rate }
    }
}

impl AudioSource for PulseSource {
    fn create_instance(&self) -> Box<dyn SourceInstance> {
        Box::new(PulseInstance { position: 0 })
    }

    fn base_sample_rate(&self) -> f32 {
        self.rate
    }
}

struct PulseInstance {
    position: usize,
}

impl SourceInstance for PulseInstance {
    fn get_audio(&mut self, buffer: &mut [Sample], samples: usize) {
        for (i, s) in buffer[..samples].iter_mut().enumerate() {
            *s = if (self.position + i) % 2 == 0 { 1.0 } else { 0.0 };
        }
        self.position += samples;
    }

    fn has_ended(&self) -> bool {
        false
    }
}

/// Mono source producing `length` samples of `value`, then ending.
pub struct FiniteSource {
    value: Sample,
    rate: f32,
    length: usize,
}

impl FiniteSource {
    pub fn new(value: Sample, rate: f32, length: usize) -> Self {
        Self { value, rate, length }
    }
}

impl AudioSource for FiniteSource {
    fn create_instance(&self) -> Box<dyn SourceInstance> {
        Box::new(FiniteInstance {
            value: self.value,
            remaining: self.length,
        })
    }

    fn base_sample_rate(&self) -> f32 {
        self.rate
    }
}

struct FiniteInstance {
    value: Sample,
    remaining: usize,
}

impl SourceInstance for FiniteInstance {
    fn get_audio(&mut self, buffer: &mut [Sample], samples: usize) {
        let n = self.remaining.min(samples);
        buffer[..n].fill(self.value);
        buffer[n..samples].fill(0.0);
        self.remaining -= n;
    }

    fn has_ended(&self) -> bool {
        self.remaining == 0
    }
}

/// Filter definition that scales every sample by a constant.
pub struct GainFilter {
    pub gain: f32,
}

impl Filter for GainFilter {
    fn create_instance(&self) -> Box<dyn FilterInstance> {
        Box::new(GainFilterInstance { gain: self.gain })
    }
}

struct GainFilterInstance {
    gain: f32,
}

impl FilterInstance for GainFilterInstance {
    fn filter(
        &mut self,
        buffer: &mut [Sample],
        samples: usize,
        channels: usize,
        _sample_rate: f32,
        _stream_time: f64,
    ) {
        for s in buffer[..samples * channels].iter_mut() {
            *s *= self.gain;
        }
    }
}
