//! Per-playback voice state

use crate::fader::Fader;
use crate::filter::FilterInstance;
use crate::source::SourceInstance;
use crate::types::{Sample, FILTERS_PER_STREAM, MAX_CHANNELS, SAMPLE_GRANULARITY};

/// Voice flag bits.
pub(crate) mod flags {
    /// Voice survives end-of-source removal; the source is expected to
    /// rewind itself.
    pub const LOOPING: u32 = 1 << 0;
    /// Voice is never evicted by the free-slot search.
    pub const PROTECTED: u32 = 1 << 1;
    /// Voice is not mixed or ticked.
    pub const PAUSED: u32 = 1 << 2;
    /// Overall volume is below the audibility threshold.
    pub const INAUDIBLE: u32 = 1 << 3;
    /// Stop the voice outright when it becomes inaudible.
    pub const INAUDIBLE_KILL: u32 = 1 << 4;
    /// Keep advancing the source while inaudible (must-live).
    pub const INAUDIBLE_TICK: u32 = 1 << 5;
}

/// Overall volume below which a voice counts as inaudible.
const INAUDIBLE_THRESHOLD: f32 = 0.01;

/// State of one playing sound: its source instance, resample position,
/// and mix parameters.
pub(crate) struct Voice {
    /// Live source this voice pulls samples from
    pub source: Box<dyn SourceInstance>,
    /// Generation tag baked into the voice's handle
    pub play_index: u32,
    /// Destination bus (0 is the master)
    pub bus_handle: u32,
    pub flags: u32,
    /// Channel count of the source (1 or 2)
    pub channels: usize,
    /// Native rate of the source
    pub base_sample_rate: f32,
    /// Effective rate: base rate times relative play speed
    pub sample_rate: f32,
    pub relative_play_speed: f32,
    /// Volume as set by the caller or a fader
    pub set_volume: f32,
    /// Loudness used for audibility culling
    pub overall_volume: f32,
    /// Pan as set by the caller or a fader
    pub pan: f32,
    /// Target per-channel gains derived from pan and volume
    pub channel_volume: [f32; MAX_CHANNELS],
    /// Previous tick's gain endpoints; the pan ramp starts here
    pub current_channel_volume: [f32; MAX_CHANNELS],
    /// Fixed-point read phase into the current resample block
    pub src_offset: u32,
    /// Output samples still owed from the current block at a tick boundary
    pub leftover_samples: u32,
    /// Output samples to skip before the voice starts sounding
    pub delay_samples: u32,
    /// Ping-pong source blocks: `[0]` is current, `[1]` is previous
    pub resample_data: [Box<[Sample]>; 2],
    pub filters: [Option<Box<dyn FilterInstance>>; FILTERS_PER_STREAM],
    pub volume_fader: Fader,
    pub pan_fader: Fader,
    pub relative_play_speed_fader: Fader,
    pub pause_scheduler: Fader,
    pub stop_scheduler: Fader,
    /// Set during the tick when any fader touched this voice
    pub active_fader: bool,
    /// Seconds of audio this voice has been live
    pub stream_time: f64,
}

impl Voice {
    pub fn new(
        source: Box<dyn SourceInstance>,
        channels: usize,
        base_sample_rate: f32,
        play_index: u32,
    ) -> Self {
        let slab = || vec![0.0; SAMPLE_GRANULARITY * MAX_CHANNELS].into_boxed_slice();
        Self {
            source,
            play_index,
            bus_handle: 0,
            flags: 0,
            channels: channels.clamp(1, MAX_CHANNELS),
            base_sample_rate,
            sample_rate: base_sample_rate,
            relative_play_speed: 1.0,
            set_volume: 1.0,
            overall_volume: 1.0,
            pan: 0.0,
            channel_volume: [1.0; MAX_CHANNELS],
            current_channel_volume: [1.0; MAX_CHANNELS],
            src_offset: 0,
            leftover_samples: 0,
            delay_samples: 0,
            resample_data: [slab(), slab()],
            filters: std::array::from_fn(|_| None),
            volume_fader: Fader::default(),
            pan_fader: Fader::default(),
            relative_play_speed_fader: Fader::default(),
            pause_scheduler: Fader::default(),
            stop_scheduler: Fader::default(),
            active_fader: false,
            stream_time: 0.0,
        }
    }

    #[inline]
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: u32, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.has_flag(flags::PAUSED)
    }

    /// Swap the current and previous resample blocks. Pointer-level; the
    /// slabs themselves never move.
    #[inline]
    pub fn swap_resample_buffers(&mut self) {
        self.resample_data.swap(0, 1);
    }

    /// Apply the constant-power pan law: -1 is hard left, +1 hard right.
    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan;
        let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
        self.channel_volume[0] = angle.cos();
        self.channel_volume[1] = angle.sin();
    }

    /// Recompute the culling volume and the audibility flag.
    pub fn update_overall_volume(&mut self) {
        self.overall_volume = self.set_volume;
        let inaudible = self.overall_volume < INAUDIBLE_THRESHOLD;
        self.set_flag(flags::INAUDIBLE, inaudible);
    }

    pub fn set_relative_play_speed(&mut self, speed: f32) {
        self.relative_play_speed = speed;
        self.sample_rate = self.base_sample_rate * speed;
    }
}
