//! Common types and constants for the ensemble engine
//!
//! This module holds the engine-wide constants, the sample type, and the
//! channel layout conversions used at the edges of the mixer.

/// Audio sample type (32-bit float throughout the engine)
pub type Sample = f32;

/// Fixed block size the resampler consumes per refill, in source frames.
/// Each voice pulls source data in blocks of this size and resamples them
/// to the output rate.
pub const SAMPLE_GRANULARITY: usize = 512;

/// Maximum number of channels a voice can carry (mono or stereo)
pub const MAX_CHANNELS: usize = 2;

/// Number of filter slots per voice and on the engine output
pub const FILTERS_PER_STREAM: usize = 8;

/// Total number of voice slots
pub const VOICE_COUNT: usize = 1024;

/// Fractional bits of the resampler's fixed-point phase accumulator
pub const FIXPOINT_FRAC_BITS: u32 = 20;

/// One source sample in fixed-point phase units
pub const FIXPOINT_FRAC_MUL: u32 = 1 << FIXPOINT_FRAC_BITS;

/// Mask extracting the fractional part of a fixed-point phase
pub const FIXPOINT_FRAC_MASK: u32 = FIXPOINT_FRAC_MUL - 1;

/// Convert channel-planar samples (111222) to interleaved frames (121212).
///
/// `src` holds `channels` runs of `samples` values each; `dst` receives
/// `samples` frames of `channels` values each.
pub fn interlace_samples(src: &[Sample], dst: &mut [Sample], samples: usize, channels: usize) {
    let mut c = 0;
    for j in 0..channels {
        for i in (j..samples * channels).step_by(channels) {
            dst[i] = src[c];
            c += 1;
        }
    }
}

/// Convert interleaved frames (121212) to channel-planar samples (111222).
///
/// Exact inverse of [`interlace_samples`].
pub fn deinterlace_samples(src: &[Sample], dst: &mut [Sample], samples: usize, channels: usize) {
    let mut c = 0;
    for j in 0..channels {
        for i in (j..samples * channels).step_by(channels) {
            dst[c] = src[i];
            c += 1;
        }
    }
}
