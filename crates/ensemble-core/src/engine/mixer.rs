//! The mixer tick
//!
//! [`EngineCore::mix`] is the pull callback: it advances the stream
//! clock, drives faders and schedulers, rebuilds the active voice list
//! when dirty, accumulates every active voice into the planar bus buffer,
//! runs the output filters, clips, and interlaces into the caller's
//! buffer. The audio mutex is held for the duration; control operations
//! serialize against the whole tick.

use super::clipper::clip;
use super::engine::{engine_flags, EngineCore, EngineState};
use crate::fader::FaderState;
use crate::resampler::resample;
use crate::types::{
    interlace_samples, Sample, FIXPOINT_FRAC_BITS, FIXPOINT_FRAC_MUL, SAMPLE_GRANULARITY,
};
use crate::voice::{flags, Voice};

/// One full source block in fixed-point phase units.
const GRANULARITY_FIXED: u32 = (SAMPLE_GRANULARITY as u32) << FIXPOINT_FRAC_BITS;

impl EngineCore {
    /// Produce `samples` interleaved stereo frames into `buffer`.
    pub(crate) fn mix(&self, buffer: &mut [Sample], samples: usize) {
        if samples == 0 {
            return;
        }
        let buffer = &mut buffer[..samples * 2];

        let mut state = self.lock();
        let state = &mut *state;
        if state.sample_rate == 0 {
            // Backend has not finished postinit yet
            buffer.fill(0.0);
            return;
        }

        let buffertime = samples as f64 / state.sample_rate as f64;
        state.stream_time += buffertime;
        state.last_clocked_time = 0.0;

        let volume0 = state.global_volume;
        if state.global_volume_fader.state != FaderState::Inactive {
            let t = state.stream_time;
            state.global_volume = state.global_volume_fader.get(t);
        }
        let volume1 = state.global_volume;

        state.process_faders(buffertime);

        if state.active_voice_dirty {
            state.calc_active_voices();
        }

        state.ensure_scratch(samples);

        let sample_rate = state.sample_rate as f32;
        let stream_time = state.stream_time;
        state.mix_bus(buffer, samples, 0, sample_rate, stream_time);

        for filter in state.output_filters.iter_mut().flatten() {
            filter.filter(buffer, samples, 2, sample_rate, stream_time);
        }

        // Clip into scratch, then interlace back into the caller's buffer
        let roundoff = state.flags & engine_flags::CLIP_ROUNDOFF != 0;
        clip(
            buffer,
            &mut state.scratch[..samples * 2],
            samples,
            volume0,
            volume1,
            roundoff,
            state.post_clip_scaler,
        );
        interlace_samples(&state.scratch[..samples * 2], buffer, samples, 2);

        if state.flags & engine_flags::ENABLE_VISUALIZATION != 0 {
            state.update_visualization(buffer, samples);
        }
    }
}

impl EngineState {
    /// Advance voice clocks, evaluate faders, and fire elapsed schedulers.
    fn process_faders(&mut self, buffertime: f64) {
        let global_fader_active = self.global_volume_fader.is_active();

        for i in 0..self.highest_voice {
            let mut volume_changed = false;
            let mut fired_pause = false;
            let mut fired_stop = false;

            if let Some(voice) = self.voices[i].as_mut() {
                if voice.is_paused() {
                    continue;
                }

                voice.active_fader = global_fader_active;
                voice.stream_time += buffertime;
                let t = voice.stream_time;

                if voice.relative_play_speed_fader.is_active() {
                    let speed = voice.relative_play_speed_fader.get(t);
                    if speed > 0.0 {
                        voice.set_relative_play_speed(speed);
                    }
                    voice.active_fader = true;
                }

                if voice.volume_fader.is_active() {
                    voice.set_volume = voice.volume_fader.get(t);
                    voice.update_overall_volume();
                    voice.active_fader = true;
                    volume_changed = true;
                }

                if voice.pan_fader.is_active() {
                    let pan = voice.pan_fader.get(t);
                    voice.set_pan(pan);
                    voice.active_fader = true;
                }

                if voice.has_flag(flags::INAUDIBLE) && voice.has_flag(flags::INAUDIBLE_KILL) {
                    fired_stop = true;
                }

                if voice.pause_scheduler.state != FaderState::Inactive {
                    voice.pause_scheduler.get(t);
                    if voice.pause_scheduler.state == FaderState::Fired {
                        voice.pause_scheduler.deactivate();
                        fired_pause = true;
                    }
                }

                if voice.stop_scheduler.state != FaderState::Inactive {
                    voice.stop_scheduler.get(t);
                    if voice.stop_scheduler.state == FaderState::Fired {
                        voice.stop_scheduler.deactivate();
                        fired_stop = true;
                    }
                }
            }

            if volume_changed {
                self.active_voice_dirty = true;
            }
            if fired_pause {
                if let Some(voice) = self.voices[i].as_mut() {
                    voice.set_flag(flags::PAUSED, true);
                }
                self.active_voice_dirty = true;
            }
            if fired_stop {
                self.stop_voice(i);
            }
        }
    }

    /// Accumulate every active voice routed to `bus` into the planar
    /// two-channel buffer (`buffer[0..samples]` left,
    /// `buffer[samples..2*samples]` right).
    fn mix_bus(
        &mut self,
        buffer: &mut [Sample],
        samples: usize,
        bus: u32,
        sample_rate: f32,
        stream_time: f64,
    ) {
        buffer[..samples * 2].fill(0.0);

        for n in 0..self.active_voice_count {
            let slot = self.active_voice[n];
            let ended = {
                let Some(voice) = self.voices[slot].as_mut() else {
                    continue;
                };
                if voice.bus_handle != bus || voice.is_paused() {
                    continue;
                }

                if !voice.has_flag(flags::INAUDIBLE) {
                    Self::mix_voice(voice, buffer, &mut self.scratch, samples, sample_rate, stream_time);
                } else if voice.has_flag(flags::INAUDIBLE_TICK) {
                    Self::tick_voice(voice, samples, sample_rate);
                } else {
                    continue;
                }

                !voice.has_flag(flags::LOOPING) && voice.source.has_ended()
            };

            if ended {
                self.stop_voice(slot);
            }
        }
    }

    /// Advance one audible voice by exactly `samples` output samples and
    /// sum it into the bus with a per-sample pan ramp.
    fn mix_voice(
        voice: &mut Voice,
        buffer: &mut [Sample],
        scratch: &mut [Sample],
        samples: usize,
        sample_rate: f32,
        stream_time: f64,
    ) {
        let step = voice.sample_rate / sample_rate;
        // Cap the step below one granule so every pass through the block
        // makes forward progress.
        let step_fixed =
            ((step * FIXPOINT_FRAC_MUL as f32).floor() as u32).min(GRANULARITY_FIXED - 1);

        let mut outofs = 0;
        if voice.delay_samples > 0 {
            if voice.delay_samples as usize > samples {
                outofs = samples;
                voice.delay_samples -= samples as u32;
            } else {
                outofs = voice.delay_samples as usize;
                voice.delay_samples = 0;
            }
            // The skipped span still gets pan-summed; it must be silence
            for ch in 0..voice.channels {
                scratch[ch * samples..ch * samples + outofs].fill(0.0);
            }
        }

        if step_fixed == 0 {
            // Degenerate rate ratio: no output this tick. Commit the ramp
            // endpoints so the next audible tick starts from the targets.
            voice.current_channel_volume[0] = voice.channel_volume[0] * voice.overall_volume;
            voice.current_channel_volume[1] = voice.channel_volume[1] * voice.overall_volume;
            return;
        }

        while outofs < samples {
            if voice.leftover_samples == 0 {
                voice.swap_resample_buffers();

                let block = SAMPLE_GRANULARITY * voice.channels;
                if voice.source.has_ended() {
                    voice.resample_data[0][..block].fill(0.0);
                } else {
                    voice
                        .source
                        .get_audio(&mut voice.resample_data[0][..block], SAMPLE_GRANULARITY);
                }

                if voice.src_offset < GRANULARITY_FIXED {
                    voice.src_offset = 0;
                } else {
                    voice.src_offset -= GRANULARITY_FIXED;
                }

                let (channels, rate) = (voice.channels, voice.sample_rate);
                for filter in voice.filters.iter_mut().flatten() {
                    filter.filter(
                        &mut voice.resample_data[0][..block],
                        SAMPLE_GRANULARITY,
                        channels,
                        rate,
                        stream_time,
                    );
                }
            } else {
                voice.leftover_samples = 0;
            }

            let mut writesamples = 0;
            if voice.src_offset < GRANULARITY_FIXED {
                writesamples = ((GRANULARITY_FIXED - voice.src_offset) / step_fixed) as usize + 1;
                // Never read past the current block
                let last = (writesamples as u64 * step_fixed as u64 + voice.src_offset as u64)
                    >> FIXPOINT_FRAC_BITS;
                if last >= SAMPLE_GRANULARITY as u64 {
                    writesamples -= 1;
                }
            }

            if writesamples + outofs > samples {
                voice.leftover_samples = ((writesamples + outofs) - samples) as u32;
                writesamples = samples - outofs;
            }

            if writesamples > 0 {
                for ch in 0..voice.channels {
                    let src = &voice.resample_data[0][SAMPLE_GRANULARITY * ch..SAMPLE_GRANULARITY * (ch + 1)];
                    let prev = &voice.resample_data[1][SAMPLE_GRANULARITY * ch..SAMPLE_GRANULARITY * (ch + 1)];
                    let dst = &mut scratch[samples * ch + outofs..samples * ch + outofs + writesamples];
                    resample(src, prev, dst, voice.src_offset, step_fixed);
                }
            }

            outofs += writesamples;
            voice.src_offset += writesamples as u32 * step_fixed;
        }

        // Pan ramp from the previous tick's endpoints to the current
        // targets; click-free across parameter changes.
        let mut lpan = voice.current_channel_volume[0];
        let mut rpan = voice.current_channel_volume[1];
        let lpand = voice.channel_volume[0] * voice.overall_volume;
        let rpand = voice.channel_volume[1] * voice.overall_volume;
        let lpani = (lpand - lpan) / samples as f32;
        let rpani = (rpand - rpan) / samples as f32;

        let (left, right) = buffer.split_at_mut(samples);
        if voice.channels == 2 {
            for j in 0..samples {
                left[j] += scratch[j] * lpan;
                right[j] += scratch[samples + j] * rpan;
                lpan += lpani;
                rpan += rpani;
            }
        } else {
            for j in 0..samples {
                let s = scratch[j];
                left[j] += s * lpan;
                right[j] += s * rpan;
                lpan += lpani;
                rpan += rpani;
            }
        }

        voice.current_channel_volume[0] = lpand;
        voice.current_channel_volume[1] = rpand;
    }

    /// Advance an inaudible must-live voice: same block bookkeeping as
    /// the audible path, but no filters, no resampling, no summing. Keeps
    /// the source position and decoder state moving so a later unmute is
    /// phase-correct.
    fn tick_voice(voice: &mut Voice, samples: usize, sample_rate: f32) {
        let step = voice.sample_rate / sample_rate;
        let step_fixed =
            ((step * FIXPOINT_FRAC_MUL as f32).floor() as u32).min(GRANULARITY_FIXED - 1);

        let mut outofs = 0;
        if voice.delay_samples > 0 {
            if voice.delay_samples as usize > samples {
                outofs = samples;
                voice.delay_samples -= samples as u32;
            } else {
                outofs = voice.delay_samples as usize;
                voice.delay_samples = 0;
            }
        }

        if step_fixed == 0 {
            return;
        }

        while outofs < samples {
            if voice.leftover_samples == 0 {
                voice.swap_resample_buffers();

                if !voice.source.has_ended() {
                    let block = SAMPLE_GRANULARITY * voice.channels;
                    voice
                        .source
                        .get_audio(&mut voice.resample_data[0][..block], SAMPLE_GRANULARITY);
                }

                if voice.src_offset < GRANULARITY_FIXED {
                    voice.src_offset = 0;
                } else {
                    voice.src_offset -= GRANULARITY_FIXED;
                }
            } else {
                voice.leftover_samples = 0;
            }

            let mut writesamples = 0;
            if voice.src_offset < GRANULARITY_FIXED {
                writesamples = ((GRANULARITY_FIXED - voice.src_offset) / step_fixed) as usize + 1;
                let last = (writesamples as u64 * step_fixed as u64 + voice.src_offset as u64)
                    >> FIXPOINT_FRAC_BITS;
                if last >= SAMPLE_GRANULARITY as u64 {
                    writesamples -= 1;
                }
            }

            if writesamples + outofs > samples {
                voice.leftover_samples = ((writesamples + outofs) - samples) as u32;
                writesamples = samples - outofs;
            }

            outofs += writesamples;
            voice.src_offset += writesamples as u32 * step_fixed;
        }
    }

    /// Copy the first up-to-256 frame sums into the visualization window.
    fn update_visualization(&mut self, buffer: &[Sample], samples: usize) {
        if samples > 255 {
            for (i, slot) in self.visualization_wave_data.iter_mut().enumerate() {
                *slot = buffer[i * 2] + buffer[i * 2 + 1];
            }
        } else {
            // Failsafe for tiny buffers: wrap around
            for (i, slot) in self.visualization_wave_data.iter_mut().enumerate() {
                let j = i % samples;
                *slot = buffer[j * 2] + buffer[j * 2 + 1];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{engine_flags, PlayOptions};
    use crate::test_util::{
        test_engine, test_engine_with_flags, ConstSource, FiniteSource, PulseSource,
    };
    use crate::types::{FIXPOINT_FRAC_MUL, SAMPLE_GRANULARITY};

    /// S1: no voices produce exact silence.
    #[test]
    fn test_silence() {
        let engine = test_engine(44100);
        let mut buffer = vec![1.0; 1024];
        engine.mix(&mut buffer, 512);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    /// S2: a unity-gain constant mono source passes through unchanged.
    #[test]
    fn test_unity_passthrough() {
        let engine = test_engine(44100);
        engine.set_post_clip_scaler(1.0);
        let source = ConstSource::mono(0.5, 44100.0);
        let handle = engine.play(&source);
        engine.set_pan_absolute(handle, 1.0, 1.0);

        let mut buffer = vec![0.0; 512];
        // First tick lets the pan ramp converge to the absolute gains
        engine.mix(&mut buffer, 256);
        engine.mix(&mut buffer, 256);
        for (i, &s) in buffer.iter().enumerate() {
            assert!((s - 0.5).abs() < 1e-6, "sample {} = {}", i, s);
        }
    }

    /// S3: a hot source hard-clips to the post-clip scaler.
    #[test]
    fn test_hard_clip() {
        let engine = test_engine(44100);
        let source = ConstSource::mono(1.5, 44100.0);
        let handle = engine.play(&source);
        engine.set_pan_absolute(handle, 1.0, 1.0);

        let mut buffer = vec![0.0; 512];
        engine.mix(&mut buffer, 256);
        engine.mix(&mut buffer, 256);
        for (i, &s) in buffer.iter().enumerate() {
            assert!((s - 0.95).abs() < 1e-6, "sample {} = {}", i, s);
        }
    }

    /// S4: a half-rate source is nearest-resampled to sample pairs.
    #[cfg(feature = "point-resampler")]
    #[test]
    fn test_resample_double() {
        let engine = test_engine(44100);
        engine.set_post_clip_scaler(1.0);
        let source = PulseSource::new(22050.0);
        let handle = engine.play(&source);
        engine.set_pan_absolute(handle, 1.0, 1.0);

        let mut buffer = vec![0.0; 512];
        engine.mix(&mut buffer, 256);
        engine.mix(&mut buffer, 256);
        // Interleaved stereo of [1,1,0,0,...] per channel
        for frame in 0..256 {
            let expected = if frame % 4 < 2 { 1.0 } else { 0.0 };
            assert!(
                (buffer[frame * 2] - expected).abs() < 1e-6,
                "frame {} = {}",
                frame,
                buffer[frame * 2]
            );
            assert_eq!(buffer[frame * 2], buffer[frame * 2 + 1]);
        }
    }

    /// A half-rate source in linear mode interpolates the midpoints.
    #[cfg(not(feature = "point-resampler"))]
    #[test]
    fn test_resample_double_linear() {
        let engine = test_engine(44100);
        engine.set_post_clip_scaler(1.0);
        let source = PulseSource::new(22050.0);
        let handle = engine.play(&source);
        engine.set_pan_absolute(handle, 1.0, 1.0);

        let mut buffer = vec![0.0; 512];
        engine.mix(&mut buffer, 256);
        engine.mix(&mut buffer, 256);
        // Steady state: exact samples on even phases, 0.5 in between.
        // The second tick starts at absolute frame 256 (multiple of 4).
        for frame in 0..256 {
            let expected = match frame % 4 {
                0 => 0.0,
                2 => 1.0,
                _ => 0.5,
            };
            assert!(
                (buffer[frame * 2] - expected).abs() < 1e-6,
                "frame {} = {} expected {}",
                frame,
                buffer[frame * 2],
                expected
            );
        }
    }

    /// Per-voice filter instances created at play time process the
    /// source blocks.
    #[test]
    fn test_voice_filter_applied() {
        let engine = test_engine(44100);
        engine.set_post_clip_scaler(1.0);
        let source = ConstSource::mono(0.5, 44100.0).with_filter(0.5);
        let handle = engine.play(&source);
        engine.set_pan_absolute(handle, 1.0, 1.0);

        let mut buffer = vec![0.0; 512];
        engine.mix(&mut buffer, 256);
        engine.mix(&mut buffer, 256);
        for (i, &s) in buffer.iter().enumerate() {
            assert!((s - 0.25).abs() < 1e-6, "sample {} = {}", i, s);
        }
    }

    /// Output filters run over the accumulated bus before clipping.
    #[test]
    fn test_output_filter_applied() {
        let engine = test_engine(44100);
        engine.set_post_clip_scaler(1.0);
        engine
            .set_global_filter(0, Some(&crate::test_util::GainFilter { gain: 0.5 }))
            .unwrap();
        let source = ConstSource::mono(0.5, 44100.0);
        let handle = engine.play(&source);
        engine.set_pan_absolute(handle, 1.0, 1.0);

        let mut buffer = vec![0.0; 512];
        engine.mix(&mut buffer, 256);
        engine.mix(&mut buffer, 256);
        for (i, &s) in buffer.iter().enumerate() {
            assert!((s - 0.25).abs() < 1e-6, "sample {} = {}", i, s);
        }
    }

    /// S5: over the cap, only the loudest voices reach the output.
    #[test]
    fn test_voice_cap_culls_quietest() {
        let engine = test_engine(44100);
        engine.set_post_clip_scaler(1.0);
        engine.set_max_active_voices(2).unwrap();

        let loud_src = ConstSource::mono(0.4, 44100.0);
        let mid_src = ConstSource::mono(0.2, 44100.0);
        let quiet_src = ConstSource::mono(0.1, 44100.0);

        let loud = engine.play_with(&loud_src, PlayOptions::default().volume(0.9));
        let mid = engine.play_with(&mid_src, PlayOptions::default().volume(0.5));
        let quiet = engine.play_with(&quiet_src, PlayOptions::default().volume(0.1));
        for &h in &[loud, mid, quiet] {
            engine.set_pan_absolute(h, 1.0, 1.0);
        }

        let mut buffer = vec![0.0; 512];
        engine.mix(&mut buffer, 256);
        engine.mix(&mut buffer, 256);

        // 0.4*0.9 + 0.2*0.5 without any 0.1*0.1 contribution
        let expected = 0.4 * 0.9 + 0.2 * 0.5;
        for (i, &s) in buffer.iter().enumerate() {
            assert!(
                (s - expected).abs() < 1e-5,
                "sample {} = {} expected {}",
                i,
                s,
                expected
            );
        }
    }

    /// S6: a scheduled stop fires on the tick that crosses its deadline.
    #[test]
    fn test_scheduled_stop() {
        let engine = test_engine(1000);
        let source = ConstSource::mono(0.5, 1000.0);
        let handle = engine.play(&source);
        engine.schedule_stop(handle, 1.0);

        let mut buffer = vec![0.0; 2000];
        engine.mix(&mut buffer, 1000);
        assert!(!engine.is_valid_handle(handle), "stop fires at t = 1.0s");
        assert_eq!(engine.voice_count(), 0);

        engine.mix(&mut buffer, 1000);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    /// Scheduled pause fires once and pauses without removing the voice.
    #[test]
    fn test_scheduled_pause() {
        let engine = test_engine(1000);
        let source = ConstSource::mono(0.5, 1000.0);
        let handle = engine.play(&source);
        engine.schedule_pause(handle, 1.0);

        let mut buffer = vec![0.0; 2000];
        engine.mix(&mut buffer, 1000);
        assert_eq!(engine.pause(handle), Some(true));
        assert_eq!(engine.voice_count(), 1);

        engine.mix(&mut buffer, 1000);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    /// Property 1: output never exceeds the post-clip scaler.
    #[test]
    fn test_output_bounded_by_post_clip_scaler() {
        for &flags in &[0, engine_flags::CLIP_ROUNDOFF] {
            let engine = test_engine_with_flags(44100, flags);
            let source = ConstSource::stereo(123.0, -77.0, 44100.0);
            engine.play_with(&source, PlayOptions::default().volume(3.0));
            engine.set_global_volume(2.5);

            let mut buffer = vec![0.0; 1024];
            for _ in 0..4 {
                engine.mix(&mut buffer, 512);
            }
            for (i, &s) in buffer.iter().enumerate() {
                assert!(s.abs() <= 0.95 + 1e-6, "sample {} = {} (flags {})", i, s, flags);
            }
        }
    }

    /// Property 2: the resample phase stays inside the block across ticks.
    #[test]
    fn test_src_offset_invariant() {
        let engine = test_engine(44100);
        let source = ConstSource::mono(0.5, 31337.0);
        let handle = engine.play(&source);
        engine.set_relative_play_speed(handle, 1.3).unwrap();

        let mut buffer = vec![0.0; 1024];
        for _ in 0..20 {
            engine.mix(&mut buffer, 512);
            let state = engine.core().lock();
            let slot = state.voice_from_handle(handle).unwrap();
            let voice = state.voices[slot].as_ref().unwrap();
            assert!(
                voice.src_offset <= (SAMPLE_GRANULARITY as u32) * FIXPOINT_FRAC_MUL,
                "src_offset {} escaped the block",
                voice.src_offset
            );
        }
    }

    /// A play speed pushing the rate ratio past one granule per output
    /// sample still terminates the tick and advances the voice. Without
    /// the step cap, `writesamples` computes to zero on every pass and
    /// the mix loop never finishes.
    #[test]
    fn test_extreme_play_speed_terminates() {
        let engine = test_engine(44100);
        let source = ConstSource::mono(0.5, 44100.0);
        let handle = engine.play(&source);
        engine
            .set_relative_play_speed(handle, 2.0 * SAMPLE_GRANULARITY as f32)
            .unwrap();

        let mut buffer = vec![0.0; 512];
        engine.mix(&mut buffer, 256);

        assert!(engine.is_valid_handle(handle));
        assert!(buffer.iter().all(|&s| s.is_finite()));
        // Capped to one granule per output sample, every pass refills a
        // fresh source block
        assert!(
            source.samples_served() >= SAMPLE_GRANULARITY * 100,
            "source only served {} samples at extreme speed",
            source.samples_served()
        );

        let state = engine.core().lock();
        let slot = state.voice_from_handle(handle).unwrap();
        let voice = state.voices[slot].as_ref().unwrap();
        assert!(voice.src_offset <= (SAMPLE_GRANULARITY as u32) * FIXPOINT_FRAC_MUL);
    }

    /// Property 6: pan ramps land exactly on their endpoints, so tick
    /// boundaries are continuous.
    #[test]
    fn test_pan_ramp_continuity() {
        let engine = test_engine(44100);
        let source = ConstSource::mono(0.5, 44100.0);
        let handle = engine.play_with(&source, PlayOptions::default().volume(0.8));

        let mut buffer = vec![0.0; 512];
        engine.mix(&mut buffer, 256);
        engine.set_pan(handle, 0.6);
        engine.mix(&mut buffer, 256);

        let state = engine.core().lock();
        let slot = state.voice_from_handle(handle).unwrap();
        let voice = state.voices[slot].as_ref().unwrap();
        for ch in 0..2 {
            let target = voice.channel_volume[ch] * voice.overall_volume;
            assert!(
                (voice.current_channel_volume[ch] - target).abs() < 1e-6,
                "channel {} endpoint {} target {}",
                ch,
                voice.current_channel_volume[ch],
                target
            );
        }
    }

    /// Property 7: looping voices survive indefinitely, finite voices are
    /// removed on the tick after their source ends.
    #[test]
    fn test_voice_end_of_life() {
        let engine = test_engine(44100);

        let finite = FiniteSource::new(0.5, 44100.0, 600);
        let finite_handle = engine.play(&finite);

        let looping = ConstSource::mono(0.25, 44100.0);
        let looping_handle = engine.play_with(&looping, PlayOptions::default().looping(true));

        let mut buffer = vec![0.0; 1024];
        for _ in 0..8 {
            engine.mix(&mut buffer, 512);
        }
        assert!(!engine.is_valid_handle(finite_handle));
        assert!(engine.is_valid_handle(looping_handle));
    }

    /// The finite source's samples still reach the output before it ends.
    #[test]
    fn test_finite_source_audible_before_end() {
        let engine = test_engine(44100);
        engine.set_post_clip_scaler(1.0);
        let finite = FiniteSource::new(0.5, 44100.0, 600);
        let handle = engine.play(&finite);
        engine.set_pan_absolute(handle, 1.0, 1.0);

        let mut buffer = vec![0.0; 512];
        engine.mix(&mut buffer, 256);
        engine.mix(&mut buffer, 256);
        assert!(buffer.iter().any(|&s| s > 0.4));
    }

    /// An inaudible must-live voice keeps consuming its source without
    /// contributing to the mix.
    #[test]
    fn test_inaudible_tick_advances_source() {
        let engine = test_engine(44100);
        let source = ConstSource::mono(0.5, 44100.0);
        let handle = engine.play_with(&source, PlayOptions::default().volume(0.0));
        engine.set_inaudible_behavior(handle, true, false);

        let mut buffer = vec![0.0; 1024];
        engine.mix(&mut buffer, 512);
        assert!(buffer.iter().all(|&s| s == 0.0), "must not reach the mix");
        assert!(
            source.samples_served() >= 512,
            "source only served {} samples while ticking",
            source.samples_served()
        );
        assert!(engine.is_valid_handle(handle));
    }

    /// An inaudible voice with the kill flag is stopped by the tick.
    #[test]
    fn test_inaudible_kill_stops_voice() {
        let engine = test_engine(44100);
        let source = ConstSource::mono(0.5, 44100.0);
        let handle = engine.play(&source);
        engine.set_inaudible_behavior(handle, false, true);
        engine.set_volume(handle, 0.0);

        let mut buffer = vec![0.0; 1024];
        engine.mix(&mut buffer, 512);
        assert!(!engine.is_valid_handle(handle));
    }

    /// A voice delay postpones the first audible sample.
    #[test]
    fn test_delay_samples_shift_start() {
        let engine = test_engine(44100);
        engine.set_post_clip_scaler(1.0);
        let source = ConstSource::mono(0.5, 44100.0);
        let handle =
            engine.play_with(&source, PlayOptions::default().delay_samples(100));
        engine.set_pan_absolute(handle, 1.0, 1.0);

        let mut buffer = vec![0.0; 512];
        engine.mix(&mut buffer, 256);
        for frame in 0..100 {
            assert_eq!(buffer[frame * 2], 0.0, "frame {} should be delayed", frame);
        }
        assert!(buffer[220 * 2] > 0.0, "audio follows after the delay");
    }

    /// Global volume fades ramp inside a single tick without stepping.
    #[test]
    fn test_global_volume_fade_ramps() {
        let engine = test_engine(1000);
        engine.set_post_clip_scaler(1.0);
        let source = ConstSource::mono(0.5, 1000.0);
        let handle = engine.play(&source);
        engine.set_pan_absolute(handle, 1.0, 1.0);

        let mut buffer = vec![0.0; 2000];
        engine.mix(&mut buffer, 1000);

        engine.fade_global_volume(0.0, 1.0);
        engine.mix(&mut buffer, 1000);
        let early = buffer[10 * 2].abs();
        let late = buffer[990 * 2].abs();
        assert!(early > late, "fade must decrease within the tick: {} vs {}", early, late);
        assert!(engine.global_volume() < 1e-6);
    }

    /// Visualization captures the mixed output when enabled.
    #[test]
    fn test_visualization_wave_window() {
        let engine =
            test_engine_with_flags(44100, engine_flags::ENABLE_VISUALIZATION);
        engine.set_post_clip_scaler(1.0);
        let source = ConstSource::mono(0.5, 44100.0);
        let handle = engine.play(&source);
        engine.set_pan_absolute(handle, 1.0, 1.0);

        let mut buffer = vec![0.0; 1024];
        engine.mix(&mut buffer, 512);
        engine.mix(&mut buffer, 512);

        let wave = engine.wave();
        for (i, &s) in wave.iter().enumerate() {
            assert!((s - 1.0).abs() < 1e-5, "wave[{}] = {}", i, s);
        }
    }

    /// Tiny buffers fall back to modulo indexing instead of overreading.
    #[test]
    fn test_visualization_small_buffer_failsafe() {
        let engine =
            test_engine_with_flags(44100, engine_flags::ENABLE_VISUALIZATION);
        let source = ConstSource::mono(0.5, 44100.0);
        let handle = engine.play(&source);
        engine.set_pan_absolute(handle, 1.0, 1.0);

        let mut buffer = vec![0.0; 64];
        engine.mix(&mut buffer, 32);
        engine.mix(&mut buffer, 32);
        let wave = engine.wave();
        assert!(wave.iter().all(|&s| s.is_finite()));
        assert!(wave[255] != 0.0, "wrapped window is populated");
    }

    /// Faders mark the voice as fader-driven during the tick.
    #[test]
    fn test_active_fader_hint() {
        let engine = test_engine(44100);
        let source = ConstSource::mono(0.5, 44100.0);
        let handle = engine.play(&source);
        engine.fade_volume(handle, 0.1, 10.0);

        let mut buffer = vec![0.0; 1024];
        engine.mix(&mut buffer, 512);

        let state = engine.core().lock();
        let slot = state.voice_from_handle(handle).unwrap();
        assert!(state.voices[slot].as_ref().unwrap().active_fader);
    }
}
