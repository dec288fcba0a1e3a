//! Engine state, lifecycle, and control surface
//!
//! The engine is an explicit value: [`Engine::init`] opens a backend and
//! returns it, dropping it (or calling [`Engine::deinit`]) closes
//! everything down. All mutable state lives behind a single audio mutex;
//! every control operation locks it, and the mixer tick holds it for the
//! duration of the callback. The critical section is short relative to
//! buffer playout time, so contention stays negligible.

use std::sync::{Arc, Mutex, MutexGuard};

use realfft::RealFftPlanner;

use crate::audio::backend::{self, BackendHandle, BackendId};
use crate::error::{EngineError, EngineResult};
use crate::fader::Fader;
use crate::filter::{Filter, FilterInstance};
use crate::source::AudioSource;
use crate::types::{Sample, FILTERS_PER_STREAM, MAX_CHANNELS, SAMPLE_GRANULARITY, VOICE_COUNT};
use crate::voice::{flags, Voice};

/// Engine behavior flags, combined bitwise in [`EngineConfig::with_flags`].
pub mod engine_flags {
    /// Soft-saturate the output instead of hard clipping.
    pub const CLIP_ROUNDOFF: u32 = 1 << 0;
    /// Keep a 256-sample window of the output for wave and FFT queries.
    pub const ENABLE_VISUALIZATION: u32 = 1 << 1;
}

/// Default output rate when the config does not request one.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default cap on simultaneously mixed voices.
const DEFAULT_MAX_ACTIVE_VOICES: usize = 16;

/// Low bits of a handle carry the voice slot plus one; the rest carry the
/// play-index generation tag.
const HANDLE_SLOT_BITS: u32 = 12;
const HANDLE_SLOT_MASK: u32 = (1 << HANDLE_SLOT_BITS) - 1;
const PLAY_INDEX_MASK: u32 = (1 << (32 - HANDLE_SLOT_BITS)) - 1;

/// Identifies one playback started by a `play*` call.
///
/// Handles go stale when the voice stops; operations on a stale handle are
/// no-ops. The zero handle is never valid and is returned when no voice
/// slot could be claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub(crate) u32);

impl Handle {
    /// The never-valid handle.
    pub const INVALID: Handle = Handle(0);

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

/// Options for starting a playback.
#[derive(Debug, Clone, Copy)]
pub struct PlayOptions {
    pub volume: f32,
    /// -1 hard left .. +1 hard right
    pub pan: f32,
    pub paused: bool,
    pub looping: bool,
    /// Destination bus; 0 is the master
    pub bus: u32,
    /// Output samples to skip before the voice starts sounding
    pub delay_samples: u32,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            paused: false,
            looping: false,
            bus: 0,
            delay_samples: 0,
        }
    }
}

impl PlayOptions {
    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn pan(mut self, pan: f32) -> Self {
        self.pan = pan;
        self
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn bus(mut self, bus: u32) -> Self {
        self.bus = bus;
        self
    }

    pub fn delay_samples(mut self, delay_samples: u32) -> Self {
        self.delay_samples = delay_samples;
        self
    }
}

/// Configuration for [`Engine::init`].
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Which backend to open; `Auto` walks the preference list.
    pub backend: BackendId,
    /// Requested output rate (None = 44100)
    pub sample_rate: Option<u32>,
    /// Requested buffer size in frames (None = backend default)
    pub buffer_size: Option<u32>,
    /// [`engine_flags`] bits
    pub flags: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendId::Auto,
            sample_rate: None,
            buffer_size: None,
            flags: 0,
        }
    }
}

impl EngineConfig {
    pub fn with_backend(mut self, backend: BackendId) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn with_buffer_size(mut self, frames: u32) -> Self {
        self.buffer_size = Some(frames);
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}

/// Everything behind the audio mutex.
pub(crate) struct EngineState {
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub flags: u32,
    pub global_volume: f32,
    pub post_clip_scaler: f32,
    /// Monotonic seconds of audio produced
    pub stream_time: f64,
    /// Reference time for `play_clocked` within the current tick window
    pub last_clocked_time: f64,
    pub voices: Vec<Option<Voice>>,
    /// Exclusive upper bound of voice slots ever touched
    pub highest_voice: usize,
    pub active_voice: Vec<usize>,
    pub active_voice_count: usize,
    pub active_voice_dirty: bool,
    pub max_active_voices: usize,
    play_index: u32,
    /// Per-voice channel staging and post-mix clip staging. Holds
    /// `2 * scratch_size` samples.
    pub scratch: Vec<Sample>,
    /// Scratch capacity in frames
    pub scratch_size: usize,
    pub output_filters: [Option<Box<dyn FilterInstance>>; FILTERS_PER_STREAM],
    pub global_volume_fader: Fader,
    pub visualization_wave_data: [Sample; 256],
}

impl EngineState {
    fn new() -> Self {
        let mut voices = Vec::with_capacity(VOICE_COUNT);
        voices.resize_with(VOICE_COUNT, || None);
        Self {
            sample_rate: 0,
            buffer_size: 0,
            flags: 0,
            global_volume: 1.0,
            post_clip_scaler: 0.95,
            stream_time: 0.0,
            last_clocked_time: 0.0,
            voices,
            highest_voice: 0,
            active_voice: vec![0; VOICE_COUNT],
            active_voice_count: 0,
            active_voice_dirty: true,
            max_active_voices: DEFAULT_MAX_ACTIVE_VOICES,
            play_index: 0,
            scratch: Vec::new(),
            scratch_size: 0,
            output_filters: std::array::from_fn(|_| None),
            global_volume_fader: Fader::default(),
            visualization_wave_data: [0.0; 256],
        }
    }

    /// Called by the backend once the device parameters are negotiated,
    /// before the first callback can fire. Pre-reserves scratch so the
    /// tick stays allocation-free for every buffer size up to the
    /// negotiated one.
    pub fn postinit(&mut self, sample_rate: u32, buffer_size: u32, flags: u32) {
        self.global_volume = 1.0;
        self.post_clip_scaler = 0.95;
        self.sample_rate = sample_rate;
        self.buffer_size = buffer_size;
        self.flags = flags;
        let frames = (buffer_size as usize).max(SAMPLE_GRANULARITY * 2).max(4096);
        self.scratch_size = frames;
        self.scratch = vec![0.0; frames * 2];
    }

    /// Grow scratch when a callback asks for more frames than negotiated.
    pub fn ensure_scratch(&mut self, frames: usize) {
        if frames > self.scratch_size {
            log::warn!(
                "scratch regrown on the audio thread: {} -> {} frames",
                self.scratch_size,
                frames
            );
            self.scratch_size = frames;
            self.scratch.resize(frames * 2, 0.0);
        }
    }

    fn handle_for_slot(&self, slot: usize) -> Handle {
        match &self.voices[slot] {
            Some(v) => Handle((slot as u32 + 1) | (v.play_index << HANDLE_SLOT_BITS)),
            None => Handle::INVALID,
        }
    }

    pub fn voice_from_handle(&self, handle: Handle) -> Option<usize> {
        if !handle.is_valid() {
            return None;
        }
        let slot = (handle.0 & HANDLE_SLOT_MASK) as usize;
        if slot == 0 || slot > VOICE_COUNT {
            return None;
        }
        let slot = slot - 1;
        match &self.voices[slot] {
            Some(v) if v.play_index == handle.0 >> HANDLE_SLOT_BITS => Some(slot),
            _ => None,
        }
    }

    pub fn voice_mut(&mut self, handle: Handle) -> Option<&mut Voice> {
        let slot = self.voice_from_handle(handle)?;
        self.voices[slot].as_mut()
    }

    /// First empty slot, or the slot of the oldest unprotected voice
    /// (which is stopped to make room). None only when every slot is
    /// protected.
    fn find_free_voice(&mut self) -> Option<usize> {
        let mut oldest = u32::MAX;
        let mut oldest_slot = None;
        for i in 0..VOICE_COUNT {
            match &self.voices[i] {
                None => return Some(i),
                Some(v) => {
                    if !v.has_flag(flags::PROTECTED) && v.play_index < oldest {
                        oldest = v.play_index;
                        oldest_slot = Some(i);
                    }
                }
            }
        }
        if let Some(slot) = oldest_slot {
            self.stop_voice(slot);
        }
        oldest_slot
    }

    pub fn play(&mut self, source: &dyn AudioSource, options: &PlayOptions) -> Handle {
        let Some(slot) = self.find_free_voice() else {
            log::warn!("voice pool exhausted, all voices protected");
            return Handle::INVALID;
        };

        self.play_index = self.play_index.wrapping_add(1) & PLAY_INDEX_MASK;

        let mut voice = Voice::new(
            source.create_instance(),
            source.channels(),
            source.base_sample_rate(),
            self.play_index,
        );
        voice.bus_handle = options.bus;
        voice.set_volume = options.volume;
        voice.update_overall_volume();
        voice.set_pan(options.pan);
        for ch in 0..MAX_CHANNELS {
            voice.current_channel_volume[ch] = voice.channel_volume[ch] * voice.overall_volume;
        }
        voice.set_flag(flags::PAUSED, options.paused);
        voice.set_flag(flags::LOOPING, options.looping);
        voice.delay_samples = options.delay_samples;
        for (slot_filter, definition) in voice.filters.iter_mut().zip(source.filters()) {
            *slot_filter = definition.map(|d| d.create_instance());
        }

        self.voices[slot] = Some(voice);
        self.highest_voice = self.highest_voice.max(slot + 1);
        self.active_voice_dirty = true;
        self.handle_for_slot(slot)
    }

    /// Clear a voice slot, dropping its source and filter instances.
    pub fn stop_voice(&mut self, slot: usize) {
        if self.voices[slot].take().is_some() {
            self.active_voice_dirty = true;
        }
    }

    pub fn stop_all_voices(&mut self) {
        for i in 0..self.highest_voice {
            self.stop_voice(i);
        }
    }
}

/// Shared core: the audio mutex and the state behind it. The backend
/// callback owns an `Arc` of this and drives [`EngineCore::mix`].
pub(crate) struct EngineCore {
    state: Mutex<EngineState>,
}

impl EngineCore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::new()),
        }
    }

    /// Acquire the audio mutex. A poisoned lock is recovered; the state
    /// is plain data and every tick rebuilds its transient parts.
    pub fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn postinit(&self, sample_rate: u32, buffer_size: u32, flags: u32) {
        self.lock().postinit(sample_rate, buffer_size, flags);
    }
}

/// The audio engine.
///
/// Composites up to [`VOICE_COUNT`] voices into the output stream of the
/// backend opened at init. All methods are control-thread operations that
/// serialize against the mixer through the audio mutex; none of them
/// block beyond that.
pub struct Engine {
    core: Arc<EngineCore>,
    backend: Option<BackendHandle>,
    backend_id: BackendId,
}

impl Engine {
    /// Open a backend and return the running engine.
    ///
    /// With [`BackendId::Auto`] the preference list is walked and the
    /// first backend that opens wins; a specifically requested backend
    /// propagates its own failure instead.
    pub fn init(config: &EngineConfig) -> EngineResult<Engine> {
        let core = Arc::new(EngineCore::new());
        let (backend, backend_id) = backend::init_backend(Arc::clone(&core), config)?;
        log::info!("engine initialized with {} backend", backend_id.name());
        Ok(Engine {
            core,
            backend: Some(backend),
            backend_id,
        })
    }

    /// Stop the backend and all voices. Also runs on drop.
    pub fn deinit(&mut self) {
        // Closing the backend first guarantees no callback is in flight
        // when the voices are torn down.
        self.backend = None;
        self.core.lock().stop_all_voices();
    }

    /// Fill `buffer` with `frames` interleaved stereo frames.
    ///
    /// This is the pull callback the backend drives. With the null
    /// backend it is called manually for offline rendering and tests.
    pub fn mix(&self, buffer: &mut [Sample], frames: usize) {
        self.core.mix(buffer, frames);
    }

    // ───────────────────────── playback ─────────────────────────

    /// Play a source with default options.
    pub fn play(&self, source: &dyn AudioSource) -> Handle {
        self.play_with(source, PlayOptions::default())
    }

    /// Play a source with explicit options.
    pub fn play_with(&self, source: &dyn AudioSource, options: PlayOptions) -> Handle {
        self.core.lock().play(source, &options)
    }

    /// Play a source at a caller-supplied timestamp, delaying it so that
    /// back-to-back `play_clocked` calls line up sample-accurately even
    /// when several arrive within one tick window.
    pub fn play_clocked(
        &self,
        sound_time: f64,
        source: &dyn AudioSource,
        options: PlayOptions,
    ) -> Handle {
        let mut state = self.core.lock();
        let last = state.last_clocked_time;
        let delay = if last == 0.0 {
            state.last_clocked_time = sound_time;
            0
        } else {
            ((sound_time - last).max(0.0) * state.sample_rate as f64).floor() as u32
        };
        let options = options.delay_samples(delay);
        state.play(source, &options)
    }

    /// Stop one playback. Stale handles are ignored.
    pub fn stop(&self, handle: Handle) {
        let mut state = self.core.lock();
        if let Some(slot) = state.voice_from_handle(handle) {
            state.stop_voice(slot);
        }
    }

    /// Stop every playback, protected or not.
    pub fn stop_all(&self) {
        self.core.lock().stop_all_voices();
    }

    // ───────────────────────── parameters ─────────────────────────

    /// Set a voice's volume, cancelling any volume fade in flight.
    pub fn set_volume(&self, handle: Handle, volume: f32) {
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            voice.volume_fader.deactivate();
            voice.set_volume = volume;
            voice.update_overall_volume();
            state.active_voice_dirty = true;
        }
    }

    pub fn volume(&self, handle: Handle) -> Option<f32> {
        let mut state = self.core.lock();
        state.voice_mut(handle).map(|v| v.set_volume)
    }

    /// Set a voice's pan position (-1 left .. +1 right).
    pub fn set_pan(&self, handle: Handle, pan: f32) {
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            voice.set_pan(pan);
        }
    }

    pub fn pan(&self, handle: Handle) -> Option<f32> {
        let mut state = self.core.lock();
        state.voice_mut(handle).map(|v| v.pan)
    }

    /// Set the channel gains directly, bypassing the pan law.
    pub fn set_pan_absolute(&self, handle: Handle, left: f32, right: f32) {
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            voice.channel_volume[0] = left;
            voice.channel_volume[1] = right;
        }
    }

    /// Scale a voice's playback rate. Speeds at or below zero are
    /// rejected.
    pub fn set_relative_play_speed(&self, handle: Handle, speed: f32) -> EngineResult<()> {
        if speed <= 0.0 {
            return Err(EngineError::InvalidParameter);
        }
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            voice.relative_play_speed_fader.deactivate();
            voice.set_relative_play_speed(speed);
        }
        Ok(())
    }

    pub fn relative_play_speed(&self, handle: Handle) -> Option<f32> {
        let mut state = self.core.lock();
        state.voice_mut(handle).map(|v| v.relative_play_speed)
    }

    /// Override the source's native sample rate for one voice.
    pub fn set_sample_rate(&self, handle: Handle, rate: f32) {
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            voice.base_sample_rate = rate;
            voice.sample_rate = rate * voice.relative_play_speed;
        }
    }

    pub fn sample_rate(&self, handle: Handle) -> Option<f32> {
        let mut state = self.core.lock();
        state.voice_mut(handle).map(|v| v.base_sample_rate)
    }

    pub fn set_pause(&self, handle: Handle, pause: bool) {
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            voice.set_flag(flags::PAUSED, pause);
            state.active_voice_dirty = true;
        }
    }

    pub fn pause(&self, handle: Handle) -> Option<bool> {
        let mut state = self.core.lock();
        state.voice_mut(handle).map(|v| v.is_paused())
    }

    pub fn set_pause_all(&self, pause: bool) {
        let mut state = self.core.lock();
        for i in 0..state.highest_voice {
            if let Some(voice) = state.voices[i].as_mut() {
                voice.set_flag(flags::PAUSED, pause);
            }
        }
        state.active_voice_dirty = true;
    }

    pub fn set_looping(&self, handle: Handle, looping: bool) {
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            voice.set_flag(flags::LOOPING, looping);
        }
    }

    pub fn looping(&self, handle: Handle) -> Option<bool> {
        let mut state = self.core.lock();
        state.voice_mut(handle).map(|v| v.has_flag(flags::LOOPING))
    }

    /// Shield a voice from free-slot eviction.
    pub fn set_protect_voice(&self, handle: Handle, protect: bool) {
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            voice.set_flag(flags::PROTECTED, protect);
        }
    }

    pub fn protect_voice(&self, handle: Handle) -> Option<bool> {
        let mut state = self.core.lock();
        state.voice_mut(handle).map(|v| v.has_flag(flags::PROTECTED))
    }

    /// Choose what happens when the voice drops below the audibility
    /// threshold: keep ticking its source (`must_tick`), or stop it
    /// outright (`kill`).
    pub fn set_inaudible_behavior(&self, handle: Handle, must_tick: bool, kill: bool) {
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            voice.set_flag(flags::INAUDIBLE_TICK, must_tick);
            voice.set_flag(flags::INAUDIBLE_KILL, kill);
            state.active_voice_dirty = true;
        }
    }

    /// Postpone a voice's start by `samples` output samples.
    pub fn set_delay_samples(&self, handle: Handle, samples: u32) {
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            voice.delay_samples = samples;
        }
    }

    /// Set the pre-clip master volume, cancelling any global fade.
    pub fn set_global_volume(&self, volume: f32) {
        let mut state = self.core.lock();
        state.global_volume_fader.deactivate();
        state.global_volume = volume;
    }

    pub fn global_volume(&self) -> f32 {
        self.core.lock().global_volume
    }

    /// Set the post-clip headroom factor; output never exceeds it.
    pub fn set_post_clip_scaler(&self, scaler: f32) {
        self.core.lock().post_clip_scaler = scaler;
    }

    pub fn post_clip_scaler(&self) -> f32 {
        self.core.lock().post_clip_scaler
    }

    /// Cap the number of voices mixed per tick. The loudest voices win;
    /// the rest keep their state and wait.
    pub fn set_max_active_voices(&self, count: usize) -> EngineResult<()> {
        if count == 0 || count > VOICE_COUNT {
            return Err(EngineError::InvalidParameter);
        }
        let mut state = self.core.lock();
        state.max_active_voices = count;
        state.active_voice_dirty = true;
        Ok(())
    }

    pub fn max_active_voices(&self) -> usize {
        self.core.lock().max_active_voices
    }

    /// Toggle the visualization tap at runtime.
    pub fn set_visualization(&self, enable: bool) {
        let mut state = self.core.lock();
        if enable {
            state.flags |= engine_flags::ENABLE_VISUALIZATION;
        } else {
            state.flags &= !engine_flags::ENABLE_VISUALIZATION;
        }
    }

    // ───────────────────────── fades and schedulers ─────────────────────────

    /// Fade a voice's volume to `to` over `time` seconds. A non-positive
    /// time applies the target immediately.
    pub fn fade_volume(&self, handle: Handle, to: f32, time: f64) {
        if time <= 0.0 {
            self.set_volume(handle, to);
            return;
        }
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            let from = voice.set_volume;
            let start = voice.stream_time;
            voice.volume_fader.fade(from, to, start, time);
        }
    }

    pub fn fade_pan(&self, handle: Handle, to: f32, time: f64) {
        if time <= 0.0 {
            self.set_pan(handle, to);
            return;
        }
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            let from = voice.pan;
            let start = voice.stream_time;
            voice.pan_fader.fade(from, to, start, time);
        }
    }

    pub fn fade_relative_play_speed(&self, handle: Handle, to: f32, time: f64) -> EngineResult<()> {
        if to <= 0.0 {
            return Err(EngineError::InvalidParameter);
        }
        if time <= 0.0 {
            return self.set_relative_play_speed(handle, to);
        }
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            let from = voice.relative_play_speed;
            let start = voice.stream_time;
            voice.relative_play_speed_fader.fade(from, to, start, time);
        }
        Ok(())
    }

    /// Fade the global volume against the engine's stream clock.
    pub fn fade_global_volume(&self, to: f32, time: f64) {
        if time <= 0.0 {
            self.set_global_volume(to);
            return;
        }
        let mut state = self.core.lock();
        let from = state.global_volume;
        let start = state.stream_time;
        state.global_volume_fader.fade(from, to, start, time);
    }

    /// Pause a voice `time` seconds from now (voice clock).
    pub fn schedule_pause(&self, handle: Handle, time: f64) {
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            let start = voice.stream_time;
            voice.pause_scheduler.schedule(start, time);
        }
    }

    /// Stop a voice `time` seconds from now (voice clock).
    pub fn schedule_stop(&self, handle: Handle, time: f64) {
        let mut state = self.core.lock();
        if let Some(voice) = state.voice_mut(handle) {
            let start = voice.stream_time;
            voice.stop_scheduler.schedule(start, time);
        }
    }

    // ───────────────────────── filters ─────────────────────────

    /// Install or clear an output filter slot. The previous instance in
    /// the slot is dropped.
    pub fn set_global_filter(&self, slot: usize, filter: Option<&dyn Filter>) -> EngineResult<()> {
        if slot >= FILTERS_PER_STREAM {
            return Err(EngineError::InvalidParameter);
        }
        let mut state = self.core.lock();
        state.output_filters[slot] = filter.map(|f| f.create_instance());
        Ok(())
    }

    // ───────────────────────── queries ─────────────────────────

    pub fn is_valid_handle(&self, handle: Handle) -> bool {
        self.core.lock().voice_from_handle(handle).is_some()
    }

    /// Seconds of audio the engine has produced.
    pub fn stream_time(&self) -> f64 {
        self.core.lock().stream_time
    }

    /// Seconds a voice has been live.
    pub fn voice_stream_time(&self, handle: Handle) -> Option<f64> {
        let mut state = self.core.lock();
        state.voice_mut(handle).map(|v| v.stream_time)
    }

    /// Number of voices that will actually be mixed next tick.
    pub fn active_voice_count(&self) -> usize {
        let mut state = self.core.lock();
        if state.active_voice_dirty {
            state.calc_active_voices();
        }
        state.active_voice_count
    }

    /// Number of live voices, audible or not.
    pub fn voice_count(&self) -> usize {
        let state = self.core.lock();
        state.voices[..state.highest_voice]
            .iter()
            .filter(|v| v.is_some())
            .count()
    }

    pub fn backend_id(&self) -> BackendId {
        self.backend_id
    }

    pub fn backend_sample_rate(&self) -> u32 {
        self.core.lock().sample_rate
    }

    pub fn backend_buffer_size(&self) -> u32 {
        self.core.lock().buffer_size
    }

    pub fn backend_channels(&self) -> u32 {
        self.backend.as_ref().map_or(2, |b| b.channels())
    }

    // ───────────────────────── visualization ─────────────────────────

    /// Copy of the latest visualization window (sum of both channels per
    /// frame). All zeros unless visualization is enabled.
    pub fn wave(&self) -> [Sample; 256] {
        self.core.lock().visualization_wave_data
    }

    /// Magnitude spectrum of the visualization window: a zero-padded
    /// 1024-point real FFT, first 256 bins.
    pub fn calc_fft(&self) -> [Sample; 256] {
        let wave = self.core.lock().visualization_wave_data;

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(1024);
        let mut input = fft.make_input_vec();
        input[..256].copy_from_slice(&wave);
        let mut spectrum = fft.make_output_vec();

        let mut out = [0.0; 256];
        if fft.process(&mut input, &mut spectrum).is_ok() {
            for (bin, c) in out.iter_mut().zip(&spectrum[..256]) {
                *bin = (c.re * c.re + c.im * c.im).sqrt();
            }
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.deinit();
    }
}
