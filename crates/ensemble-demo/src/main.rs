//! Ensemble demo - plays generated tones through the default device
//!
//! Opens the default backend, starts a few sine voices with pans and
//! fades, schedules their stops, and prints a coarse level meter from
//! the visualization tap while they play.

use std::f32::consts::TAU;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use ensemble_core::{
    engine_flags, AudioSource, Engine, EngineConfig, PlayOptions, SourceInstance,
};

/// Endless sine tone.
struct Sine {
    frequency: f32,
    sample_rate: f32,
    amplitude: f32,
}

impl Sine {
    fn new(frequency: f32) -> Self {
        Self {
            frequency,
            sample_rate: 44100.0,
            amplitude: 0.6,
        }
    }
}

impl AudioSource for Sine {
    fn create_instance(&self) -> Box<dyn SourceInstance> {
        Box::new(SineInstance {
            phase: 0.0,
            step: TAU * self.frequency / self.sample_rate,
            amplitude: self.amplitude,
        })
    }

    fn base_sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

struct SineInstance {
    phase: f32,
    step: f32,
    amplitude: f32,
}

impl SourceInstance for SineInstance {
    fn get_audio(&mut self, buffer: &mut [f32], samples: usize) {
        for s in buffer[..samples].iter_mut() {
            *s = self.phase.sin() * self.amplitude;
            self.phase += self.step;
            if self.phase > TAU {
                self.phase -= TAU;
            }
        }
    }

    fn has_ended(&self) -> bool {
        false
    }
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let engine = Engine::init(
        &EngineConfig::default()
            .with_flags(engine_flags::CLIP_ROUNDOFF | engine_flags::ENABLE_VISUALIZATION),
    )
    .map_err(|e| anyhow!("engine init failed: {}", e))?;

    log::info!(
        "engine running: {} backend, {} Hz, {} frames",
        engine.backend_id().name(),
        engine.backend_sample_rate(),
        engine.backend_buffer_size()
    );

    let low = Sine::new(220.0);
    let high = Sine::new(330.0);

    let drone = engine.play_with(&low, PlayOptions::default().volume(0.8).pan(-0.4));
    let melody = engine.play_with(&high, PlayOptions::default().volume(0.5).pan(0.4));
    if !drone.is_valid() || !melody.is_valid() {
        return Err(anyhow!("no free voice"));
    }

    // Sweep the high tone across the stereo field, then wind both down.
    engine.fade_pan(melody, -0.8, 2.0);
    engine.fade_volume(drone, 0.2, 3.0);
    engine.schedule_stop(melody, 3.0);
    engine.schedule_stop(drone, 4.0);

    for _ in 0..8 {
        thread::sleep(Duration::from_millis(500));
        let wave = engine.wave();
        let peak = wave.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        let bars = (peak * 30.0) as usize;
        log::info!(
            "voices {} level |{:<30}|",
            engine.active_voice_count(),
            "#".repeat(bars.min(30))
        );
    }

    engine.stop_all();
    log::info!("done");
    Ok(())
}
