//! Null backend: no device, no thread
//!
//! Completes the engine's post-init with the requested parameters and
//! nothing else. Used for offline rendering and tests, where the caller
//! pulls audio through `Engine::mix` at its own pace. Never selected by
//! `Auto`; it has to be asked for.

use crate::engine::EngineCore;

pub(crate) struct NullBackend;

impl NullBackend {
    pub fn channels(&self) -> u32 {
        2
    }
}

pub(crate) fn init(
    core: &EngineCore,
    flags: u32,
    sample_rate: u32,
    buffer_size: u32,
) -> NullBackend {
    core.postinit(sample_rate, buffer_size, flags);
    log::debug!(
        "null backend ready: {} Hz, {} frames",
        sample_rate,
        buffer_size
    );
    NullBackend
}
