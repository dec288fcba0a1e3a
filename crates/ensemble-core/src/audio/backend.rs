//! Backend selection and lifecycle
//!
//! [`init_backend`] walks the preference list: a specifically requested
//! backend propagates its own failure, `Auto` takes the first backend
//! that opens. Each backend negotiates the device parameters, completes
//! the engine's post-init before any callback can fire, and returns a
//! handle whose drop closes the stream.

use std::sync::Arc;

use crate::engine::{EngineConfig, EngineCore};
use crate::error::{EngineError, EngineResult};

/// Default buffer size for the cpal backend, in frames.
#[cfg(feature = "cpal-backend")]
pub(crate) const CPAL_DEFAULT_BUFFER_SIZE: u32 = 2048;

/// Default buffer size for the null backend, in frames.
pub(crate) const NULL_DEFAULT_BUFFER_SIZE: u32 = 2048;

/// Backend identifier for [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendId {
    /// Walk the preference list and take the first backend that opens.
    /// The null backend is never picked automatically.
    Auto,
    /// The platform's default output device through cpal.
    Cpal,
    /// No device; the caller drives `Engine::mix` manually.
    Null,
}

impl BackendId {
    pub fn name(&self) -> &'static str {
        match self {
            BackendId::Auto => "auto",
            BackendId::Cpal => "cpal",
            BackendId::Null => "null",
        }
    }
}

/// Keeps the chosen backend's stream alive; drop to stop it.
pub(crate) enum BackendHandle {
    #[cfg(feature = "cpal-backend")]
    Cpal(super::cpal_backend::CpalBackend),
    Null(super::null_backend::NullBackend),
}

impl BackendHandle {
    /// Output channel count of the device.
    pub fn channels(&self) -> u32 {
        match self {
            #[cfg(feature = "cpal-backend")]
            BackendHandle::Cpal(b) => b.channels(),
            BackendHandle::Null(b) => b.channels(),
        }
    }
}

/// Open the backend requested by `config` and hand it the engine core.
pub(crate) fn init_backend(
    core: Arc<EngineCore>,
    config: &EngineConfig,
) -> EngineResult<(BackendHandle, BackendId)> {
    if config.sample_rate == Some(0) || config.buffer_size == Some(0) {
        return Err(EngineError::InvalidParameter);
    }
    let sample_rate = config
        .sample_rate
        .unwrap_or(crate::engine::DEFAULT_SAMPLE_RATE);

    match config.backend {
        BackendId::Null => {
            let buffer_size = config.buffer_size.unwrap_or(NULL_DEFAULT_BUFFER_SIZE);
            let backend =
                super::null_backend::init(&core, config.flags, sample_rate, buffer_size);
            Ok((BackendHandle::Null(backend), BackendId::Null))
        }
        BackendId::Cpal | BackendId::Auto => {
            #[cfg(feature = "cpal-backend")]
            {
                let buffer_size = config.buffer_size.unwrap_or(CPAL_DEFAULT_BUFFER_SIZE);
                match super::cpal_backend::init(core, config.flags, sample_rate, buffer_size) {
                    Ok(backend) => Ok((BackendHandle::Cpal(backend), BackendId::Cpal)),
                    Err(e) if config.backend == BackendId::Auto => {
                        // Auto mode: every compiled backend failed
                        log::warn!("cpal backend failed to open: {}", e);
                        Err(EngineError::Unknown)
                    }
                    Err(e) => Err(e),
                }
            }
            #[cfg(not(feature = "cpal-backend"))]
            {
                let _ = core;
                Err(EngineError::NotImplemented)
            }
        }
    }
}
