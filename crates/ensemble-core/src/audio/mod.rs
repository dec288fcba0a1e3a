//! Device backends
//!
//! The engine is driven by a pull callback; a backend owns the device
//! stream that issues it. Two backends exist:
//! - cpal (feature `cpal-backend`, default): the platform's default
//!   output device
//! - null: no device; the caller drives [`crate::Engine::mix`] manually

pub mod backend;

#[cfg(feature = "cpal-backend")]
mod cpal_backend;
mod null_backend;
