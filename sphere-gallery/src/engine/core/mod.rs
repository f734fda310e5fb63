//! Application setup, runtime settings and the gallery state machine.
//!
//! Handles plugin registration, window configuration and the start-up
//! render capability check for both native and WASM targets.

/// Gallery plugin, system ordering and the default plugin set.
///
/// Registers assets, resources and events, spawns the camera and the
/// instanced tile entity, and schedules the per-frame gallery tick.
pub mod app_setup;

/// Loading, running and failed states plus the render device check.
pub mod app_state;

/// Runtime settings with defaults taken from the shared constants.
pub mod settings;

/// Platform-specific window configuration for native and WASM builds.
///
/// Configures canvas integration for web targets and vsync settings.
pub mod window_config;
