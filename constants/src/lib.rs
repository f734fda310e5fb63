//! Calibration anchor and tuning values shared by the gallery engine,
//! the atlas packer and the offline pre-processor.

/// Sphere sizing and point distribution thresholds.
pub mod layout;

/// Camera framing values derived from the reference configuration.
pub mod camera;

/// Trackball, momentum and snap tuning.
pub mod orbit;

/// Atlas sheet geometry and thumbnail fetching policy.
pub mod texture;
