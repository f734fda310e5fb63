//! Trackball rotation, momentum and snap-to-item.

/// Screen to sphere projection for pointer drags.
pub mod arcball;

/// Drag, momentum and snap state machine producing the sphere orientation.
pub mod orbit_controller;
