//! Per-frame gallery systems.
//!
//! Pointer input feeds the orbit controller; the interaction loop then runs
//! item updates, relayout, orbit, camera, instance binding and event output
//! in that order every frame.

/// The ordered gallery tick and its system sets.
pub mod interaction_loop;

/// Mouse, touch and window input for the orbit controller.
pub mod pointer_input;
