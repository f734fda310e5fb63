//! Sphere sizing and point distribution for a given item count.

/// Deterministic layouts: icosahedron, half-offset spiral and Fibonacci lattice.
pub mod sphere_layout;
