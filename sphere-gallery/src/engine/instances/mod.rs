//! Per-frame tile instance data.

/// Maps layout slots to items and writes one GPU instance per slot.
pub mod instance_binder;
