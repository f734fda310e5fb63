//! Instanced rendering of the sphere tiles.

/// Custom instanced pipeline drawing every tile with one draw call.
///
/// Extracts the instance list and texture handles into the render world,
/// binds the atlas sheets and overlay, and queues into the transparent phase.
pub mod tile_render_plugin;
