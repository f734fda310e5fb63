//! Texture ownership for the tiles.
//!
//! Thumbnails are fetched without blocking any task pool, packed into a few
//! atlas sheets on the compute pool and swapped in whole. The item facing the
//! camera additionally gets a full-resolution overlay from a small id-keyed
//! cache.

/// Bound atlas, generation bookkeeping and platform texture limits.
pub mod atlas_manager;

/// Thumbnail gathering, atlas composition and precomputed atlas loading.
pub mod atlas_tasks;

/// Non-blocking image fetches through the asset server or HTTP.
pub mod image_fetch;

/// Full-resolution texture cache for the active item and its neighbours.
pub mod high_res;
