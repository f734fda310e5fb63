//! Item data consumed by the gallery.
//!
//! The engine only reads the ordered item array; search, filtering and
//! pagination belong to the host that publishes it.

/// Item records, the JSON collection asset and the generation-tagged array.
pub mod gallery_items;
