//! Thumbnail atlas packing shared by the gallery engine and the offline
//! pre-processor.
//!
//! An atlas is a bounded set of square sheets, each a grid of equally sized
//! cells. Every build is tagged with the generation of the item array it was
//! requested for; the positional view of its lookup refuses reads from any
//! other generation, while the id-keyed view stays valid for any array.

/// Sheet and cell geometry, UV regions.
pub mod grid;

/// Cover-fit compositing and placeholder colours.
pub mod compose;

/// Generation-tagged item to cell lookup.
pub mod lookup;

/// Precomputed atlas manifest keyed by item id.
pub mod manifest;

/// Thumbnail byte sources with bounded retry.
pub mod source;

/// Atlas planning, cell fitting and sheet composition.
pub mod builder;

mod error;

pub use builder::{
    AtlasBuild, AtlasJob, AtlasPlan, Fit, RgbaPixels, SheetImage, ThumbnailRequest, build_atlas, compose_atlas,
    decode_rgba, plan_atlas,
};
pub use error::{AtlasError, FetchError, LookupError};
pub use grid::{AtlasGrid, AtlasRegion, Cell};
pub use lookup::AtlasLookup;
pub use manifest::AtlasManifest;
pub use source::{RetryPolicy, ThumbnailSource};
