//! Spherical tile gallery for Bevy.
//!
//! Add [`SphereGalleryPlugin`] to an app with the default plugins, publish items
//! through [`SetGalleryItems`] (or the `set_items` RPC method) and listen for
//! [`ActiveItemSettled`] and [`MotionChanged`].

pub mod engine;
pub mod error;
pub mod rpc;

pub use engine::assets::gallery_items::Item;
pub use engine::core::app_setup::{SphereGalleryPlugin, create_app};
pub use engine::core::app_state::GalleryState;
pub use engine::core::settings::GallerySettings;
pub use engine::events::{ActiveItemSettled, GalleryErrorRaised, MotionChanged, SetGalleryItems};
pub use error::GalleryError;
