use crate::engine::assets::gallery_items::Item;
use crate::error::GalleryError;
use bevy::prelude::*;

/// Replaces the whole item array. The last one written in a frame wins.
#[derive(Event, Debug, Clone)]
pub struct SetGalleryItems(pub Vec<Item>);

/// Rotation came to rest with `item` facing the camera.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct ActiveItemSettled {
    pub index: usize,
    pub item: Item,
}

/// Sent whenever the sphere starts or stops moving.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionChanged {
    pub is_moving: bool,
}

#[derive(Event, Debug, Clone, PartialEq, Eq)]
pub struct GalleryErrorRaised(pub GalleryError);
