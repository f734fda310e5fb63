use crate::engine::assets::gallery_items::GalleryItems;
use crate::engine::layout::sphere_layout::SphereState;
use bevy::prelude::*;
use bevy::render::extract_component::ExtractComponent;
use bytemuck::{Pod, Zeroable};
use constants::layout::{HORIZON_FADE_INTENSITY, ITEM_DIAMETER, TILE_SCALE};
use constants::orbit::{MAX_STRETCH, STRETCH_PER_VELOCITY};
use tile_atlas::compose::placeholder_color;

/// Per-instance vertex data for one tile.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TileInstance {
    /// World position (xyz) and uniform scale (w).
    pub position_scale: [f32; 4],
    /// Tile orientation quaternion.
    pub rotation: [f32; 4],
    /// Atlas UV rect: u_min, v_min, u_max, v_max.
    pub uv_rect: [f32; 4],
    /// Sheet slot, has atlas cell (0/1), high-res overlay (0/1), fade-in (0..1).
    pub params: [f32; 4],
    /// Placeholder colour, linear RGBA.
    pub color: [f32; 4],
    /// World rotation axis (xyz) and stretch amount (w).
    pub stretch: [f32; 4],
}

/// Tile instances for the sphere entity, extracted to the render world each frame.
#[derive(Component, Deref, DerefMut, Clone, Default, ExtractComponent)]
pub struct SphereTiles(pub Vec<TileInstance>);

/// Resolved atlas texture for one item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileTexture {
    pub sheet: u32,
    pub uv_rect: [f32; 4],
    /// 0 right after the item's first cell appears, 1 once fully faded in.
    pub fade: f32,
}

/// Anything that can resolve an item id to an atlas cell.
pub trait TileTextures {
    fn texture_for(&self, id: u64) -> Option<TileTexture>;
}

impl TileTextures for () {
    fn texture_for(&self, _id: u64) -> Option<TileTexture> {
        None
    }
}

/// Inputs for one binding pass.
pub struct BindFrame<'a, T: TileTextures> {
    pub sphere: &'a SphereState,
    pub orientation: Quat,
    pub items: &'a GalleryItems,
    pub textures: &'a T,
    /// Item currently showing its full resolution overlay.
    pub high_res_id: Option<u64>,
    pub motion_axis: Vec3,
    pub velocity: f32,
}

/// Writes one instance per layout slot. Slot `i` shows item `i % len`.
/// Textures resolve by item id, so a sheet built for an older array can
/// never put the wrong image on a tile.
pub fn bind_instances<T: TileTextures>(frame: &BindFrame<T>, out: &mut Vec<TileInstance>) {
    out.clear();
    if frame.items.is_empty() {
        return;
    }

    let radius = frame.sphere.radius;
    let stretch = (frame.velocity * STRETCH_PER_VELOCITY).clamp(0.0, MAX_STRETCH);
    let axis = frame.motion_axis.normalize_or_zero();

    for point in &frame.sphere.points {
        let Some((_, item)) = frame.items.item_for_slot(point.index) else {
            continue;
        };
        let direction = frame.orientation * point.direction;
        let position = direction * radius;
        let scale = TILE_SCALE * ITEM_DIAMETER * horizon_scale(position.z, radius);
        let rotation = outward_rotation(direction);

        let texture = frame.textures.texture_for(item.id);
        let high_res = frame.high_res_id == Some(item.id);
        let params = match texture {
            Some(texture) => [texture.sheet as f32, 1.0, high_res as u8 as f32, texture.fade],
            None => [0.0, 0.0, high_res as u8 as f32, 0.0],
        };

        out.push(TileInstance {
            position_scale: [position.x, position.y, position.z, scale],
            rotation: rotation.to_array(),
            uv_rect: texture.map_or([0.0, 0.0, 1.0, 1.0], |t| t.uv_rect),
            params,
            color: placeholder_color(item.id),
            stretch: [axis.x, axis.y, axis.z, stretch],
        });
    }
}

/// Tiles shrink toward the silhouette of the sphere.
pub fn horizon_scale(depth: f32, radius: f32) -> f32 {
    if radius <= 0.0 {
        return 1.0;
    }
    1.0 - (1.0 - (depth.abs() / radius).min(1.0)) * HORIZON_FADE_INTENSITY
}

/// Tile +Z along the outward normal, tile +Y as close to world up as the
/// normal allows. Near the poles world -Z stands in for up.
pub fn outward_rotation(normal: Vec3) -> Quat {
    let up_hint = if normal.y.abs() > 0.999 { Vec3::NEG_Z * normal.y.signum() } else { Vec3::Y };
    let right = up_hint.cross(normal).normalize();
    let up = normal.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, normal)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assets::gallery_items::fixtures::items;
    use crate::engine::layout::sphere_layout::layout;
    use std::collections::HashMap;

    struct Cells(HashMap<u64, TileTexture>);

    impl TileTextures for Cells {
        fn texture_for(&self, id: u64) -> Option<TileTexture> {
            self.0.get(&id).copied()
        }
    }

    fn gallery(count: u64) -> GalleryItems {
        let mut gallery = GalleryItems::default();
        gallery.replace(items(count));
        gallery
    }

    fn frame<'a, T: TileTextures>(sphere: &'a SphereState, gallery: &'a GalleryItems, textures: &'a T) -> BindFrame<'a, T> {
        BindFrame {
            sphere,
            orientation: Quat::IDENTITY,
            items: gallery,
            textures,
            high_res_id: None,
            motion_axis: Vec3::Y,
            velocity: 0.0,
        }
    }

    #[test]
    fn empty_array_binds_nothing() {
        let sphere = layout(0);
        let gallery = GalleryItems::default();
        let mut out = vec![TileInstance::zeroed()];
        bind_instances(&frame(&sphere, &gallery, &()), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn one_instance_per_slot_on_the_sphere_surface() {
        let sphere = layout(37);
        let gallery = gallery(37);
        let mut out = Vec::new();
        bind_instances(&frame(&sphere, &gallery, &()), &mut out);

        assert_eq!(out.len(), 37);
        for instance in &out {
            let p = Vec3::from_slice(&instance.position_scale[..3]);
            assert!((p.length() - sphere.radius).abs() < 1e-4);
            assert_eq!(instance.params[1], 0.0);
        }
    }

    #[test]
    fn front_tile_keeps_full_scale_and_faces_the_camera() {
        let sphere = layout(1);
        let gallery = gallery(1);
        let mut out = Vec::new();
        bind_instances(&frame(&sphere, &gallery, &()), &mut out);

        assert!((out[0].position_scale[3] - TILE_SCALE * ITEM_DIAMETER).abs() < 1e-6);
        let facing = Quat::from_array(out[0].rotation) * Vec3::Z;
        assert!(facing.abs_diff_eq(Vec3::Z, 1e-5));
    }

    #[test]
    fn textures_resolve_by_item_id() {
        let sphere = layout(3);
        let gallery = gallery(3);
        let texture = TileTexture {
            sheet: 1,
            uv_rect: [0.5, 0.0, 0.5625, 0.0625],
            fade: 1.0,
        };
        let cells = Cells(HashMap::from([(2, texture)]));
        let mut out = Vec::new();
        let mut bind = frame(&sphere, &gallery, &cells);
        bind.high_res_id = Some(2);
        bind_instances(&bind, &mut out);

        assert_eq!(out[2].uv_rect, texture.uv_rect);
        assert_eq!(out[2].params, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(out[0].params[1], 0.0);
        assert_eq!(out[0].color, placeholder_color(0));
    }

    #[test]
    fn outward_rotation_is_orthonormal_everywhere() {
        for n in layout(200).points.iter().map(|p| p.direction).chain([Vec3::Y, Vec3::NEG_Y]) {
            let q = outward_rotation(n);
            assert!((q * Vec3::Z).abs_diff_eq(n, 1e-4));
            assert!((q * Vec3::X).dot(n).abs() < 1e-4);
        }
    }

    #[test]
    fn tiles_shrink_toward_the_horizon() {
        assert_eq!(horizon_scale(2.0, 2.0), 1.0);
        assert!((horizon_scale(0.0, 2.0) - (1.0 - HORIZON_FADE_INTENSITY)).abs() < 1e-6);
        assert!(horizon_scale(1.0, 2.0) > horizon_scale(0.5, 2.0));
    }

    #[test]
    fn stretch_follows_velocity_up_to_a_cap() {
        let sphere = layout(2);
        let gallery = gallery(2);
        let mut out = Vec::new();
        let mut bind = frame(&sphere, &gallery, &());
        bind.velocity = 1_000.0;
        bind_instances(&bind, &mut out);
        assert_eq!(out[0].stretch[3], MAX_STRETCH);
    }
}
