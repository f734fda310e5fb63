use crate::engine::assets::gallery_items::GalleryItems;
use crate::engine::atlas::atlas_manager::AtlasManager;
use crate::engine::atlas::high_res::HighResCache;
use crate::engine::camera::camera_rig::{CameraRig, camera_target};
use crate::engine::events::{ActiveItemSettled, MotionChanged, SetGalleryItems};
use crate::engine::instances::instance_binder::{BindFrame, SphereTiles, bind_instances};
use crate::engine::layout::sphere_layout::{SphereState, layout};
use crate::engine::orbit::orbit_controller::{OrbitController, OrbitTick};
use crate::engine::render::tile_render_plugin::TileTextureSet;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

/// Ordered stages of one gallery tick.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionSet {
    /// Item updates, relayout and pointer input.
    Input,
    /// Orbit, camera, instance binding and outgoing events.
    Tick,
    /// Atlas and high-res triggers and swaps.
    Textures,
}

/// Result of this frame's orbit step, read by the event stage.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct OrbitFrame {
    pub tick: OrbitTick,
}

/// Marks the camera the rig drives.
#[derive(Component)]
pub struct GalleryCamera;

/// Marks the entity carrying the tile instances.
#[derive(Component)]
pub struct SphereTilesEntity;

/// Applies the newest item array written this frame. Earlier ones are skipped.
pub fn apply_item_updates(mut updates: EventReader<SetGalleryItems>, mut items: ResMut<GalleryItems>) {
    let Some(SetGalleryItems(next)) = updates.read().last() else {
        return;
    };
    let generation = items.replace(next.clone());
    info!("item array generation {generation}: {} items", next.len());
}

/// Rebuilds the layout whenever the array length changes. Runs before any
/// transform is written in the same tick.
pub fn relayout_sphere(
    items: Res<GalleryItems>,
    mut sphere: ResMut<SphereState>,
    mut orbit: ResMut<OrbitController>,
    mut laid_out: Local<u64>,
) {
    if *laid_out == items.generation() {
        return;
    }
    *laid_out = items.generation();

    if sphere.item_count != items.len() {
        *sphere = layout(items.len());
        debug!(
            "relayout: {} items, radius {:.2}, {:?}",
            sphere.item_count, sphere.radius, sphere.distribution
        );
    }
    // Same slots may now show different items, so settle again.
    orbit.layout_changed();
}

pub fn tick_orbit(
    time: Res<Time>,
    sphere: Res<SphereState>,
    mut orbit: ResMut<OrbitController>,
    mut frame: ResMut<OrbitFrame>,
) {
    frame.tick = orbit.tick(time.delta_secs(), &sphere);
}

pub fn update_camera(
    time: Res<Time>,
    sphere: Res<SphereState>,
    orbit: Res<OrbitController>,
    mut rig: ResMut<CameraRig>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut cameras: Query<(&mut Transform, &mut Projection), With<GalleryCamera>>,
) {
    let aspect = windows
        .single()
        .map(|window| window.width() / window.height())
        .unwrap_or(1.0);
    let target = camera_target(sphere.radius, orbit.velocity(), orbit.is_moving(), aspect);
    let current = rig.update(target, time.delta_secs());

    for (mut transform, mut projection) in &mut cameras {
        *transform = Transform::from_xyz(0.0, 0.0, current.distance).looking_at(Vec3::ZERO, Vec3::Y);
        if let Projection::Perspective(perspective) = projection.as_mut() {
            perspective.fov = current.fov;
        }
    }
}

pub fn bind_tile_instances(
    sphere: Res<SphereState>,
    orbit: Res<OrbitController>,
    items: Res<GalleryItems>,
    atlas: Res<AtlasManager>,
    high_res: Res<HighResCache>,
    mut texture_set: ResMut<TileTextureSet>,
    mut tiles: Query<&mut SphereTiles, With<SphereTilesEntity>>,
) {
    let overlay = high_res.overlay();
    let frame = BindFrame {
        sphere: &sphere,
        orientation: orbit.orientation(),
        items: &items,
        textures: &*atlas,
        high_res_id: overlay.map(|(id, _)| id),
        motion_axis: orbit.motion_axis(),
        velocity: orbit.velocity(),
    };
    for mut instances in &mut tiles {
        bind_instances(&frame, &mut instances.0);
    }

    let sheets = atlas.sheet_handles();
    let overlay = overlay.map(|(_, handle)| handle.clone());
    if texture_set.sheets != sheets || texture_set.overlay != overlay {
        texture_set.sheets = sheets.to_vec();
        texture_set.overlay = overlay;
    }
}

/// Reports settles once per convergence and motion on every change.
pub fn emit_orbit_events(
    frame: Res<OrbitFrame>,
    orbit: Res<OrbitController>,
    items: Res<GalleryItems>,
    mut settled: EventWriter<ActiveItemSettled>,
    mut motion: EventWriter<MotionChanged>,
    mut was_moving: Local<bool>,
) {
    if let Some((index, item)) = frame.tick.settled_slot.and_then(|slot| items.item_for_slot(slot)) {
        info!("settled on item {} at index {index}", item.id);
        settled.write(ActiveItemSettled {
            index,
            item: item.clone(),
        });
    }

    let is_moving = orbit.is_moving();
    if is_moving != *was_moving {
        *was_moving = is_moving;
        motion.write(MotionChanged { is_moving });
    }
}
