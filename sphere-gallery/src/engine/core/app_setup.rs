use bevy::asset::AssetMetaCheck;
use bevy::prelude::*;
use bevy::render::view::NoFrustumCulling;
use bevy_common_assets::json::JsonAssetPlugin;

use crate::engine::assets::gallery_items::{GalleryItems, ItemCollection};
use crate::engine::atlas::atlas_manager::{AtlasManager, PlatformLimits};
use crate::engine::atlas::atlas_tasks::{
    AtlasBuildTasks, PrecomputedAtlas, PrecomputedAtlasLoader, bind_precomputed_atlas, poll_atlas_builds,
    poll_atlas_gathering, request_atlas_build, start_precomputed_atlas,
};
use crate::engine::atlas::high_res::{HighResCache, poll_high_res, prune_high_res, request_high_res};
use crate::engine::atlas::image_fetch::ImageFetcher;
use crate::engine::camera::camera_rig::{CameraRig, vertical_fov};
use crate::engine::core::app_state::{GalleryState, check_render_capability, show_fallback_message};
use crate::engine::core::settings::GallerySettings;
use crate::engine::core::window_config::create_window_config;
use crate::engine::events::{ActiveItemSettled, GalleryErrorRaised, MotionChanged, SetGalleryItems};
use crate::engine::instances::instance_binder::SphereTiles;
use crate::engine::layout::sphere_layout::SphereState;
use crate::engine::loading::items_loader::{ItemsLoader, load_items_system, start_loading};
use crate::engine::loading::progress::LoadingProgress;
use crate::engine::orbit::orbit_controller::OrbitController;
use crate::engine::render::tile_render_plugin::TileRenderPlugin;
use crate::engine::systems::interaction_loop::{
    GalleryCamera, InteractionSet, OrbitFrame, SphereTilesEntity, apply_item_updates,
    bind_tile_instances, emit_orbit_events, relayout_sphere, tick_orbit, update_camera,
};
use crate::engine::systems::pointer_input::{ActivePointer, pointer_input};
use crate::rpc::web_rpc::WebRpcPlugin;

const BACKGROUND: Color = Color::srgb(0.06, 0.06, 0.08);

/// The whole gallery: layout, orbit, camera, atlas, rendering and the host bridge.
#[derive(Default)]
pub struct SphereGalleryPlugin {
    pub settings: GallerySettings,
}

impl Plugin for SphereGalleryPlugin {
    fn build(&self, app: &mut App) {
        let settings = self.settings.clone();

        app.init_state::<GalleryState>()
            .add_plugins(TileRenderPlugin)
            .add_plugins(WebRpcPlugin)
            .insert_resource(ClearColor(BACKGROUND));
        init_gallery_world(app, settings);
        add_gallery_schedule(app);

        app.add_systems(Startup, (setup, start_loading, start_precomputed_atlas))
            .add_systems(
                Update,
                check_render_capability.run_if(in_state(GalleryState::Loading)),
            )
            .add_systems(OnEnter(GalleryState::Failed), show_fallback_message);
    }
}

/// Asset loaders, resources and events the gallery systems read and write.
pub(crate) fn init_gallery_world(app: &mut App, settings: GallerySettings) {
    // Both assets use the "json" extension; the handle type picks the loader.
    app.add_plugins(JsonAssetPlugin::<ItemCollection>::new(&["json"]))
        .add_plugins(JsonAssetPlugin::<PrecomputedAtlas>::new(&["json"]));

    app.insert_resource(ImageFetcher::from_settings(&settings))
        .insert_resource(AtlasManager::new(settings.max_sheets, PlatformLimits::default()))
        .insert_resource(HighResCache::new(settings.high_res_cache_capacity))
        .insert_resource(settings)
        .init_resource::<GalleryItems>()
        .init_resource::<SphereState>()
        .init_resource::<OrbitController>()
        .init_resource::<OrbitFrame>()
        .init_resource::<CameraRig>()
        .init_resource::<ActivePointer>()
        .init_resource::<AtlasBuildTasks>()
        .init_resource::<PrecomputedAtlasLoader>()
        .init_resource::<LoadingProgress>()
        .init_resource::<ItemsLoader>()
        .add_event::<SetGalleryItems>()
        .add_event::<ActiveItemSettled>()
        .add_event::<MotionChanged>()
        .add_event::<GalleryErrorRaised>();
}

/// The per-frame tick: item updates, input, orbit and camera, then textures.
pub(crate) fn add_gallery_schedule(app: &mut App) {
    app.configure_sets(
        Update,
        (InteractionSet::Input, InteractionSet::Tick, InteractionSet::Textures)
            .chain()
            .run_if(in_state(GalleryState::Running)),
    );

    // Items may arrive before rendering is up; they are applied regardless.
    app.add_systems(
        Update,
        (load_items_system, bind_precomputed_atlas, apply_item_updates)
            .chain()
            .before(InteractionSet::Input),
    )
    .add_systems(
        Update,
        (relayout_sphere, pointer_input)
            .chain()
            .in_set(InteractionSet::Input),
    )
    .add_systems(
        Update,
        (tick_orbit, update_camera, bind_tile_instances, emit_orbit_events)
            .chain()
            .in_set(InteractionSet::Tick),
    )
    .add_systems(
        Update,
        (
            prune_high_res,
            request_atlas_build,
            poll_atlas_gathering,
            poll_atlas_builds,
            request_high_res,
            poll_high_res,
        )
            .chain()
            .in_set(InteractionSet::Textures),
    );
}

fn setup(mut commands: Commands, mut meshes: ResMut<Assets<Mesh>>) {
    info!("=== SPHERE GALLERY ===");

    commands.spawn((
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            fov: vertical_fov(1.0),
            ..default()
        }),
        Transform::from_xyz(0.0, 0.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
        GalleryCamera,
    ));

    // One unit quad, instanced once per tile.
    commands.spawn((
        Mesh3d(meshes.add(Rectangle::new(1.0, 1.0))),
        Transform::default(),
        Visibility::default(),
        SphereTiles::default(),
        SphereTilesEntity,
        NoFrustumCulling,
    ));
}

pub fn create_app() -> App {
    let mut app = App::new();
    app.add_plugins(create_default_plugins())
        .add_plugins(SphereGalleryPlugin::default());
    app
}

pub fn create_default_plugins() -> impl PluginGroup {
    let window_config = WindowPlugin {
        primary_window: Some(create_window_config()),
        ..default()
    };

    let asset_config = AssetPlugin {
        meta_check: AssetMetaCheck::Never,
        ..default()
    };

    DefaultPlugins.set(window_config).set(asset_config)
}

/// The gallery tick without a window or renderer, already in `Running`.
#[cfg(test)]
pub(crate) fn headless_app() -> App {
    use crate::engine::render::tile_render_plugin::TileTextureSet;
    use bevy::asset::AssetApp;
    use bevy::state::app::StatesPlugin;

    let mut app = App::new();
    app.add_plugins((MinimalPlugins, AssetPlugin::default(), StatesPlugin, bevy::input::InputPlugin))
        .add_event::<bevy::window::CursorLeft>()
        .init_asset::<Image>()
        .init_resource::<TileTextureSet>();
    init_gallery_world(
        &mut app,
        GallerySettings {
            items_path: None,
            ..default()
        },
    );
    add_gallery_schedule(&mut app);
    app.insert_state(GalleryState::Running);
    app.world_mut().spawn((SphereTiles::default(), SphereTilesEntity));
    app
}
