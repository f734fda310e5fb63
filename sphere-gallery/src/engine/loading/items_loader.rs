use crate::engine::assets::gallery_items::ItemCollection;
use crate::engine::core::settings::GallerySettings;
use crate::engine::events::{GalleryErrorRaised, SetGalleryItems};
use crate::engine::loading::progress::LoadingProgress;
use crate::error::GalleryError;
use bevy::prelude::*;

#[derive(Resource, Default)]
pub struct ItemsLoader {
    handle: Option<Handle<ItemCollection>>,
}

// Start loading the initial item collection, if one is configured
pub fn start_loading(
    mut loader: ResMut<ItemsLoader>,
    mut progress: ResMut<LoadingProgress>,
    settings: Res<GallerySettings>,
    asset_server: Res<AssetServer>,
) {
    match &settings.items_path {
        Some(path) => {
            info!("Loading item collection from: {path}");
            loader.handle = Some(asset_server.load(path.clone()));
        }
        // The host pushes items later.
        None => progress.items_loaded = true,
    }
}

/// Publishes the collection once as a regular item update.
pub fn load_items_system(
    mut loader: ResMut<ItemsLoader>,
    mut progress: ResMut<LoadingProgress>,
    collections: Res<Assets<ItemCollection>>,
    asset_server: Res<AssetServer>,
    settings: Res<GallerySettings>,
    mut updates: EventWriter<SetGalleryItems>,
    mut errors: EventWriter<GalleryErrorRaised>,
) {
    if progress.items_loaded {
        return;
    }
    let Some(handle) = loader.handle.clone() else {
        return;
    };

    if let Some(collection) = collections.get(&handle) {
        info!("✓ {} items loaded", collection.items.len());
        updates.write(SetGalleryItems(collection.items.clone()));
        progress.items_loaded = true;
        loader.handle = None;
    } else if asset_server.load_state(&handle).is_failed() {
        let path = settings.items_path.clone().unwrap_or_default();
        error!("item collection {path} failed to load, waiting for the host to send items");
        errors.write(GalleryErrorRaised(GalleryError::ItemsUnavailable { path }));
        progress.items_loaded = true;
        loader.handle = None;
    }
}
