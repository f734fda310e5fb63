use crate::engine::assets::gallery_items::GalleryItems;
use crate::engine::atlas::atlas_manager::{AcceptOutcome, AtlasManager};
use crate::engine::atlas::image_fetch::{FetchResult, ImageFetcher, PendingImage};
use crate::engine::core::settings::GallerySettings;
use crate::engine::events::GalleryErrorRaised;
use crate::engine::loading::progress::{AtlasProgress, LoadingProgress};
use crate::error::GalleryError;
use bevy::asset::{LoadState, RenderAssetUsages};
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use bevy::tasks::{AsyncComputeTaskPool, Task, block_on, futures_lite::future};
use serde::Deserialize;
use std::collections::HashMap;
use tile_atlas::{
    AtlasBuild, AtlasGrid, AtlasLookup, AtlasManifest, AtlasPlan, RgbaPixels, ThumbnailRequest, compose_atlas,
    plan_atlas,
};

/// Precomputed atlas manifest, loaded through the asset server.
#[derive(Asset, TypePath, Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct PrecomputedAtlas(pub AtlasManifest);

/// Sheets of a validated manifest, held back until every one has settled.
struct PendingSheets {
    grid: AtlasGrid,
    lookup: AtlasLookup,
    handles: Vec<Handle<Image>>,
}

#[derive(Resource, Default)]
pub struct PrecomputedAtlasLoader {
    handle: Option<Handle<PrecomputedAtlas>>,
    sheets: Option<PendingSheets>,
    finished: bool,
}

impl PrecomputedAtlasLoader {
    /// True while a configured manifest may still replace runtime builds.
    pub fn is_waiting(&self) -> bool {
        self.handle.is_some() && !self.finished
    }
}

/// Load outcome of one precomputed sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetLoad {
    Loading,
    Loaded,
    Failed,
}

impl From<&LoadState> for SheetLoad {
    fn from(state: &LoadState) -> Self {
        match state {
            LoadState::Loaded => SheetLoad::Loaded,
            LoadState::Failed(_) => SheetLoad::Failed,
            _ => SheetLoad::Loading,
        }
    }
}

/// `None` while any sheet is still loading, otherwise which sheets arrived.
pub fn settled_sheets(states: &[SheetLoad]) -> Option<Vec<bool>> {
    if states.contains(&SheetLoad::Loading) {
        return None;
    }
    Some(states.iter().map(|state| *state == SheetLoad::Loaded).collect())
}

/// Thumbnails being collected for one planned build.
pub struct AtlasGathering {
    plan: AtlasPlan,
    pending: HashMap<u64, PendingImage>,
    tiles: HashMap<u64, FetchResult>,
}

impl AtlasGathering {
    /// Starts a fetch per job. Work a superseded gathering already did for the
    /// same ids is adopted; its failures are fetched again.
    pub fn start(plan: AtlasPlan, previous: Option<AtlasGathering>, mut fetch: impl FnMut(&str) -> PendingImage) -> Self {
        let (mut old_pending, mut old_tiles) = previous
            .map(|gathering| (gathering.pending, gathering.tiles))
            .unwrap_or_default();
        let mut pending = HashMap::new();
        let mut tiles = HashMap::new();

        for job in &plan.jobs {
            match (old_tiles.remove(&job.id), old_pending.remove(&job.id)) {
                (Some(Ok(tile)), _) => {
                    tiles.insert(job.id, Ok(tile));
                }
                (_, Some(image)) => {
                    pending.insert(job.id, image);
                }
                _ => {
                    pending.insert(job.id, fetch(&job.url));
                }
            }
        }
        Self { plan, pending, tiles }
    }

    pub fn generation(&self) -> u64 {
        self.plan.generation
    }

    pub fn progress(&self) -> AtlasProgress {
        AtlasProgress {
            generation: self.plan.generation,
            total: self.plan.jobs.len(),
            done: self.tiles.len(),
        }
    }

    /// Moves results `poll` reports as final into the tile set; returns how
    /// many arrived.
    pub fn collect(&mut self, mut poll: impl FnMut(&mut PendingImage) -> Option<FetchResult>) -> usize {
        let before = self.tiles.len();
        let tiles = &mut self.tiles;
        self.pending.retain(|id, image| match poll(image) {
            Some(result) => {
                tiles.insert(*id, result);
                false
            }
            None => true,
        });
        self.tiles.len() - before
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn into_parts(self) -> (AtlasPlan, HashMap<u64, FetchResult>) {
        (self.plan, self.tiles)
    }
}

/// The gathering for the newest requested generation and the compositions
/// still running on the compute pool.
#[derive(Resource, Default)]
pub struct AtlasBuildTasks {
    gathering: Option<AtlasGathering>,
    composing: Vec<Task<AtlasBuild>>,
}

pub fn pixels_to_image(pixels: RgbaPixels) -> Image {
    Image::new(
        Extent3d {
            width: pixels.width,
            height: pixels.height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        pixels.data,
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::RENDER_WORLD,
    )
}

/// Plans a build for the current item array and starts gathering its
/// thumbnails, replacing any gathering for an older array.
pub fn request_atlas_build(
    items: Res<GalleryItems>,
    mut manager: ResMut<AtlasManager>,
    mut tasks: ResMut<AtlasBuildTasks>,
    mut progress: ResMut<LoadingProgress>,
    loader: Res<PrecomputedAtlasLoader>,
    fetcher: Res<ImageFetcher>,
    asset_server: Res<AssetServer>,
) {
    if items.generation() <= manager.requested_generation() || loader.is_waiting() {
        return;
    }
    let generation = items.generation();
    if !manager.request(generation) {
        return;
    }

    let requests: Vec<ThumbnailRequest> = items
        .items()
        .iter()
        .map(|item| ThumbnailRequest {
            id: item.id,
            url: item.thumbnail_url.clone(),
        })
        .collect();
    let plan = plan_atlas(generation, &requests, manager.grid());
    let fit = plan.fit();

    let previous = tasks.gathering.take();
    if let Some(previous) = &previous {
        debug!("atlas generation {} superseded while gathering", previous.generation());
    }
    let gathering = AtlasGathering::start(plan, previous, |url| fetcher.start(url, fit, &asset_server));
    let started = gathering.progress();
    info!(
        "gathering thumbnails for atlas generation {generation}: {} of {} already at hand",
        started.done, started.total
    );
    progress.atlas = Some(started);
    tasks.gathering = Some(gathering);
}

/// Advances thumbnail fetches and hands a complete set to the compute pool.
pub fn poll_atlas_gathering(
    mut tasks: ResMut<AtlasBuildTasks>,
    mut progress: ResMut<LoadingProgress>,
    asset_server: Res<AssetServer>,
    images: Res<Assets<Image>>,
) {
    let Some(gathering) = tasks.gathering.as_mut() else {
        return;
    };
    if gathering.collect(|image| image.poll(&asset_server, &images)) > 0 {
        progress.atlas = Some(gathering.progress());
    }
    if !gathering.is_complete() {
        return;
    }

    let Some(gathering) = tasks.gathering.take() else {
        return;
    };
    let (plan, tiles) = gathering.into_parts();
    debug!("composing atlas generation {}", plan.generation);
    let task = AsyncComputeTaskPool::get().spawn(async move { compose_atlas(plan, tiles) });
    tasks.composing.push(task);
}

/// Swaps finished builds in, oldest first so a stale build never wins.
pub fn poll_atlas_builds(
    mut tasks: ResMut<AtlasBuildTasks>,
    mut manager: ResMut<AtlasManager>,
    mut images: ResMut<Assets<Image>>,
    time: Res<Time>,
) {
    manager.set_clock(time.elapsed_secs());

    let mut finished = Vec::new();
    tasks.composing.retain_mut(|task| match block_on(future::poll_once(task)) {
        Some(build) => {
            finished.push(build);
            false
        }
        None => true,
    });
    finished.sort_by_key(|build| build.generation);

    for build in finished {
        let generation = build.generation;
        let failures = build.failures.len();
        let outcome = manager.accept(build, |sheet| Some(images.add(pixels_to_image(sheet.image.clone().into()))));
        match outcome {
            AcceptOutcome::Swapped { retired, .. } => {
                if failures > 0 {
                    warn!("atlas generation {generation}: {failures} thumbnails kept the background fill");
                }
                for handle in retired {
                    images.remove(&handle);
                }
            }
            AcceptOutcome::Stale { bound } => {
                debug!("dropping atlas generation {generation}, generation {bound} is already bound");
            }
            AcceptOutcome::Ignored => {}
        }
    }
}

pub fn start_precomputed_atlas(
    settings: Res<GallerySettings>,
    asset_server: Res<AssetServer>,
    mut loader: ResMut<PrecomputedAtlasLoader>,
) {
    if let Some(path) = &settings.precomputed_atlas {
        info!("loading precomputed atlas from {path}");
        loader.handle = Some(asset_server.load(path.clone()));
    }
}

/// Validates the precomputed manifest once it arrives, then binds its sheets
/// only after each one has loaded or failed. A broken manifest is reported
/// and runtime builds take over.
pub fn bind_precomputed_atlas(
    mut loader: ResMut<PrecomputedAtlasLoader>,
    manifests: Res<Assets<PrecomputedAtlas>>,
    asset_server: Res<AssetServer>,
    settings: Res<GallerySettings>,
    mut manager: ResMut<AtlasManager>,
    mut images: ResMut<Assets<Image>>,
    mut errors: EventWriter<GalleryErrorRaised>,
) {
    if !loader.is_waiting() {
        return;
    }
    if loader.sheets.is_some() {
        bind_settled_sheets(&mut loader, &asset_server, &mut manager, &mut images);
        return;
    }
    let Some(handle) = loader.handle.clone() else {
        return;
    };
    let path = settings.precomputed_atlas.clone().unwrap_or_default();

    if asset_server.load_state(&handle).is_failed() {
        loader.finished = true;
        errors.write(GalleryErrorRaised(GalleryError::AtlasManifest {
            path,
            reason: "manifest could not be loaded".to_string(),
        }));
        return;
    }
    let Some(PrecomputedAtlas(manifest)) = manifests.get(&handle) else {
        return;
    };

    let grid = manager.grid();
    let usable = manifest
        .check_grid(&grid)
        .map_err(|err| err.to_string())
        .and_then(|()| {
            if manager.limits().fits(grid.sheet_size) {
                Ok(())
            } else {
                Err(format!(
                    "sheets of {} px exceed the device limit of {} px",
                    grid.sheet_size,
                    manager.limits().max_texture_dimension
                ))
            }
        });
    if let Err(reason) = usable {
        loader.finished = true;
        errors.write(GalleryErrorRaised(GalleryError::AtlasManifest { path, reason }));
        return;
    }

    let directory = path.rsplit_once('/').map_or("", |(dir, _)| dir);
    let sheet_count = manifest.sheets.len().min(grid.max_sheets);
    let handles: Vec<Handle<Image>> = manifest
        .sheets
        .iter()
        .take(sheet_count)
        .map(|name| match directory {
            "" => asset_server.load(name.clone()),
            dir => asset_server.load(format!("{dir}/{name}")),
        })
        .collect();
    info!("precomputed atlas manifest ready: {} items, waiting for {sheet_count} sheets", manifest.cells.len());

    loader.sheets = Some(PendingSheets {
        grid: AtlasGrid {
            max_sheets: sheet_count,
            ..grid
        },
        lookup: manifest.to_lookup(0, sheet_count),
        handles,
    });
}

fn bind_settled_sheets(
    loader: &mut PrecomputedAtlasLoader,
    asset_server: &AssetServer,
    manager: &mut AtlasManager,
    images: &mut Assets<Image>,
) {
    let Some(pending) = &loader.sheets else {
        return;
    };
    let states: Vec<SheetLoad> = pending
        .handles
        .iter()
        .map(|handle| SheetLoad::from(&asset_server.load_state(handle)))
        .collect();
    let Some(loaded) = settled_sheets(&states) else {
        return;
    };
    let Some(PendingSheets { grid, lookup, handles }) = loader.sheets.take() else {
        return;
    };
    loader.finished = true;

    let sheets = handles
        .into_iter()
        .zip(loaded)
        .map(|(handle, arrived)| arrived.then_some(handle))
        .collect();
    for retired in manager.bind_precomputed(grid, lookup, sheets) {
        images.remove(&retired);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc::{self, Sender};
    use tile_atlas::{FetchError, Fit};

    fn small_grid() -> AtlasGrid {
        AtlasGrid {
            sheet_size: 32,
            cell_size: 8,
            max_sheets: 2,
        }
    }

    fn plan(generation: u64, ids: &[u64]) -> AtlasPlan {
        let requests: Vec<ThumbnailRequest> = ids
            .iter()
            .map(|id| ThumbnailRequest {
                id: *id,
                url: format!("thumbs/{id}.jpg"),
            })
            .collect();
        plan_atlas(generation, &requests, small_grid())
    }

    fn tile(value: u8) -> FetchResult {
        Ok(RgbaPixels {
            width: 8,
            height: 8,
            data: [value, value, value, 255].repeat(8 * 8),
        })
    }

    /// Fetches that resolve when the test sends into the matching channel.
    #[derive(Default)]
    struct Channels {
        senders: HashMap<String, Sender<FetchResult>>,
    }

    impl Channels {
        fn fetch(&mut self, url: &str) -> PendingImage {
            let (reply, receiver) = mpsc::channel();
            self.senders.insert(url.to_string(), reply);
            PendingImage::Remote {
                url: url.to_string(),
                reply: Mutex::new(receiver),
            }
        }

        fn resolve(&self, id: u64, result: FetchResult) {
            self.senders[&format!("thumbs/{id}.jpg")].send(result).unwrap();
        }
    }

    fn poll_channel(image: &mut PendingImage) -> Option<FetchResult> {
        match image {
            PendingImage::Remote { reply, .. } => reply.get_mut().unwrap().try_recv().ok(),
            _ => None,
        }
    }

    #[test]
    fn sheets_bind_only_after_all_of_them_settle() {
        use SheetLoad::*;
        assert_eq!(settled_sheets(&[Loaded, Loading]), None);
        assert_eq!(settled_sheets(&[Loaded, Failed, Loaded]), Some(vec![true, false, true]));
        assert_eq!(settled_sheets(&[]), Some(vec![]));
        assert_eq!(SheetLoad::from(&LoadState::Loading), Loading);
    }

    #[test]
    fn gathering_completes_once_every_thumbnail_resolved() {
        let mut channels = Channels::default();
        let mut gathering = AtlasGathering::start(plan(1, &[1, 2, 1, 3]), None, |url| channels.fetch(url));
        assert_eq!(channels.senders.len(), 3);
        assert_eq!(gathering.collect(poll_channel), 0);

        channels.resolve(1, tile(10));
        channels.resolve(3, Err(FetchError::Unsupported("thumbs/3.jpg".to_string())));
        assert_eq!(gathering.collect(poll_channel), 2);
        assert_eq!(gathering.progress().done, 2);
        assert!(!gathering.is_complete());

        channels.resolve(2, tile(20));
        assert_eq!(gathering.collect(poll_channel), 1);
        assert!(gathering.is_complete());

        let (plan, tiles) = gathering.into_parts();
        let build = compose_atlas(plan, tiles);
        assert_eq!(build.generation, 1);
        assert_eq!(build.packed_count(), 3);
        assert_eq!(build.failures.len(), 1);
        let (x, y) = small_grid().pixel_origin(build.lookup.cell_for_id(2).unwrap());
        assert_eq!(build.sheets[0].image.get_pixel(x + 3, y + 3).0, [20, 20, 20, 255]);
    }

    #[test]
    fn superseding_gathering_adopts_work_for_shared_ids() {
        let mut channels = Channels::default();
        let mut first = AtlasGathering::start(plan(1, &[1, 2, 3]), None, |url| channels.fetch(url));
        channels.resolve(1, tile(10));
        channels.resolve(3, Err(FetchError::Unsupported("thumbs/3.jpg".to_string())));
        first.collect(poll_channel);

        let mut started = Vec::new();
        let mut second = AtlasGathering::start(plan(2, &[2, 3, 1, 4]), Some(first), |url| {
            started.push(url.to_string());
            channels.fetch(url)
        });

        // 1 is reused, 2 keeps its fetch, 3 failed and is fetched again.
        assert_eq!(started, vec!["thumbs/3.jpg", "thumbs/4.jpg"]);
        assert_eq!(second.progress().done, 1);
        assert_eq!(second.generation(), 2);

        for id in [2, 3, 4] {
            channels.resolve(id, tile(id as u8));
        }
        assert_eq!(second.collect(poll_channel), 3);
        assert!(second.is_complete());
    }

    #[test]
    fn cell_fit_matches_the_plan_grid() {
        assert_eq!(plan(1, &[1]).fit(), Fit::Cover(8));
    }
}
