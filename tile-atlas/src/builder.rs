use crate::compose::{blank_sheet, cover_fit, place_in_cell};
use crate::error::{AtlasError, FetchError};
use crate::grid::{AtlasGrid, Cell};
use crate::lookup::AtlasLookup;
use crate::manifest::sheet_file_name;
use crate::source::{RetryPolicy, ThumbnailSource, fetch_with_retry};
use constants::texture::BACKGROUND_FILL;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One array position to pack: the item's id and where its thumbnail lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub id: u64,
    pub url: String,
}

/// A composited sheet, tagged with the generation it was built for.
#[derive(Debug, Clone)]
pub struct SheetImage {
    pub index: usize,
    pub generation: u64,
    pub image: RgbaImage,
}

impl SheetImage {
    /// Writes the sheet as `sheet_<index>.png` into `dir`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, AtlasError> {
        let path = dir.join(sheet_file_name(self.index));
        self.image.save(&path).map_err(|source| AtlasError::Encode {
            index: self.index,
            source,
        })?;
        Ok(path)
    }
}

/// Result of one build: sheets and lookup are swapped in together or not at all.
#[derive(Debug)]
pub struct AtlasBuild {
    pub generation: u64,
    pub grid: AtlasGrid,
    pub lookup: AtlasLookup,
    pub sheets: Vec<SheetImage>,
    /// Items whose cell kept the background fill.
    pub failures: Vec<(u64, FetchError)>,
}

impl AtlasBuild {
    pub fn packed_count(&self) -> usize {
        self.lookup.resolved_ids().count()
    }
}

/// Decoded RGBA8 pixels, row-major, without tying callers to an image crate version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaPixels {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl From<RgbaImage> for RgbaPixels {
    fn from(image: RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.into_raw(),
        }
    }
}

impl RgbaPixels {
    pub fn into_image(self) -> Result<RgbaImage, FetchError> {
        let (width, height, len) = (self.width, self.height, self.data.len());
        RgbaImage::from_raw(width, height, self.data).ok_or(FetchError::Malformed { width, height, len })
    }
}

/// Decodes any supported encoded image into RGBA8.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaPixels, FetchError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8().into())
}

/// How fetched pixels are sized before they are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// Square atlas cell, centre-cropped.
    Cover(u32),
    /// Aspect kept, longer side capped.
    Within(u32),
}

impl Fit {
    pub fn apply(self, pixels: RgbaPixels) -> Result<RgbaPixels, FetchError> {
        let image = DynamicImage::ImageRgba8(pixels.into_image()?);
        Ok(match self {
            Fit::Cover(cell_size) => cover_fit(&image, cell_size).into(),
            Fit::Within(max) if image.width() > max || image.height() > max => {
                image.resize(max, max, FilterType::Triangle).to_rgba8().into()
            }
            Fit::Within(_) => image.to_rgba8().into(),
        })
    }
}

/// Thumbnail still to be placed into its cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasJob {
    pub id: u64,
    pub url: String,
    pub cell: Cell,
}

/// Cell assignment for one item array, before any thumbnail is fetched.
#[derive(Debug, Clone)]
pub struct AtlasPlan {
    pub generation: u64,
    pub grid: AtlasGrid,
    pub lookup: AtlasLookup,
    /// One job per distinct id that got a cell, in array order.
    pub jobs: Vec<AtlasJob>,
}

impl AtlasPlan {
    /// Fit every thumbnail has to be brought to before composing.
    pub fn fit(&self) -> Fit {
        Fit::Cover(self.grid.cell_size)
    }
}

/// Assigns cells for `requests` in array order.
///
/// Each distinct id gets one cell; positions past the grid's capacity get none.
pub fn plan_atlas(generation: u64, requests: &[ThumbnailRequest], grid: AtlasGrid) -> AtlasPlan {
    let mut lookup = AtlasLookup::new(generation);
    let mut assigned: HashMap<u64, Cell> = HashMap::new();
    let mut jobs: Vec<AtlasJob> = Vec::new();

    for request in requests {
        let cell = match assigned.get(&request.id) {
            Some(cell) => Some(*cell),
            None => grid.cell_for_slot(jobs.len()).inspect(|cell| {
                assigned.insert(request.id, *cell);
                jobs.push(AtlasJob {
                    id: request.id,
                    url: request.url.clone(),
                    cell: *cell,
                });
            }),
        };
        lookup.push(request.id, cell);
    }

    if requests.len() > jobs.len() && jobs.len() == grid.capacity() {
        log::warn!(
            "atlas capacity {} reached, {} positions fall back to placeholders",
            grid.capacity(),
            requests.iter().filter(|r| !assigned.contains_key(&r.id)).count()
        );
    }

    AtlasPlan {
        generation,
        grid,
        lookup,
        jobs,
    }
}

/// Composites cell-sized tiles into sheets. Jobs without a tile keep the
/// background fill and are reported as failures.
pub fn compose_atlas(plan: AtlasPlan, mut tiles: HashMap<u64, Result<RgbaPixels, FetchError>>) -> AtlasBuild {
    let grid = plan.grid;
    let mut sheets: Vec<SheetImage> = (0..grid.sheets_for(plan.jobs.len()))
        .map(|index| SheetImage {
            index,
            generation: plan.generation,
            image: blank_sheet(&grid, BACKGROUND_FILL),
        })
        .collect();

    let mut failures = Vec::new();
    for job in plan.jobs {
        let tile = tiles
            .remove(&job.id)
            .unwrap_or_else(|| Err(FetchError::Unsupported(job.url)))
            .and_then(RgbaPixels::into_image);
        match tile {
            Ok(tile) => {
                if let Some(sheet) = sheets.get_mut(job.cell.sheet as usize) {
                    place_in_cell(&mut sheet.image, &tile, &grid, job.cell);
                }
            }
            Err(err) => {
                log::warn!("thumbnail for item {} unavailable: {err}", job.id);
                failures.push((job.id, err));
            }
        }
    }

    AtlasBuild {
        generation: plan.generation,
        grid,
        lookup: plan.lookup,
        sheets,
        failures,
    }
}

/// Plans, fetches and composes in one blocking call.
///
/// Fetch and decode run in parallel, compositing runs once all cells are ready.
/// `on_item` fires once per distinct id whether it succeeded or not.
pub fn build_atlas<F>(
    generation: u64,
    requests: &[ThumbnailRequest],
    grid: AtlasGrid,
    source: &dyn ThumbnailSource,
    retry: RetryPolicy,
    on_item: F,
) -> AtlasBuild
where
    F: Fn() + Sync,
{
    let plan = plan_atlas(generation, requests, grid);
    let fit = plan.fit();
    let tiles: HashMap<u64, Result<RgbaPixels, FetchError>> = plan
        .jobs
        .par_iter()
        .map(|job| {
            let tile = fetch_with_retry(source, &job.url, retry)
                .and_then(|bytes| decode_rgba(&bytes))
                .and_then(|pixels| fit.apply(pixels));
            on_item();
            (job.id, tile)
        })
        .collect();
    compose_atlas(plan, tiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use image::{DynamicImage, ImageOutputFormat, Rgba};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn png(color: [u8; 4], width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageOutputFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn small_grid(max_sheets: usize) -> AtlasGrid {
        AtlasGrid {
            sheet_size: 32,
            cell_size: 8,
            max_sheets,
        }
    }

    fn no_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    fn requests(ids: &[u64]) -> Vec<ThumbnailRequest> {
        ids.iter()
            .map(|id| ThumbnailRequest {
                id: *id,
                url: format!("thumb/{id}.png"),
            })
            .collect()
    }

    #[test]
    fn thumbnails_land_in_their_looked_up_cells() {
        let mut source = MemorySource::default();
        source.insert("thumb/1.png", png([255, 0, 0, 255], 20, 10));
        source.insert("thumb/2.png", png([0, 255, 0, 255], 10, 20));
        let grid = small_grid(1);

        let build = build_atlas(5, &requests(&[1, 2]), grid, &source, no_retry(), || {});

        assert_eq!(build.sheets.len(), 1);
        assert!(build.failures.is_empty());
        let cell = build.lookup.cell_for_id(2).unwrap();
        let (x, y) = grid.pixel_origin(cell);
        assert_eq!(build.sheets[0].image.get_pixel(x + 4, y + 4).0, [0, 255, 0, 255]);
        assert_eq!(build.sheets[0].generation, 5);
    }

    #[test]
    fn overflow_positions_get_no_cell() {
        let source = MemorySource::default();
        let grid = small_grid(1);
        let ids: Vec<u64> = (0..20).collect();

        let build = build_atlas(1, &requests(&ids), grid, &source, no_retry(), || {});

        assert_eq!(build.lookup.len(), 20);
        assert_eq!(build.packed_count(), 16);
        assert_eq!(build.lookup.cell_for_index(1, 19), Ok(None));
        assert!(build.lookup.cell_for_index(1, 15).unwrap().is_some());
    }

    #[test]
    fn failed_thumbnails_keep_the_background_fill() {
        let mut source = MemorySource::default();
        source.insert("thumb/2.png", b"not an image".to_vec());
        let grid = small_grid(1);

        let build = build_atlas(1, &requests(&[1, 2]), grid, &source, no_retry(), || {});

        assert_eq!(build.failures.len(), 2);
        let cell = build.lookup.cell_for_id(2).unwrap();
        let (x, y) = grid.pixel_origin(cell);
        assert_eq!(build.sheets[0].image.get_pixel(x, y).0, BACKGROUND_FILL);
    }

    #[test]
    fn duplicate_ids_share_one_cell_and_report_progress_once() {
        let source = MemorySource::default();
        let seen = AtomicUsize::new(0);

        let build = build_atlas(1, &requests(&[4, 4, 9]), small_grid(2), &source, no_retry(), || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(
            build.lookup.cell_for_index(1, 0).unwrap(),
            build.lookup.cell_for_index(1, 1).unwrap()
        );
    }

    #[test]
    fn full_images_are_capped_to_the_texture_limit() {
        let pixels = decode_rgba(&png([1, 2, 3, 255], 40, 10)).unwrap();
        let capped = Fit::Within(20).apply(pixels.clone()).unwrap();
        assert_eq!((capped.width, capped.height), (20, 5));
        assert_eq!(capped.data.len(), 20 * 5 * 4);
        assert_eq!(&capped.data[..4], &[1, 2, 3, 255]);

        assert_eq!(Fit::Within(64).apply(pixels.clone()).unwrap(), pixels);
        assert!(decode_rgba(b"not an image").is_err());
    }

    #[test]
    fn gathered_tiles_compose_like_a_fetched_build() {
        let grid = small_grid(1);
        let plan = plan_atlas(2, &requests(&[1, 2, 1]), grid);
        assert_eq!(plan.jobs.len(), 2);

        let red = Fit::Cover(grid.cell_size)
            .apply(decode_rgba(&png([255, 0, 0, 255], 30, 12)).unwrap())
            .unwrap();
        let mut tiles = HashMap::new();
        tiles.insert(1, Ok(red));
        let build = compose_atlas(plan, tiles);

        let (x, y) = grid.pixel_origin(build.lookup.cell_for_id(1).unwrap());
        assert_eq!(build.sheets[0].image.get_pixel(x + 2, y + 2).0, [255, 0, 0, 255]);
        assert_eq!(build.failures.len(), 1);
        assert_eq!(build.failures[0].0, 2);
        assert_eq!(build.lookup.cell_for_index(2, 2).unwrap(), build.lookup.cell_for_id(1));
    }

    #[test]
    fn malformed_pixel_buffers_are_rejected() {
        let short = RgbaPixels {
            width: 4,
            height: 4,
            data: vec![0; 7],
        };
        assert!(matches!(Fit::Cover(8).apply(short), Err(FetchError::Malformed { len: 7, .. })));
    }

    #[test]
    fn empty_request_builds_nothing() {
        let build = build_atlas(3, &[], small_grid(3), &MemorySource::default(), no_retry(), || {});
        assert!(build.sheets.is_empty());
        assert!(build.lookup.is_empty());
    }

    #[test]
    fn saved_sheets_use_manifest_names() {
        let dir = std::env::temp_dir().join(format!("tile-atlas-save-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sheet = SheetImage {
            index: 2,
            generation: 1,
            image: blank_sheet(&small_grid(3), BACKGROUND_FILL),
        };

        let path = sheet.save(&dir).unwrap();

        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("sheet_2.png"));
        let reloaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(reloaded.get_pixel(0, 0).0, BACKGROUND_FILL);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
