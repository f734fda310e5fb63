use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tile_atlas::{AtlasGrid, AtlasManifest, RetryPolicy, ThumbnailRequest, ThumbnailSource, build_atlas};

pub const MANIFEST_FILE_NAME: &str = "atlas_manifest.json";

/// What a packing run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    pub positions: usize,
    pub distinct_items: usize,
    pub packed: usize,
    pub failures: usize,
    pub sheets: Vec<PathBuf>,
    pub manifest: PathBuf,
}

/// Builds an atlas for `requests` and writes its sheets and manifest into `out_dir`.
pub fn pack_atlas(
    requests: &[ThumbnailRequest],
    source: &dyn ThumbnailSource,
    retry: RetryPolicy,
    grid: AtlasGrid,
    out_dir: &Path,
) -> Result<PackSummary> {
    let mut seen = HashSet::new();
    let distinct_items = requests.iter().filter(|r| seen.insert(r.id)).count();
    let to_fetch = distinct_items.min(grid.capacity());

    println!(
        "Packing {} items ({} distinct) into at most {} sheets of {} cells",
        requests.len(),
        distinct_items,
        grid.max_sheets,
        grid.cells_per_sheet()
    );

    let pb = ProgressBar::new(to_fetch as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.green/blue}] {pos}/{len} thumbnails ({percent}%) {msg}")
            .context("progress bar template")?
            .progress_chars("█▉▊▋▌▍▎▏"),
    );
    pb.set_message("Fetching thumbnails");

    let build = build_atlas(0, requests, grid, source, retry, || pb.inc(1));
    pb.finish_with_message("Thumbnails packed");

    for (id, err) in &build.failures {
        log::warn!("item {id}: {err}");
    }

    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let sheets = build
        .sheets
        .iter()
        .map(|sheet| sheet.save(out_dir).context("writing atlas sheet"))
        .collect::<Result<Vec<_>>>()?;

    let manifest_path = out_dir.join(MANIFEST_FILE_NAME);
    AtlasManifest::from_lookup(&grid, &build.lookup, sheets.len())
        .write_to(&manifest_path)
        .context("writing atlas manifest")?;

    Ok(PackSummary {
        positions: requests.len(),
        distinct_items,
        packed: build.packed_count(),
        failures: build.failures.len(),
        sheets,
        manifest: manifest_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::time::Duration;
    use tile_atlas::source::MemorySource;

    fn png(color: [u8; 4]) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(12, 12, Rgba(color)));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageOutputFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn manifest_maps_every_packed_id_to_a_written_sheet() {
        let mut source = MemorySource::default();
        for id in 0..20 {
            source.insert(format!("t/{id}.png"), png([id as u8 * 10, 0, 0, 255]));
        }
        let mut requests: Vec<ThumbnailRequest> = (0..20)
            .map(|id| ThumbnailRequest {
                id,
                url: format!("t/{id}.png"),
            })
            .collect();
        requests.push(requests[0].clone());
        let grid = AtlasGrid {
            sheet_size: 32,
            cell_size: 8,
            max_sheets: 2,
        };
        let retry = RetryPolicy {
            attempts: 1,
            backoff: Duration::ZERO,
        };
        let out = std::env::temp_dir().join(format!("atlas-pack-{}", std::process::id()));

        let summary = pack_atlas(&requests, &source, retry, grid, &out).unwrap();

        assert_eq!(summary.positions, 21);
        assert_eq!(summary.distinct_items, 20);
        assert_eq!(summary.packed, 20);
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.sheets.len(), 2);
        let manifest = AtlasManifest::read_from(&summary.manifest).unwrap();
        assert_eq!(manifest.sheets, vec!["sheet_0.png", "sheet_1.png"]);
        assert_eq!(manifest.cells.len(), 20);
        assert!(manifest.cells.values().all(|cell| (cell.sheet as usize) < manifest.sheets.len()));
        fs::remove_dir_all(&out).unwrap();
    }
}
