/// Offline thumbnail atlas builder for the sphere gallery.
mod collection;
mod packer;

use anyhow::{Result, bail};
use clap::Parser;
use constants::texture::{FETCH_ATTEMPTS, FETCH_BACKOFF_MS, MAX_SHEETS};
use std::path::PathBuf;
use std::time::Duration;
use tile_atlas::source::UrlSource;
use tile_atlas::{AtlasGrid, RetryPolicy};

#[derive(Parser, Debug)]
#[command(name = "atlas-pre-processing", version, about = "Pack gallery thumbnails into atlas sheets plus an id-keyed manifest")]
struct Opts {
    /// Item collection JSON (`{ "items": [...] }`)
    #[arg(long)]
    items: PathBuf,

    /// Output directory for sheet_<n>.png and atlas_manifest.json
    #[arg(long)]
    out: PathBuf,

    /// Root that relative thumbnail paths resolve against
    #[arg(long, default_value = ".")]
    asset_root: PathBuf,

    /// Sheet budget; the engine binds at most its own maximum
    #[arg(long, default_value_t = MAX_SHEETS)]
    max_sheets: usize,

    /// Fetch attempts per thumbnail
    #[arg(long, default_value_t = FETCH_ATTEMPTS)]
    retries: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opt = Opts::parse();

    if opt.max_sheets == 0 {
        bail!("--max-sheets must be at least 1");
    }

    let requests = collection::read_collection(&opt.items)?;
    let source = UrlSource::new(opt.asset_root.clone());
    let retry = RetryPolicy {
        attempts: opt.retries.max(1),
        backoff: Duration::from_millis(FETCH_BACKOFF_MS),
    };
    let grid = AtlasGrid::standard().capped(opt.max_sheets);

    let summary = packer::pack_atlas(&requests, &source, retry, grid, &opt.out)?;

    println!("Atlas complete!");
    println!("  Items packed: {} of {} distinct", summary.packed, summary.distinct_items);
    println!("  Items over capacity: {}", summary.distinct_items - summary.packed);
    println!("  Failed thumbnails: {}", summary.failures);
    for sheet in &summary.sheets {
        println!("  Sheet: {}", sheet.display());
    }
    println!("  Manifest: {}", summary.manifest.display());
    Ok(())
}
