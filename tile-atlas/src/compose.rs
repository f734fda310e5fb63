use crate::grid::{AtlasGrid, Cell};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

/// Scales the thumbnail to cover a square cell, cropping the overflow evenly
/// from both sides so the aspect ratio is kept.
pub fn cover_fit(image: &DynamicImage, cell_size: u32) -> RgbaImage {
    image
        .resize_to_fill(cell_size, cell_size, FilterType::Triangle)
        .to_rgba8()
}

/// Empty sheet filled with the neutral background colour.
pub fn blank_sheet(grid: &AtlasGrid, fill: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(grid.sheet_size, grid.sheet_size, Rgba(fill))
}

/// Blends a cell-sized tile onto its sheet position. Transparent thumbnail
/// pixels keep the background fill.
pub fn place_in_cell(sheet: &mut RgbaImage, tile: &RgbaImage, grid: &AtlasGrid, cell: Cell) {
    let (x, y) = grid.pixel_origin(cell);
    imageops::overlay(sheet, tile, x as i64, y as i64);
}

/// Deterministic muted colour for an item without a usable cell, as linear
/// RGBA. Stable for a given id across runs and platforms.
pub fn placeholder_color(id: u64) -> [f32; 4] {
    let hash = splitmix64(id);
    let hue = (hash % 360) as f32;
    let saturation = 0.25 + ((hash >> 16) % 20) as f32 / 100.0;
    let value = 0.45 + ((hash >> 32) % 20) as f32 / 100.0;
    let [r, g, b] = hsv_to_rgb(hue, saturation, value);
    [srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b), 1.0]
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [f32; 3] {
    let chroma = value * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    [r + m, g + m, b + m]
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
