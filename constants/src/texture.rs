/// Atlas sheet resolution in pixels.
pub const SHEET_SIZE: u32 = 2048;

/// Edge of one atlas cell in pixels.
pub const CELL_SIZE: u32 = 128;

/// Cells along one sheet edge.
pub const CELLS_PER_ROW: u32 = SHEET_SIZE / CELL_SIZE;

/// Cells per sheet.
pub const CELLS_PER_SHEET: u32 = CELLS_PER_ROW * CELLS_PER_ROW;

/// Sheets bound at once, before platform limits are applied.
pub const MAX_SHEETS: usize = 3;

/// Neutral fill behind thumbnails and for cells whose thumbnail failed.
pub const BACKGROUND_FILL: [u8; 4] = [38, 38, 44, 255];

/// Fetch attempts per thumbnail before giving up.
pub const FETCH_ATTEMPTS: u32 = 3;

/// First retry delay; doubled on every further attempt.
pub const FETCH_BACKOFF_MS: u64 = 200;

/// Per-request timeout for HTTP thumbnail and image fetches.
pub const FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Background threads serving HTTP image fetches in the engine.
pub const REMOTE_FETCH_WORKERS: usize = 4;

/// Full-resolution textures kept around, keyed by item id.
pub const HIGH_RES_CACHE_CAPACITY: usize = 16;

/// Seconds for newly textured tiles to fade in from their placeholder colour.
pub const SWAP_FADE_SECONDS: f32 = 0.35;

/// Seconds to wait for a render device before reporting failure.
pub const RENDER_INIT_TIMEOUT_SECONDS: f32 = 5.0;
