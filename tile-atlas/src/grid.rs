use constants::texture::{CELL_SIZE, MAX_SHEETS, SHEET_SIZE};
use serde::{Deserialize, Serialize};

/// Location of one thumbnail: sheet index plus grid coordinates (not UV).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub sheet: u32,
    pub x: u32,
    pub y: u32,
}

/// UV coordinate bounds of a cell in normalised sheet space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtlasRegion {
    /// Minimum UV coordinates (top-left corner).
    pub uv_min: [f32; 2],
    /// Maximum UV coordinates (bottom-right corner).
    pub uv_max: [f32; 2],
}

impl AtlasRegion {
    /// Converts grid coordinates to normalised UV space for GPU sampling.
    pub fn from_cell(cell: Cell, cells_per_row: u32) -> Self {
        let step = 1.0 / cells_per_row.max(1) as f32;
        let u_min = cell.x as f32 * step;
        let v_min = cell.y as f32 * step;

        Self {
            uv_min: [u_min, v_min],
            uv_max: [u_min + step, v_min + step],
        }
    }

    /// Packed as `[u_min, v_min, u_max, v_max]` for instance data.
    pub fn to_array(self) -> [f32; 4] {
        [self.uv_min[0], self.uv_min[1], self.uv_max[0], self.uv_max[1]]
    }
}

/// Sheet geometry and the sheet budget for one atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasGrid {
    /// Sheet resolution in pixels (square).
    pub sheet_size: u32,
    /// Cell resolution in pixels (square).
    pub cell_size: u32,
    /// Sheets allowed for one build.
    pub max_sheets: usize,
}

impl Default for AtlasGrid {
    fn default() -> Self {
        Self::standard()
    }
}

impl AtlasGrid {
    /// 128px cells on 2048px sheets, 256 cells per sheet.
    pub fn standard() -> Self {
        Self {
            sheet_size: SHEET_SIZE,
            cell_size: CELL_SIZE,
            max_sheets: MAX_SHEETS,
        }
    }

    /// Same geometry with a lower sheet budget. Never raises the budget.
    pub fn capped(self, max_sheets: usize) -> Self {
        Self {
            max_sheets: self.max_sheets.min(max_sheets),
            ..self
        }
    }

    pub fn cells_per_row(&self) -> u32 {
        (self.sheet_size / self.cell_size.max(1)).max(1)
    }

    pub fn cells_per_sheet(&self) -> usize {
        let per_row = self.cells_per_row() as usize;
        per_row * per_row
    }

    /// Total cells across every allowed sheet.
    pub fn capacity(&self) -> usize {
        self.cells_per_sheet() * self.max_sheets
    }

    /// Row-major cell for the n-th packed thumbnail, `None` past capacity.
    pub fn cell_for_slot(&self, slot: usize) -> Option<Cell> {
        if slot >= self.capacity() {
            return None;
        }
        let per_sheet = self.cells_per_sheet();
        let per_row = self.cells_per_row() as usize;
        let within = slot % per_sheet;

        Some(Cell {
            sheet: (slot / per_sheet) as u32,
            x: (within % per_row) as u32,
            y: (within / per_row) as u32,
        })
    }

    /// Pixel offset of a cell's top-left corner within its sheet.
    pub fn pixel_origin(&self, cell: Cell) -> (u32, u32) {
        (cell.x * self.cell_size, cell.y * self.cell_size)
    }

    pub fn region(&self, cell: Cell) -> AtlasRegion {
        AtlasRegion::from_cell(cell, self.cells_per_row())
    }

    /// Sheets needed to hold `cells` packed thumbnails.
    pub fn sheets_for(&self, cells: usize) -> usize {
        cells.div_ceil(self.cells_per_sheet()).min(self.max_sheets)
    }
}
