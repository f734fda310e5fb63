use crate::error::AtlasError;
use crate::grid::{AtlasGrid, Cell};
use crate::lookup::AtlasLookup;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Grid description stored alongside precomputed sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestLayout {
    pub cells_per_row: u32,
    pub cell_size: u32,
    pub max_sheets: usize,
}

/// Precomputed atlas description: sheet files plus an id-keyed cell table.
///
/// Keyed by item id rather than array position so one set of sheets serves
/// every filtered subset of the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasManifest {
    pub layout: ManifestLayout,
    /// Sheet image paths relative to the manifest's directory, by sheet index.
    pub sheets: Vec<String>,
    pub cells: BTreeMap<u64, Cell>,
}

impl AtlasManifest {
    pub fn new(grid: &AtlasGrid) -> Self {
        Self {
            layout: ManifestLayout {
                cells_per_row: grid.cells_per_row(),
                cell_size: grid.cell_size,
                max_sheets: grid.max_sheets,
            },
            sheets: Vec::new(),
            cells: BTreeMap::new(),
        }
    }

    /// Builds the manifest for a finished build, naming sheets `sheet_<n>.png`.
    pub fn from_lookup(grid: &AtlasGrid, lookup: &AtlasLookup, sheet_count: usize) -> Self {
        let mut manifest = Self::new(grid);
        manifest.sheets = (0..sheet_count).map(sheet_file_name).collect();
        manifest.cells = lookup.cells().collect();
        manifest
    }

    pub fn read_from(path: &Path) -> Result<Self, AtlasError> {
        let json = fs::read_to_string(path).map_err(|source| AtlasError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, AtlasError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), AtlasError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| AtlasError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rejects manifests written for a different cell geometry.
    pub fn check_grid(&self, grid: &AtlasGrid) -> Result<(), AtlasError> {
        if self.layout.cell_size != grid.cell_size || self.layout.cells_per_row != grid.cells_per_row() {
            return Err(AtlasError::LayoutMismatch {
                expected_cell: grid.cell_size,
                expected_per_row: grid.cells_per_row(),
                found_cell: self.layout.cell_size,
                found_per_row: self.layout.cells_per_row,
            });
        }
        Ok(())
    }

    /// Id-only lookup over the first `max_sheets` sheets.
    pub fn to_lookup(&self, generation: u64, max_sheets: usize) -> AtlasLookup {
        AtlasLookup::from_ids(
            generation,
            self.cells
                .iter()
                .filter(|(_, cell)| (cell.sheet as usize) < max_sheets.min(self.sheets.len()))
                .map(|(id, cell)| (*id, *cell)),
        )
    }
}

pub fn sheet_file_name(index: usize) -> String {
    format!("sheet_{index}.png")
}
