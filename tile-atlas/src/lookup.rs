use crate::error::LookupError;
use crate::grid::Cell;
use std::collections::HashMap;

/// Item to cell mapping produced by one atlas build.
///
/// The positional view mirrors the item array the build was requested for and
/// only answers reads tagged with that array's generation. The id view answers
/// for any array, which is what per-frame rendering uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtlasLookup {
    generation: u64,
    by_index: Vec<Option<Cell>>,
    by_id: HashMap<u64, Cell>,
}

impl AtlasLookup {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    /// Id-only lookup, used for precomputed atlases that outlive any array.
    pub fn from_ids(generation: u64, cells: impl IntoIterator<Item = (u64, Cell)>) -> Self {
        Self {
            generation,
            by_index: Vec::new(),
            by_id: cells.into_iter().collect(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Records the cell for the next array position. Duplicate ids keep the
    /// first cell they were given.
    pub fn push(&mut self, id: u64, cell: Option<Cell>) {
        if let Some(cell) = cell {
            self.by_id.entry(id).or_insert(cell);
        }
        self.by_index.push(cell);
    }

    /// Cell for array position `index`. Out-of-range indices read as `None`.
    pub fn cell_for_index(&self, generation: u64, index: usize) -> Result<Option<Cell>, LookupError> {
        if generation != self.generation {
            return Err(LookupError::GenerationMismatch {
                built: self.generation,
                requested: generation,
            });
        }
        Ok(self.by_index.get(index).copied().flatten())
    }

    pub fn cell_for_id(&self, id: u64) -> Option<Cell> {
        self.by_id.get(&id).copied()
    }

    /// Forgets every cell on `sheet`, e.g. after the sheet failed to upload.
    pub fn drop_sheet(&mut self, sheet: u32) {
        self.by_id.retain(|_, cell| cell.sheet != sheet);
        for cell in &mut self.by_index {
            if cell.is_some_and(|c| c.sheet == sheet) {
                *cell = None;
            }
        }
    }

    /// Array length the positional view was built for.
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty() && self.by_id.is_empty()
    }

    /// Distinct ids with a cell.
    pub fn resolved_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.by_id.keys().copied()
    }

    pub fn cells(&self) -> impl Iterator<Item = (u64, Cell)> + '_ {
        self.by_id.iter().map(|(id, cell)| (*id, *cell))
    }
}
