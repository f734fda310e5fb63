use crate::engine::instances::instance_binder::{TileTexture, TileTextures};
use bevy::prelude::*;
use constants::texture::{MAX_SHEETS, SHEET_SIZE, SWAP_FADE_SECONDS};
use std::collections::HashMap;
use tile_atlas::{AtlasBuild, AtlasGrid, AtlasLookup, SheetImage};

/// Texture limits read from the render device at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformLimits {
    pub max_texture_dimension: u32,
    pub max_sampled_textures: u32,
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension: SHEET_SIZE,
            // Sheets plus the high-res overlay.
            max_sampled_textures: MAX_SHEETS as u32 + 1,
        }
    }
}

impl PlatformLimits {
    /// Sheets that fit the shader stage, one slot kept for the high-res overlay.
    pub fn sheet_budget(&self) -> usize {
        (self.max_sampled_textures as usize).saturating_sub(1)
    }

    pub fn fits(&self, sheet_size: u32) -> bool {
        sheet_size <= self.max_texture_dimension
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AtlasMode {
    /// Sheets are rebuilt for every item array.
    #[default]
    Dynamic,
    /// Sheets and an id-keyed manifest were loaded from disk and never rebuilt.
    Precomputed,
}

/// Atlas the renderer currently samples from.
#[derive(Debug, Clone)]
pub struct BoundAtlas {
    pub generation: u64,
    pub grid: AtlasGrid,
    pub lookup: AtlasLookup,
    pub sheets: Vec<Handle<Image>>,
}

/// What happened to a finished build.
#[derive(Debug, PartialEq)]
pub enum AcceptOutcome {
    /// Build swapped in; the replaced sheets should be freed.
    Swapped {
        retired: Vec<Handle<Image>>,
        dropped_sheets: Vec<u32>,
    },
    /// A newer generation is already bound.
    Stale { bound: u64 },
    /// Precomputed atlases are never replaced by runtime builds.
    Ignored,
}

/// Owns the bound atlas, its lookup and the sheet handles.
#[derive(Resource, Debug)]
pub struct AtlasManager {
    mode: AtlasMode,
    limits: PlatformLimits,
    max_sheets: usize,
    requested: u64,
    bound: Option<BoundAtlas>,
    /// Item id to the time its first cell appeared, for ids still fading in.
    fading: HashMap<u64, f32>,
    clock: f32,
}

impl Default for AtlasManager {
    fn default() -> Self {
        Self {
            mode: AtlasMode::Dynamic,
            limits: PlatformLimits::default(),
            max_sheets: MAX_SHEETS,
            requested: 0,
            bound: None,
            fading: HashMap::new(),
            clock: 0.0,
        }
    }
}

impl AtlasManager {
    pub fn new(max_sheets: usize, limits: PlatformLimits) -> Self {
        Self {
            max_sheets,
            limits,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> AtlasMode {
        self.mode
    }

    pub fn limits(&self) -> PlatformLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: PlatformLimits) {
        self.limits = limits;
    }

    /// Grid for the next build, capped by settings and the platform budget.
    pub fn grid(&self) -> AtlasGrid {
        AtlasGrid::standard().capped(self.max_sheets.min(self.limits.sheet_budget()))
    }

    pub fn bound(&self) -> Option<&BoundAtlas> {
        self.bound.as_ref()
    }

    pub fn bound_generation(&self) -> Option<u64> {
        self.bound.as_ref().map(|b| b.generation)
    }

    /// Highest generation a build was requested for.
    pub fn requested_generation(&self) -> u64 {
        self.requested
    }

    /// Returns true when a build for `generation` should start.
    pub fn request(&mut self, generation: u64) -> bool {
        if self.mode == AtlasMode::Precomputed || generation <= self.requested {
            return false;
        }
        self.requested = generation;
        true
    }

    pub fn sheet_handles(&self) -> &[Handle<Image>] {
        self.bound.as_ref().map(|b| b.sheets.as_slice()).unwrap_or(&[])
    }

    pub fn set_clock(&mut self, now: f32) {
        self.clock = now;
        self.fading.retain(|_, start| now - *start < SWAP_FADE_SECONDS);
    }

    /// Swaps in `build` when it is newer than the bound atlas.
    ///
    /// `upload` turns each sheet into an image handle; sheets it refuses are
    /// dropped and their items fall back to placeholders. Lookup and sheets are
    /// replaced together.
    pub fn accept<F>(&mut self, build: AtlasBuild, mut upload: F) -> AcceptOutcome
    where
        F: FnMut(&SheetImage) -> Option<Handle<Image>>,
    {
        if self.mode == AtlasMode::Precomputed {
            return AcceptOutcome::Ignored;
        }
        if let Some(bound) = self.bound_generation() {
            if build.generation <= bound {
                return AcceptOutcome::Stale { bound };
            }
        }

        let mut lookup = build.lookup;
        let mut sheets = Vec::with_capacity(build.sheets.len());
        let mut dropped_sheets = Vec::new();
        for sheet in &build.sheets {
            let handle = if self.limits.fits(build.grid.sheet_size) {
                upload(sheet)
            } else {
                None
            };
            match handle {
                Some(handle) => sheets.push(handle),
                None => {
                    warn!("atlas sheet {} could not be uploaded, its items use placeholders", sheet.index);
                    lookup.drop_sheet(sheet.index as u32);
                    dropped_sheets.push(sheet.index as u32);
                    sheets.push(Handle::default());
                }
            }
        }

        let retired = self.bind(BoundAtlas {
            generation: build.generation,
            grid: build.grid,
            lookup,
            sheets,
        });
        AcceptOutcome::Swapped { retired, dropped_sheets }
    }

    /// Binds a precomputed atlas once all its sheets settled. Sheets that
    /// failed to load (`None`) are dropped and their items use placeholders.
    /// Later runtime builds are ignored.
    pub fn bind_precomputed(
        &mut self,
        grid: AtlasGrid,
        mut lookup: AtlasLookup,
        sheets: Vec<Option<Handle<Image>>>,
    ) -> Vec<Handle<Image>> {
        self.mode = AtlasMode::Precomputed;
        let sheets = sheets
            .into_iter()
            .enumerate()
            .map(|(index, sheet)| {
                sheet.unwrap_or_else(|| {
                    warn!("precomputed sheet {index} failed to load, its items use placeholders");
                    lookup.drop_sheet(index as u32);
                    Handle::default()
                })
            })
            .collect();
        self.bind(BoundAtlas {
            generation: lookup.generation(),
            grid,
            lookup,
            sheets,
        })
    }

    fn bind(&mut self, next: BoundAtlas) -> Vec<Handle<Image>> {
        let previous = self.bound.take();
        for id in next.lookup.resolved_ids() {
            let was_textured = previous
                .as_ref()
                .is_some_and(|p| p.lookup.cell_for_id(id).is_some());
            if !was_textured {
                self.fading.insert(id, self.clock);
            }
        }
        info!(
            "atlas generation {} bound: {} sheets, {} items",
            next.generation,
            next.sheets.len(),
            next.lookup.resolved_ids().count()
        );
        self.bound = Some(next);

        previous
            .map(|p| p.sheets)
            .unwrap_or_default()
            .into_iter()
            .filter(|handle| *handle != Handle::default())
            .collect()
    }
}

impl TileTextures for AtlasManager {
    fn texture_for(&self, id: u64) -> Option<TileTexture> {
        let bound = self.bound.as_ref()?;
        let cell = bound.lookup.cell_for_id(id)?;
        let fade = self
            .fading
            .get(&id)
            .map_or(1.0, |start| ((self.clock - start) / SWAP_FADE_SECONDS).clamp(0.0, 1.0));
        Some(TileTexture {
            sheet: cell.sheet,
            uv_rect: bound.grid.region(cell).to_array(),
            fade,
        })
    }
}
