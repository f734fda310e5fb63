use bevy::prelude::*;
use constants::texture::{
    FETCH_ATTEMPTS, FETCH_BACKOFF_MS, HIGH_RES_CACHE_CAPACITY, MAX_SHEETS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tile_atlas::RetryPolicy;

/// Runtime configuration. Every field has a default, so partial JSON works.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GallerySettings {
    /// Item collection loaded at start-up, relative to the asset folder.
    pub items_path: Option<String>,
    /// Folder inside the asset directory that relative image URLs resolve
    /// against. HTTP(S) URLs are fetched as given.
    pub asset_root: String,
    /// Precomputed atlas manifest, relative to the asset folder. When set,
    /// no atlas is built at runtime.
    pub precomputed_atlas: Option<String>,
    pub max_sheets: usize,
    pub high_res_cache_capacity: usize,
    /// Neighbours of the active item fetched ahead of time.
    pub prefetch_neighbours: usize,
    pub fetch_attempts: u32,
    pub fetch_backoff_ms: u64,
}

impl Default for GallerySettings {
    fn default() -> Self {
        Self {
            items_path: Some("gallery/items.json".to_string()),
            asset_root: String::new(),
            precomputed_atlas: None,
            max_sheets: MAX_SHEETS,
            high_res_cache_capacity: HIGH_RES_CACHE_CAPACITY,
            prefetch_neighbours: 2,
            fetch_attempts: FETCH_ATTEMPTS,
            fetch_backoff_ms: FETCH_BACKOFF_MS,
        }
    }
}

impl GallerySettings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.fetch_attempts.max(1),
            backoff: Duration::from_millis(self.fetch_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = GallerySettings::from_json(r#"{ "precomputed_atlas": "atlas/atlas_manifest.json" }"#).unwrap();
        assert_eq!(settings.precomputed_atlas.as_deref(), Some("atlas/atlas_manifest.json"));
        assert_eq!(settings.max_sheets, MAX_SHEETS);
        assert_eq!(settings.items_path, GallerySettings::default().items_path);
    }

    #[test]
    fn retry_policy_always_allows_one_attempt() {
        let settings = GallerySettings {
            fetch_attempts: 0,
            ..default()
        };
        assert_eq!(settings.retry_policy().attempts, 1);
    }
}
