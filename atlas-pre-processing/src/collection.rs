use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tile_atlas::ThumbnailRequest;

/// The subset of an item record the packer needs. Other fields are ignored.
#[derive(Debug, Clone, Deserialize)]
struct ThumbnailEntry {
    id: u64,
    #[serde(rename = "thumbnailURL", alias = "thumbnail_url")]
    thumbnail_url: String,
}

#[derive(Debug, Deserialize)]
struct ItemCollection {
    items: Vec<ThumbnailEntry>,
}

pub fn parse_collection(json: &str) -> Result<Vec<ThumbnailRequest>> {
    let collection: ItemCollection = serde_json::from_str(json)?;
    Ok(collection
        .items
        .into_iter()
        .map(|entry| ThumbnailRequest {
            id: entry.id,
            url: entry.thumbnail_url,
        })
        .collect())
}

pub fn read_collection(path: &Path) -> Result<Vec<ThumbnailRequest>> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_collection(&json).with_context(|| format!("parsing item collection {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_snake_case_field_names_are_accepted() {
        let json = r#"{ "items": [
            { "id": 3, "thumbnailURL": "t/3.jpg", "title": "Three", "actionLink": "x" },
            { "id": 8, "thumbnail_url": "t/8.jpg" }
        ] }"#;
        let requests = parse_collection(json).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, "t/3.jpg");
        assert_eq!(requests[1].id, 8);
    }

    #[test]
    fn items_without_a_thumbnail_are_rejected() {
        assert!(parse_collection(r#"{ "items": [ { "id": 1 } ] }"#).is_err());
    }
}
