use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// One displayable entry, as produced by the host's search and filter layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    #[serde(rename = "thumbnailURL", alias = "thumbnail_url")]
    pub thumbnail_url: String,
    #[serde(rename = "fullResURL", alias = "full_res_url", default, skip_serializing_if = "Option::is_none")]
    pub full_res_url: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "actionLink", alias = "action_link", default, skip_serializing_if = "Option::is_none")]
    pub action_link: Option<String>,
}

impl Item {
    /// Full resolution image, falling back to the thumbnail.
    pub fn high_res_url(&self) -> &str {
        self.full_res_url.as_deref().unwrap_or(&self.thumbnail_url)
    }
}

/// Item collection file loaded through the asset server.
#[derive(Asset, TypePath, Debug, Clone, Serialize, Deserialize)]
pub struct ItemCollection {
    pub items: Vec<Item>,
}

/// Current ordered item array and the generation it was published under.
///
/// Replaced whole on every update; anything positional built from an older
/// generation is stale.
#[derive(Resource, Debug, Clone, Default)]
pub struct GalleryItems {
    generation: u64,
    items: Arc<[Item]>,
    ids: Arc<HashSet<u64>>,
}

impl GalleryItems {
    /// Publishes a new array and returns its generation.
    pub fn replace(&mut self, items: Vec<Item>) -> u64 {
        self.generation += 1;
        self.ids = Arc::new(items.iter().map(|item| item.id).collect());
        self.items = items.into();
        self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn contains_id(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    /// Item shown by layout slot `slot`.
    pub fn item_for_slot(&self, slot: usize) -> Option<(usize, &Item)> {
        if self.items.is_empty() {
            return None;
        }
        let index = slot % self.items.len();
        Some((index, &self.items[index]))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::Item;

    pub fn item(id: u64) -> Item {
        Item {
            id,
            thumbnail_url: format!("thumbs/{id}.jpg"),
            full_res_url: None,
            title: format!("Item {id}"),
            description: String::new(),
            action_link: None,
        }
    }

    pub fn items(count: u64) -> Vec<Item> {
        (0..count).map(item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::item;
    use super::*;

    #[test]
    fn collection_json_uses_host_field_names() {
        let json = r#"{ "items": [
            { "id": 4, "thumbnailURL": "t/4.jpg", "fullResURL": "f/4.jpg", "title": "Four",
              "description": "d", "actionLink": "https://example.com/4" },
            { "id": 5, "thumbnail_url": "t/5.jpg" }
        ] }"#;
        let collection: ItemCollection = serde_json::from_str(json).unwrap();

        assert_eq!(collection.items[0].high_res_url(), "f/4.jpg");
        assert_eq!(collection.items[1].high_res_url(), "t/5.jpg");
        assert_eq!(collection.items[1].title, "");

        let back = serde_json::to_value(&collection.items[0]).unwrap();
        assert_eq!(back["thumbnailURL"], "t/4.jpg");
        assert_eq!(back["actionLink"], "https://example.com/4");
    }

    #[test]
    fn every_replacement_bumps_the_generation() {
        let mut items = GalleryItems::default();
        assert_eq!(items.generation(), 0);
        assert_eq!(items.replace(vec![item(1), item(2)]), 1);
        assert_eq!(items.replace(vec![item(1), item(2)]), 2);
        assert!(items.contains_id(2));
        assert_eq!(items.replace(Vec::new()), 3);
        assert!(!items.contains_id(2));
        assert!(items.item_for_slot(0).is_none());
    }

    #[test]
    fn slots_wrap_around_the_item_array() {
        let mut items = GalleryItems::default();
        items.replace(vec![item(10), item(11), item(12)]);
        assert_eq!(items.item_for_slot(4).map(|(i, item)| (i, item.id)), Some((1, 11)));
    }
}
