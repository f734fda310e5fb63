use crate::engine::assets::gallery_items::GalleryItems;
use crate::engine::atlas::atlas_manager::AtlasManager;
use crate::engine::atlas::atlas_tasks::pixels_to_image;
use crate::engine::atlas::image_fetch::{FetchResult, ImageFetcher, PendingImage};
use crate::engine::core::settings::GallerySettings;
use crate::engine::events::ActiveItemSettled;
use crate::engine::layout::sphere_layout::SphereState;
use bevy::prelude::*;
use std::collections::{HashMap, VecDeque};
use tile_atlas::{Fit, RgbaPixels};

/// Least-recently-activated cache keyed by item id.
#[derive(Debug, Clone)]
pub struct TextureLru<H> {
    capacity: usize,
    // Front is least recently used.
    entries: VecDeque<(u64, H)>,
}

impl<H> TextureLru<H> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    pub fn peek(&self, id: u64) -> Option<&H> {
        self.entries.iter().find(|(entry, _)| *entry == id).map(|(_, h)| h)
    }

    /// Marks `id` as most recently used.
    pub fn touch(&mut self, id: u64) -> Option<&H> {
        let position = self.entries.iter().position(|(entry, _)| *entry == id)?;
        let entry = self.entries.remove(position)?;
        self.entries.push_back(entry);
        self.entries.back().map(|(_, h)| h)
    }

    /// Inserts as most recent and returns whatever was pushed out.
    pub fn insert(&mut self, id: u64, value: H) -> Vec<H> {
        self.insert_pinned(id, value, None)
    }

    /// Like `insert`, but `pinned` is never the entry pushed out.
    pub fn insert_pinned(&mut self, id: u64, value: H, pinned: Option<u64>) -> Vec<H> {
        let mut evicted = Vec::new();
        if let Some(position) = self.entries.iter().position(|(entry, _)| *entry == id) {
            if let Some((_, old)) = self.entries.remove(position) {
                evicted.push(old);
            }
        }
        self.entries.push_back((id, value));
        while self.entries.len() > self.capacity {
            let Some(position) = self.entries.iter().position(|(entry, _)| Some(*entry) != pinned) else {
                break;
            };
            if let Some((_, old)) = self.entries.remove(position) {
                evicted.push(old);
            }
        }
        evicted
    }

    /// Drops every entry whose id fails `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(u64) -> bool) -> Vec<H> {
        let (kept, removed): (VecDeque<_>, VecDeque<_>) =
            self.entries.drain(..).partition(|(id, _)| keep(*id));
        self.entries = kept;
        removed.into_iter().map(|(_, h)| h).collect()
    }
}

/// Full-resolution textures for the active item and its prefetched neighbours.
#[derive(Resource)]
pub struct HighResCache {
    textures: TextureLru<Handle<Image>>,
    pending: HashMap<u64, PendingImage>,
    active: Option<u64>,
}

impl Default for HighResCache {
    fn default() -> Self {
        Self::new(constants::texture::HIGH_RES_CACHE_CAPACITY)
    }
}

impl HighResCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            textures: TextureLru::new(capacity),
            pending: HashMap::new(),
            active: None,
        }
    }

    /// Item whose overlay texture is ready to bind.
    pub fn overlay(&self) -> Option<(u64, &Handle<Image>)> {
        let id = self.active?;
        self.textures.peek(id).map(|handle| (id, handle))
    }

    pub fn active(&self) -> Option<u64> {
        self.active
    }

    pub fn cached(&self) -> usize {
        self.textures.len()
    }

    /// Activates `id`; returns true when its texture still has to be fetched.
    fn activate(&mut self, id: u64) -> bool {
        self.active = Some(id);
        self.textures.touch(id).is_none() && !self.pending.contains_key(&id)
    }

    fn wants(&self, id: u64) -> bool {
        !self.textures.contains(id) && !self.pending.contains_key(&id)
    }

    /// Forgets ids that left the item array, returning handles to free.
    pub fn retain_present(&mut self, items: &GalleryItems) -> Vec<Handle<Image>> {
        self.pending.retain(|id, _| items.contains_id(*id));
        if self.active.is_some_and(|id| !items.contains_id(id)) {
            self.active = None;
        }
        self.textures.retain(|id| items.contains_id(id))
    }

    /// Caches a finished fetch, keeping the active texture over any other.
    /// Results for ids no longer in the array are discarded. Returns handles
    /// to free.
    pub fn accept(
        &mut self,
        id: u64,
        result: FetchResult,
        items: &GalleryItems,
        upload: impl FnOnce(RgbaPixels) -> Handle<Image>,
    ) -> Vec<Handle<Image>> {
        if !items.contains_id(id) {
            debug!("discarding full resolution image for removed item {id}");
            return Vec::new();
        }
        match result {
            Ok(pixels) => self.textures.insert_pinned(id, upload(pixels), self.active),
            Err(err) => {
                warn!("full resolution image for item {id} unavailable: {err}");
                Vec::new()
            }
        }
    }
}

/// Starts full-resolution fetches for a settled item and its nearest neighbours.
pub fn request_high_res(
    mut settled: EventReader<ActiveItemSettled>,
    mut cache: ResMut<HighResCache>,
    items: Res<GalleryItems>,
    sphere: Res<SphereState>,
    settings: Res<GallerySettings>,
    fetcher: Res<ImageFetcher>,
    asset_server: Res<AssetServer>,
    atlas: Res<AtlasManager>,
) {
    let Some(event) = settled.read().last() else {
        return;
    };
    let fit = Fit::Within(atlas.limits().max_texture_dimension);

    if cache.activate(event.item.id) {
        debug!("fetching full resolution image for item {}", event.item.id);
        let pending = fetcher.start(event.item.high_res_url(), fit, &asset_server);
        cache.pending.insert(event.item.id, pending);
    }

    for slot in sphere.nearest_slots(event.index, settings.prefetch_neighbours) {
        let Some((_, neighbour)) = items.item_for_slot(slot) else {
            continue;
        };
        if cache.wants(neighbour.id) {
            let pending = fetcher.start(neighbour.high_res_url(), fit, &asset_server);
            cache.pending.insert(neighbour.id, pending);
        }
    }
}

/// Moves finished fetches into the cache.
pub fn poll_high_res(
    mut cache: ResMut<HighResCache>,
    mut images: ResMut<Assets<Image>>,
    items: Res<GalleryItems>,
    asset_server: Res<AssetServer>,
) {
    let mut finished = Vec::new();
    cache.pending.retain(|id, pending| match pending.poll(&asset_server, &images) {
        Some(result) => {
            finished.push((*id, result));
            false
        }
        None => true,
    });

    for (id, result) in finished {
        for evicted in cache.accept(id, result, &items, |pixels| images.add(pixels_to_image(pixels))) {
            images.remove(&evicted);
        }
    }
}

/// Frees textures of items that left the array.
pub fn prune_high_res(mut cache: ResMut<HighResCache>, mut images: ResMut<Assets<Image>>, items: Res<GalleryItems>) {
    if !items.is_changed() {
        return;
    }
    for handle in cache.retain_present(&items) {
        images.remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assets::gallery_items::fixtures::items;

    #[test]
    fn least_recently_activated_entry_is_evicted() {
        let mut lru = TextureLru::new(2);
        assert!(lru.insert(1, "a").is_empty());
        assert!(lru.insert(2, "b").is_empty());
        lru.touch(1);
        assert_eq!(lru.insert(3, "c"), vec!["b"]);
        assert!(lru.contains(1) && lru.contains(3));
    }

    #[test]
    fn reinserting_an_id_returns_the_old_value() {
        let mut lru = TextureLru::new(4);
        lru.insert(7, 1);
        assert_eq!(lru.insert(7, 2), vec![1]);
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.peek(7), Some(&2));
    }

    #[test]
    fn cache_never_exceeds_its_capacity() {
        let mut lru = TextureLru::new(16);
        let mut evicted = 0;
        for id in 0..40 {
            evicted += lru.insert(id, id).len();
        }
        assert_eq!(lru.len(), 16);
        assert_eq!(evicted, 24);
        assert!(lru.contains(39) && !lru.contains(23));
    }

    #[test]
    fn ids_that_leave_the_array_are_dropped() {
        let mut cache = HighResCache::new(4);
        for id in 0..4 {
            cache.textures.insert(id, Handle::weak_from_u128(id as u128 + 1));
        }
        cache.active = Some(3);

        let mut gallery = GalleryItems::default();
        gallery.replace(items(2));
        let freed = cache.retain_present(&gallery);

        assert_eq!(freed.len(), 2);
        assert_eq!(cache.active(), None);
        assert!(cache.overlay().is_none());
        assert_eq!(cache.cached(), 2);
    }

    #[test]
    fn overlay_waits_for_the_active_texture() {
        let mut cache = HighResCache::new(4);
        assert!(cache.activate(5));
        assert!(cache.overlay().is_none());
        cache.textures.insert(5, Handle::weak_from_u128(6));
        assert_eq!(cache.overlay().map(|(id, _)| id), Some(5));
        assert!(!cache.activate(5));
    }

    fn pixels() -> FetchResult {
        Ok(RgbaPixels {
            width: 1,
            height: 1,
            data: vec![0, 0, 0, 255],
        })
    }

    #[test]
    fn results_for_removed_items_are_discarded() {
        let mut cache = HighResCache::new(4);
        let mut gallery = GalleryItems::default();
        gallery.replace(items(3));

        let mut uploads = 0;
        cache.accept(7, pixels(), &gallery, |_| {
            uploads += 1;
            Handle::weak_from_u128(8)
        });
        assert_eq!(uploads, 0);
        assert_eq!(cache.cached(), 0);

        cache.accept(2, pixels(), &gallery, |_| Handle::weak_from_u128(3));
        assert_eq!(cache.cached(), 1);
    }

    #[test]
    fn late_prefetch_never_evicts_the_active_texture() {
        let mut gallery = GalleryItems::default();
        gallery.replace(items(4));

        for capacity in [1, 2] {
            let mut cache = HighResCache::new(capacity);
            cache.activate(0);
            cache.accept(0, pixels(), &gallery, |_| Handle::weak_from_u128(1));
            let mut freed = Vec::new();
            for neighbour in 1..4 {
                freed.extend(cache.accept(neighbour, pixels(), &gallery, |_| {
                    Handle::weak_from_u128(neighbour as u128 + 1)
                }));
            }

            assert_eq!(cache.overlay().map(|(id, _)| id), Some(0));
            assert_eq!(cache.cached(), capacity);
            assert!(!freed.contains(&Handle::weak_from_u128(1)));
        }
    }

    #[test]
    fn fetches_for_removed_items_never_reach_the_cache() {
        use crate::engine::core::app_setup::headless_app;
        use crate::engine::events::SetGalleryItems;
        use std::sync::Mutex;
        use std::sync::mpsc;

        let mut app = headless_app();
        app.world_mut().send_event(SetGalleryItems(items(753)));
        app.update();

        let mut replies = Vec::new();
        {
            let mut cache = app.world_mut().resource_mut::<HighResCache>();
            for id in [700, 2] {
                let (reply, receiver) = mpsc::channel();
                replies.push(reply);
                cache.pending.insert(
                    id,
                    PendingImage::Remote {
                        url: format!("https://example.com/{id}.jpg"),
                        reply: Mutex::new(receiver),
                    },
                );
            }
        }

        app.world_mut().send_event(SetGalleryItems(items(4)));
        for reply in &replies {
            let _ = reply.send(pixels());
        }
        app.update();

        let cache = app.world().resource::<HighResCache>();
        assert!(!cache.pending.contains_key(&700) && !cache.pending.contains_key(&2));
        assert!(cache.textures.contains(2));
        assert!(!cache.textures.contains(700));
    }

    #[test]
    fn pinned_entry_survives_overflow() {
        let mut lru = TextureLru::new(1);
        lru.insert(1, "active");
        assert_eq!(lru.insert_pinned(2, "late", Some(1)), vec!["late"]);
        assert_eq!(lru.peek(1), Some(&"active"));
    }
}
