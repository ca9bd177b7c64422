//! Short-lived in-memory caches owned by the server process.
//!
//! Reads and writes are not transactional: two requests racing on a stale
//! entry both go upstream and the last write wins.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::RwLock;

use crate::models::VideoSummary;

pub const EMBED_PARAMS_TTL: Duration = Duration::from_secs(300);
pub const TRENDING_TTL: Duration = Duration::from_secs(300);
pub const THUMBNAIL_TTL: Duration = Duration::from_secs(3600);
pub const THUMBNAIL_CAPACITY: usize = 500;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A relayed thumbnail and the content type its host served it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A single cached value with a freshness window.
pub struct TtlSlot<T> {
    ttl: Duration,
    entry: RwLock<Option<(T, Instant)>>,
}

impl<T: Clone> TtlSlot<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    pub fn get(&self, now: Instant) -> Option<T> {
        let guard = self.entry.read();
        match guard.as_ref() {
            Some((value, stored)) if now.saturating_duration_since(*stored) < self.ttl => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    pub fn set(&self, value: T, now: Instant) {
        *self.entry.write() = Some((value, now));
    }
}

/// Thumbnails keyed by video id. At capacity, inserting a new id evicts
/// the entry with the oldest timestamp.
pub struct ThumbnailCache {
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<String, (Arc<ThumbnailImage>, Instant)>>,
}

impl ThumbnailCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, video_id: &str, now: Instant) -> Option<Arc<ThumbnailImage>> {
        let entries = self.entries.read();
        let (image, stored) = entries.get(video_id)?;
        (now.saturating_duration_since(*stored) < self.ttl).then(|| image.clone())
    }

    pub fn insert(&self, video_id: &str, image: Arc<ThumbnailImage>, now: Instant) {
        let mut entries = self.entries.write();
        if !entries.contains_key(video_id) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (_, stored))| *stored)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(video_id.to_string(), (image, now));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.entries.read().contains_key(video_id)
    }
}

/// The three caches the aggregation layer consults, sharing one clock.
pub struct CacheStore {
    clock: Arc<dyn Clock>,
    embed_params: TtlSlot<String>,
    trending: TtlSlot<Vec<VideoSummary>>,
    thumbnails: ThumbnailCache,
}

impl CacheStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            embed_params: TtlSlot::new(EMBED_PARAMS_TTL),
            trending: TtlSlot::new(TRENDING_TTL),
            thumbnails: ThumbnailCache::new(THUMBNAIL_TTL, THUMBNAIL_CAPACITY),
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn embed_params(&self) -> Option<String> {
        self.embed_params.get(self.clock.now())
    }

    pub fn store_embed_params(&self, params: String) {
        self.embed_params.set(params, self.clock.now());
    }

    pub fn trending(&self) -> Option<Vec<VideoSummary>> {
        self.trending.get(self.clock.now())
    }

    pub fn store_trending(&self, videos: Vec<VideoSummary>) {
        self.trending.set(videos, self.clock.now());
    }

    pub fn thumbnail(&self, video_id: &str) -> Option<Arc<ThumbnailImage>> {
        self.thumbnails.get(video_id, self.clock.now())
    }

    pub fn store_thumbnail(&self, video_id: &str, image: Arc<ThumbnailImage>) {
        self.thumbnails.insert(video_id, image, self.clock.now());
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;

    fn image(bytes: &[u8]) -> Arc<ThumbnailImage> {
        Arc::new(ThumbnailImage {
            content_type: "image/jpeg".into(),
            bytes: bytes.to_vec(),
        })
    }

    #[test]
    fn slot_expires_after_ttl() {
        let clock = ManualClock::new();
        let slot = TtlSlot::new(Duration::from_secs(300));
        assert_eq!(slot.get(clock.now()), None);
        slot.set("x".to_string(), clock.now());
        clock.advance(Duration::from_secs(299));
        assert_eq!(slot.get(clock.now()).as_deref(), Some("x"));
        clock.advance(Duration::from_secs(1));
        assert_eq!(slot.get(clock.now()), None);
    }

    #[test]
    fn slot_overwrite_refreshes_timestamp() {
        let clock = ManualClock::new();
        let slot = TtlSlot::new(Duration::from_secs(10));
        slot.set(1, clock.now());
        clock.advance(Duration::from_secs(8));
        slot.set(2, clock.now());
        clock.advance(Duration::from_secs(8));
        assert_eq!(slot.get(clock.now()), Some(2));
    }

    #[test]
    fn thumbnail_eviction_removes_oldest() {
        let clock = ManualClock::new();
        let cache = ThumbnailCache::new(THUMBNAIL_TTL, THUMBNAIL_CAPACITY);
        let bytes = image(&[0u8; 4]);
        cache.insert("v-oldest", bytes.clone(), clock.now());
        for i in 0..THUMBNAIL_CAPACITY - 1 {
            clock.advance(Duration::from_millis(1));
            cache.insert(&format!("v{i}"), bytes.clone(), clock.now());
        }
        assert_eq!(cache.len(), THUMBNAIL_CAPACITY);

        clock.advance(Duration::from_millis(1));
        cache.insert("v-new", bytes.clone(), clock.now());
        assert_eq!(cache.len(), THUMBNAIL_CAPACITY);
        assert!(!cache.contains("v-oldest"));
        assert!(cache.contains("v0"));
        assert!(cache.contains("v-new"));
    }

    #[test]
    fn thumbnail_reinsert_does_not_evict() {
        let clock = ManualClock::new();
        let cache = ThumbnailCache::new(THUMBNAIL_TTL, 2);
        cache.insert("a", image(&[1]), clock.now());
        cache.insert("b", image(&[2]), clock.now());
        cache.insert("a", image(&[3]), clock.now());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a", clock.now()).unwrap().bytes, vec![3]);
    }

    #[test]
    fn thumbnail_entries_go_stale() {
        let clock = ManualClock::new();
        let cache = ThumbnailCache::new(THUMBNAIL_TTL, 10);
        cache.insert("a", image(&[1]), clock.now());
        clock.advance(THUMBNAIL_TTL);
        assert!(cache.get("a", clock.now()).is_none());
    }

    #[test]
    fn store_uses_injected_clock() {
        let clock = Arc::new(ManualClock::new());
        let store = CacheStore::new(clock.clone());
        store.store_embed_params("autoplay=1".into());
        assert_eq!(store.embed_params().as_deref(), Some("autoplay=1"));
        clock.advance(EMBED_PARAMS_TTL);
        assert_eq!(store.embed_params(), None);
    }
}
