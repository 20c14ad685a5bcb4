#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use set_viewer::{FetchBytes, FetchError, ImageDescriptor, SetRef, SetSource, SourceError, ViewItem};

pub fn image(id: &str, folder: &str) -> ImageDescriptor {
    ImageDescriptor::new(id, format!("{id}.jpg"), folder)
}

pub fn view_items(set_id: &str, ids: &[&str]) -> Vec<ViewItem> {
    ids.iter()
        .map(|id| ViewItem::new(image(id, &format!("/{set_id}")), set_id))
        .collect()
}

pub fn ids_of(items: &[ViewItem]) -> Vec<String> {
    items.iter().map(|item| item.id().to_string()).collect()
}

/// In-memory set source with call counters and an optional delay.
#[derive(Default)]
pub struct MockSource {
    sets: Mutex<HashMap<String, (SetRef, Vec<ImageDescriptor>)>>,
    delay: Mutex<Duration>,
    page_size: Mutex<Option<usize>>,
    pub resolve_calls: AtomicUsize,
    pub load_more_calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set(self, set_id: &str, ids: &[&str]) -> Self {
        let images = ids.iter().map(|id| image(id, &format!("/{set_id}"))).collect();
        self.insert_set(set_id, images);
        self
    }

    pub fn with_images(self, set_id: &str, images: Vec<ImageDescriptor>) -> Self {
        self.insert_set(set_id, images);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = delay;
        self
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        *self.page_size.lock() = Some(page_size);
        self
    }

    pub fn insert_set(&self, set_id: &str, images: Vec<ImageDescriptor>) {
        let mut set = SetRef::new(set_id, format!("Set {set_id}"));
        set.image_count = Some(images.len());
        self.sets.lock().insert(set_id.to_string(), (set, images));
    }

    pub fn mark_favorite(&self, set_id: &str, ids: &[&str]) {
        if let Some((set, _)) = self.sets.lock().get_mut(set_id) {
            set.favorite_ids.extend(ids.iter().map(|id| id.to_string()));
        }
    }

    pub fn mark_hidden(&self, set_id: &str, ids: &[&str]) {
        if let Some((set, _)) = self.sets.lock().get_mut(set_id) {
            set.hidden_ids.extend(ids.iter().map(|id| id.to_string()));
        }
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl SetSource for MockSource {
    async fn resolve_set_images(
        &self,
        set_id: &str,
        _build_if_missing: bool,
    ) -> Result<Vec<ImageDescriptor>, SourceError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.sets
            .lock()
            .get(set_id)
            .map(|(_, images)| images.clone())
            .ok_or_else(|| SourceError::UnknownSet(set_id.to_string()))
    }

    async fn load_more(&self, set_id: &str, loaded: usize) -> Result<Vec<ImageDescriptor>, SourceError> {
        self.load_more_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let page_size = self.page_size.lock().unwrap_or(usize::MAX);
        self.sets
            .lock()
            .get(set_id)
            .map(|(_, images)| images.iter().skip(loaded).take(page_size).cloned().collect())
            .ok_or_else(|| SourceError::UnknownSet(set_id.to_string()))
    }

    fn toggle_favorite(&self, set_id: &str, image_id: &str) {
        if let Some((set, _)) = self.sets.lock().get_mut(set_id) {
            if !set.favorite_ids.remove(image_id) {
                set.favorite_ids.insert(image_id.to_string());
            }
        }
    }

    fn toggle_hidden(&self, set_id: &str, image_id: &str) {
        if let Some((set, _)) = self.sets.lock().get_mut(set_id) {
            if !set.hidden_ids.remove(image_id) {
                set.hidden_ids.insert(image_id.to_string());
            }
        }
    }

    fn set_ref(&self, set_id: &str) -> Option<SetRef> {
        self.sets.lock().get(set_id).map(|(set, _)| set.clone())
    }
}

/// Byte fetcher returning the id as payload, with optional latency,
/// rate limiting and missing ids.
#[derive(Default)]
pub struct MockFetcher {
    delay: Mutex<Duration>,
    rate_limited: AtomicU32,
    missing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    pub started: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = delay;
        self
    }

    /// The next `times` fetches answer `RateLimited`.
    pub fn rate_limit(self, times: u32) -> Self {
        self.rate_limited.store(times, Ordering::SeqCst);
        self
    }

    pub fn with_missing(self, id: &str) -> Self {
        self.missing.lock().insert(id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == id).count()
    }
}

impl FetchBytes for MockFetcher {
    async fn fetch_bytes(&self, id: &str) -> Result<Bytes, FetchError> {
        self.calls.lock().push(id.to_string());
        self.started.fetch_add(1, Ordering::SeqCst);

        let limited = self
            .rate_limited
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(FetchError::RateLimited);
        }

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.missing.lock().contains(id) {
            return Err(FetchError::NotFound(id.to_string()));
        }
        Ok(Bytes::copy_from_slice(id.as_bytes()))
    }
}
