//! Bounded media cache with cancellable, deduplicated fetches.
//!
//! - **Resolution**: `begin_resolve` hands out a [`ResolveTicket`] for the image
//!   being shown. Starting a new resolution supersedes the previous one.
//!
//! - **Prefetching**: neighbors of the current index are fetched at low
//!   priority. Moving the window cancels fetches that fell out of it.
//!
//! - **Dedup**: at most one fetch per id is ever in flight; later requests
//!   join it through a `watch` channel.
//!
//! - **Bounded memory**: at most `capacity` resolved handles are kept, evicted
//!   in insertion order.
//!
//! Fetch tasks run on the tokio runtime and write back into the shared state
//! through the cache's own methods only.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use lru::LruCache;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{FetchError, Result, ViewerError};
use crate::model::ImageId;
use crate::source::FetchBytes;

/// Default number of resolved images kept in memory.
pub const DEFAULT_CAPACITY: usize = 20;

/// Images to prefetch in the direction of travel / against it.
pub const PREFETCH_AHEAD: usize = 3;
pub const PREFETCH_BEHIND: usize = 1;

/// Delay before the loading indicator becomes visible.
pub const LOADING_DEBOUNCE: Duration = Duration::from_millis(140);

#[derive(Debug, Clone)]
pub struct MediaCacheConfig {
    pub capacity: usize,
    pub prefetch_ahead: usize,
    pub prefetch_behind: usize,
    /// Retries after a rate-limited fetch.
    pub max_retries: u32,
    /// First retry delay, doubled after each attempt.
    pub initial_backoff: Duration,
    /// Decode bytes into RGBA pixels after fetching.
    pub decode_images: bool,
    pub loading_debounce: Duration,
}

impl Default for MediaCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            prefetch_ahead: PREFETCH_AHEAD,
            prefetch_behind: PREFETCH_BEHIND,
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            decode_images: false,
            loading_debounce: LOADING_DEBOUNCE,
        }
    }
}

/// A resolved image ready for display.
#[derive(Debug, Clone)]
pub struct MediaHandle {
    pub id: ImageId,
    pub bytes: Bytes,
    /// Pixel size probed from the file header, when recognizable.
    pub dimensions: Option<(u32, u32)>,
    /// Decoded RGBA pixels (only with `decode_images`).
    pub pixels: Option<Arc<image::RgbaImage>>,
}

/// Counters for monitoring cache behavior.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MediaStats {
    pub hits: usize,
    pub misses: usize,
    pub fetches: usize,
    pub evictions: usize,
    /// Handles dropped by eviction or `clear()`.
    pub released: usize,
    pub cancelled: usize,
    pub failures: usize,
}

/// Which way the user is moving through the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Indices to prefetch around `index`, nearest first, direction of travel first.
pub fn neighbor_window(index: usize, len: usize, direction: Direction, ahead: usize, behind: usize) -> SmallVec<[usize; 8]> {
    let mut out = SmallVec::new();
    if index >= len {
        return out;
    }

    let forward = |step: usize| index.checked_add(step).filter(|&i| i < len);
    let backward = |step: usize| index.checked_sub(step);

    let (primary, secondary): (&dyn Fn(usize) -> Option<usize>, &dyn Fn(usize) -> Option<usize>) = match direction {
        Direction::Forward => (&forward, &backward),
        Direction::Backward => (&backward, &forward),
    };
    for step in 1..=ahead {
        if let Some(i) = primary(step) {
            out.push(i);
        }
    }
    for step in 1..=behind {
        if let Some(i) = secondary(step) {
            out.push(i);
        }
    }
    out
}

type Shared = Option<Result<MediaHandle>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Current,
    Prefetch,
}

struct InFlight {
    token: CancellationToken,
    rx: watch::Receiver<Shared>,
    kind: FetchKind,
    serial: u64,
}

struct CurrentResolution {
    id: ImageId,
    token: CancellationToken,
}

struct CacheState {
    entries: LruCache<ImageId, MediaHandle>,
    in_flight: HashMap<ImageId, InFlight>,
    current: Option<CurrentResolution>,
    prefetch_window: HashSet<ImageId>,
    next_serial: u64,
    stats: MediaStats,
}

impl CacheState {
    /// Insert without touching recency of other entries, so eviction follows
    /// insertion order.
    fn insert(&mut self, handle: MediaHandle) {
        if self.entries.contains(&handle.id) {
            return;
        }
        if let Some((evicted, _)) = self.entries.push(handle.id.clone(), handle) {
            trace!("Evicted {} from media cache", evicted);
            self.stats.evictions += 1;
            self.stats.released += 1;
        }
    }

    fn cancel_in_flight(&mut self, id: &str) {
        if let Some(flight) = self.in_flight.remove(id) {
            flight.token.cancel();
        }
    }
}

/// A pending (or already satisfied) resolution of one image.
pub struct ResolveTicket {
    id: ImageId,
    inner: TicketInner,
}

enum TicketInner {
    Ready(MediaHandle),
    Pending {
        rx: watch::Receiver<Shared>,
        token: CancellationToken,
    },
}

impl ResolveTicket {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the image was already cached when the ticket was issued.
    pub fn is_ready(&self) -> bool {
        matches!(self.inner, TicketInner::Ready(_))
    }

    pub fn ready(&self) -> Option<&MediaHandle> {
        match &self.inner {
            TicketInner::Ready(handle) => Some(handle),
            TicketInner::Pending { .. } => None,
        }
    }

    /// Wait for the image. Returns `Cancelled` if superseded first.
    pub async fn wait(self) -> Result<MediaHandle> {
        match self.inner {
            TicketInner::Ready(handle) => Ok(handle),
            TicketInner::Pending { mut rx, token } => {
                tokio::select! {
                    _ = token.cancelled() => Err(ViewerError::Cancelled),
                    shared = rx.wait_for(Option::is_some) => match shared {
                        Ok(value) => (*value).clone().unwrap_or(Err(ViewerError::Cancelled)),
                        // Task dropped without reporting.
                        Err(_) => Err(ViewerError::Cancelled),
                    },
                }
            }
        }
    }
}

/// Media cache over a [`FetchBytes`] backend.
pub struct MediaCache<F: FetchBytes> {
    fetcher: Arc<F>,
    config: MediaCacheConfig,
    state: Arc<Mutex<CacheState>>,
    runtime: Handle,
}

impl<F: FetchBytes> MediaCache<F> {
    pub fn new(fetcher: Arc<F>, config: MediaCacheConfig, runtime: Handle) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        let state = CacheState {
            entries: LruCache::new(capacity),
            in_flight: HashMap::new(),
            current: None,
            prefetch_window: HashSet::new(),
            next_serial: 0,
            stats: MediaStats::default(),
        };
        Self {
            fetcher,
            config,
            state: Arc::new(Mutex::new(state)),
            runtime,
        }
    }

    pub fn config(&self) -> &MediaCacheConfig {
        &self.config
    }

    /// Start resolving `id` as the image being shown.
    pub fn begin_resolve(&self, id: &str) -> ResolveTicket {
        let mut st = self.state.lock();
        self.resolve_locked(&mut st, id)
    }

    /// Show `id` with `window` as its neighbors. A prefetch already running
    /// for `id` is joined before the window moves, so it is never restarted.
    pub fn focus(&self, id: &str, window: &[ImageId]) -> ResolveTicket {
        let mut st = self.state.lock();
        st.prefetch_window = window.iter().cloned().collect();
        let ticket = self.resolve_locked(&mut st, id);
        self.prefetch_locked(&mut st, window);
        ticket
    }

    fn resolve_locked(&self, st: &mut CacheState, id: &str) -> ResolveTicket {
        if let Some(previous) = st.current.take() {
            previous.token.cancel();
            if previous.id != id {
                let keep = st.prefetch_window.contains(previous.id.as_str());
                let superseded = st
                    .in_flight
                    .get(previous.id.as_str())
                    .is_some_and(|f| f.kind == FetchKind::Current);
                if superseded {
                    if keep {
                        if let Some(flight) = st.in_flight.get_mut(previous.id.as_str()) {
                            flight.kind = FetchKind::Prefetch;
                        }
                    } else {
                        debug!("Cancelling superseded fetch for {}", previous.id);
                        st.cancel_in_flight(&previous.id);
                    }
                }
            }
        }

        if let Some(handle) = st.entries.peek(id).cloned() {
            st.stats.hits += 1;
            st.current = Some(CurrentResolution {
                id: id.to_string(),
                token: CancellationToken::new(),
            });
            return ResolveTicket {
                id: id.to_string(),
                inner: TicketInner::Ready(handle),
            };
        }

        st.stats.misses += 1;
        let joined = st.in_flight.get_mut(id).map(|flight| {
            flight.kind = FetchKind::Current;
            flight.rx.clone()
        });
        let rx = match joined {
            Some(rx) => rx,
            None => self.spawn_fetch(st, id, FetchKind::Current),
        };

        let token = CancellationToken::new();
        st.current = Some(CurrentResolution {
            id: id.to_string(),
            token: token.clone(),
        });
        ResolveTicket {
            id: id.to_string(),
            inner: TicketInner::Pending { rx, token },
        }
    }

    pub async fn resolve(&self, id: &str) -> Result<MediaHandle> {
        self.begin_resolve(id).wait().await
    }

    /// Move the prefetch window to `ids`. Prefetches outside it are cancelled;
    /// cached and in-flight ids are skipped.
    pub fn prefetch(&self, ids: &[ImageId]) {
        let mut st = self.state.lock();
        self.prefetch_locked(&mut st, ids);
    }

    fn prefetch_locked(&self, st: &mut CacheState, ids: &[ImageId]) {
        let window: HashSet<ImageId> = ids.iter().cloned().collect();

        let stale: Vec<ImageId> = st
            .in_flight
            .iter()
            .filter(|(id, flight)| flight.kind == FetchKind::Prefetch && !window.contains(id.as_str()))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            trace!("Prefetch of {} left the window", id);
            st.cancel_in_flight(&id);
        }

        for id in ids {
            if st.entries.contains(id) || st.in_flight.contains_key(id.as_str()) {
                continue;
            }
            self.spawn_fetch(st, id, FetchKind::Prefetch);
        }
        st.prefetch_window = window;
    }

    /// Cancel every fetch and the current resolution. Cached handles stay.
    pub fn cancel_all(&self) {
        let mut st = self.state.lock();
        for (_, flight) in st.in_flight.drain() {
            flight.token.cancel();
        }
        if let Some(current) = st.current.take() {
            current.token.cancel();
        }
        st.prefetch_window.clear();
    }

    /// Cancel everything and release all cached handles.
    pub fn clear(&self) {
        self.cancel_all();
        let mut st = self.state.lock();
        let released = st.entries.len();
        st.entries.clear();
        st.stats.released += released;
        debug!("Media cache cleared ({} handles released)", released);
    }

    pub fn get(&self, id: &str) -> Option<MediaHandle> {
        self.state.lock().entries.peek(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().entries.contains(id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached ids, oldest insertion first.
    pub fn cached_ids(&self) -> Vec<ImageId> {
        self.state.lock().entries.iter().rev().map(|(id, _)| id.clone()).collect()
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.state.lock().in_flight.contains_key(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn stats(&self) -> MediaStats {
        self.state.lock().stats
    }

    fn spawn_fetch(&self, st: &mut CacheState, id: &str, kind: FetchKind) -> watch::Receiver<Shared> {
        let (tx, rx) = watch::channel(None);
        let token = CancellationToken::new();
        st.next_serial += 1;
        let serial = st.next_serial;
        st.stats.fetches += 1;
        st.in_flight.insert(
            id.to_string(),
            InFlight {
                token: token.clone(),
                rx: rx.clone(),
                kind,
                serial,
            },
        );

        let task = FetchTask {
            fetcher: Arc::clone(&self.fetcher),
            state: Arc::clone(&self.state),
            config: self.config.clone(),
            id: id.to_string(),
            token,
            serial,
            deferred: kind == FetchKind::Prefetch,
        };
        self.runtime.spawn(async move {
            let result = task.run().await;
            tx.send_replace(Some(result));
        });
        rx
    }
}

impl<F: FetchBytes> Drop for MediaCache<F> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

struct FetchTask<F> {
    fetcher: Arc<F>,
    state: Arc<Mutex<CacheState>>,
    config: MediaCacheConfig,
    id: ImageId,
    token: CancellationToken,
    serial: u64,
    deferred: bool,
}

impl<F: FetchBytes> FetchTask<F> {
    async fn run(self) -> Result<MediaHandle> {
        if self.deferred {
            // Let the current image's fetch go first.
            tokio::task::yield_now().await;
        }

        let result = tokio::select! {
            _ = self.token.cancelled() => Err(ViewerError::Cancelled),
            fetched = self.fetch_and_build() => fetched,
        };

        let mut st = self.state.lock();
        if st.in_flight.get(self.id.as_str()).is_some_and(|f| f.serial == self.serial) {
            st.in_flight.remove(self.id.as_str());
        }
        match &result {
            Ok(handle) if !self.token.is_cancelled() => st.insert(handle.clone()),
            Ok(_) | Err(ViewerError::Cancelled) => st.stats.cancelled += 1,
            Err(e) => {
                st.stats.failures += 1;
                warn!("Media fetch failed: {}", e);
            }
        }
        drop(st);

        if self.token.is_cancelled() {
            return Err(ViewerError::Cancelled);
        }
        result
    }

    async fn fetch_and_build(&self) -> Result<MediaHandle> {
        let bytes = fetch_with_retry(self.fetcher.as_ref(), &self.id, &self.config).await?;
        if self.config.decode_images {
            let id = self.id.clone();
            tokio::task::spawn_blocking(move || build_handle(id, bytes, true))
                .await
                .map_err(|e| ViewerError::Decode {
                    id: self.id.clone(),
                    reason: e.to_string(),
                })?
        } else {
            build_handle(self.id.clone(), bytes, false)
        }
    }
}

/// Fetch with exponential backoff on rate limiting.
async fn fetch_with_retry<F: FetchBytes>(fetcher: &F, id: &str, config: &MediaCacheConfig) -> Result<Bytes> {
    let mut delay = config.initial_backoff;
    let mut attempt: u32 = 0;
    let started = Instant::now();

    loop {
        match fetcher.fetch_bytes(id).await {
            Ok(bytes) => {
                trace!("Fetched {} ({} bytes) in {:?}", id, bytes.len(), started.elapsed());
                return Ok(bytes);
            }
            Err(FetchError::RateLimited) if attempt < config.max_retries => {
                attempt += 1;
                debug!(
                    "Rate limited fetching {} (retry {}/{}), waiting {:?}",
                    id, attempt, config.max_retries, delay
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(source) => {
                return Err(ViewerError::FetchFailure {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }
}

fn build_handle(id: ImageId, bytes: Bytes, decode: bool) -> Result<MediaHandle> {
    let dimensions = imagesize::blob_size(&bytes)
        .ok()
        .map(|size| (size.width as u32, size.height as u32));

    let pixels = if decode {
        let decoded = image::load_from_memory(&bytes).map_err(|e| ViewerError::Decode {
            id: id.clone(),
            reason: e.to_string(),
        })?;
        Some(Arc::new(decoded.to_rgba8()))
    } else {
        None
    };

    Ok(MediaHandle {
        id,
        bytes,
        dimensions,
        pixels,
    })
}

/// Loading flag that only turns visible once a resolution has been pending
/// longer than the debounce, so cache hits never flash a spinner.
#[derive(Debug, Clone)]
pub struct LoadingIndicator {
    debounce: Duration,
    pending_since: Option<Instant>,
}

impl LoadingIndicator {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending_since: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.pending_since = Some(now);
    }

    pub fn finish(&mut self) {
        self.pending_since = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        self.pending_since
            .is_some_and(|since| now.saturating_duration_since(since) >= self.debounce)
    }
}

impl Default for LoadingIndicator {
    fn default() -> Self {
        Self::new(LOADING_DEBOUNCE)
    }
}
