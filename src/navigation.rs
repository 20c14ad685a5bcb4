//! Which collection is open, where the cursor is, and what comes next.
//!
//! The controller is the single owner of the view context, the history
//! entry and the sampling registries. Anything that needs the set source
//! runs as a tokio task; its result comes back over a channel and is applied
//! by [`NavigationController::poll_completions`] or
//! [`NavigationController::wait_pending`]. Every dispatch bumps a generation
//! counter, so results for a context that has since been replaced are
//! dropped on arrival.

use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashSet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Result, SourceError, ViewerError};
use crate::model::{
    ContextKind, HistoryEntry, ImageDescriptor, ImageId, KindTag, Membership, SetId, SetOrder, SetRef, SortMode,
    SortSettings, ViewContext, ViewItem,
};
use crate::sampling::{
    chronological_order, pick_next_batch, pick_slideshow_batch, seeded_shuffle, LastPick, OrderedListCache,
    SeenRegistry, SlideshowWeights,
};
use crate::source::SetSource;

/// Repeated next/previous calls closer together than this are ignored.
pub const NAVIGATION_THROTTLE: Duration = Duration::from_millis(50);
pub const DEFAULT_BATCH_SIZE: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationConfig {
    /// Images appended when the end of a sampled or paginated context is reached.
    pub batch_size: usize,
    pub throttle: Duration,
    pub weights: SlideshowWeights,
    pub sort: SortSettings,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            throttle: NAVIGATION_THROTTLE,
            weights: SlideshowWeights::default(),
            sort: SortSettings::default(),
        }
    }
}

/// Immediate result of a navigation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    /// The cursor moved to this index.
    Moved(usize),
    /// Work was dispatched; its result arrives as a [`NavEvent`].
    Pending,
    Throttled,
    /// Another append or peek is still in flight.
    Ignored,
}

/// Result of dispatched work, applied on the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEvent {
    /// A context built by [`NavigationController::open_view`] is now current.
    Opened(usize),
    /// Items were appended and the cursor moved onto the first of them.
    Moved(usize),
    /// A chronological peek replaced the context; the previous one is in history.
    Peeked(usize),
    /// Nothing could be appended.
    Exhausted,
    Failed(ViewerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counts {
    pub total: usize,
    pub favorites: usize,
    pub nonfavorites: usize,
    pub hidden: usize,
}

enum PendingOp {
    Append,
    Peek { image_id: ImageId, set_id: SetId },
    Open { kind: ContextKind, label: Option<String> },
}

struct Pending {
    generation: u64,
    op: PendingOp,
    task: JoinHandle<()>,
}

enum Request {
    Set { set_id: SetId },
    More { set_id: SetId, loaded: usize },
    Sets { set_ids: Vec<SetId> },
}

enum Fetched {
    /// The full listing of one set.
    Images { set_id: SetId, images: Vec<ImageDescriptor> },
    /// The next page of a set's listing.
    Page { set_id: SetId, images: Vec<ImageDescriptor> },
    /// Non-hidden images of several sets.
    Pool(Vec<ViewItem>),
}

struct Completion {
    generation: u64,
    result: std::result::Result<Fetched, SourceError>,
}

async fn run_request<S: SetSource>(source: Arc<S>, request: Request) -> std::result::Result<Fetched, SourceError> {
    match request {
        Request::Set { set_id } => {
            let images = source.resolve_set_images(&set_id, true).await?;
            Ok(Fetched::Images { set_id, images })
        }
        Request::More { set_id, loaded } => {
            let images = source.load_more(&set_id, loaded).await?;
            Ok(Fetched::Page { set_id, images })
        }
        Request::Sets { set_ids } => {
            let mut pool = Vec::new();
            let mut last_error = None;
            for set_id in set_ids {
                match source.resolve_set_images(&set_id, true).await {
                    Ok(images) => {
                        let set = source.set_ref(&set_id);
                        pool.extend(
                            images
                                .into_iter()
                                .filter(|image| !set.as_ref().is_some_and(|s| s.is_hidden(&image.id)))
                                .map(|image| ViewItem::new(image, set_id.clone())),
                        );
                    }
                    Err(e) => {
                        warn!("Skipping set {} in slideshow: {}", set_id, e);
                        last_error = Some(e);
                    }
                }
            }
            match last_error {
                Some(e) if pool.is_empty() => Err(e),
                _ => Ok(Fetched::Pool(pool)),
            }
        }
    }
}

fn membership_of(kind: &ContextKind) -> Option<Membership> {
    match kind {
        ContextKind::Favorites => Some(Membership::Favorite),
        ContextKind::NonFavorites => Some(Membership::NonFavorite),
        ContextKind::Hidden => Some(Membership::Hidden),
        _ => None,
    }
}

pub struct NavigationController<S: SetSource> {
    source: Arc<S>,
    config: NavigationConfig,
    runtime: Handle,
    context: Option<ViewContext>,
    history: Option<HistoryEntry>,
    pending: Option<Pending>,
    generation: u64,
    last_navigation: Option<Instant>,
    seen: SeenRegistry,
    ordered: OrderedListCache,
    last_pick: Option<LastPick>,
    rng: StdRng,
    active_set: Option<SetId>,
    sort: SortSettings,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl<S: SetSource> NavigationController<S> {
    pub fn new(source: Arc<S>, config: NavigationConfig, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let sort = config.sort.clone();
        Self {
            source,
            config,
            runtime,
            context: None,
            history: None,
            pending: None,
            generation: 0,
            last_navigation: None,
            seen: SeenRegistry::new(),
            ordered: OrderedListCache::new(),
            last_pick: None,
            rng: StdRng::from_entropy(),
            active_set: None,
            sort,
            tx,
            rx,
        }
    }

    /// Use a fixed random seed for batch picks.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn context(&self) -> Option<&ViewContext> {
        self.context.as_ref()
    }

    pub fn history(&self) -> Option<&HistoryEntry> {
        self.history.as_ref()
    }

    pub fn current(&self) -> Option<&ViewItem> {
        self.context.as_ref().and_then(ViewContext::current)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn active_set(&self) -> Option<&str> {
        self.active_set.as_deref()
    }

    pub fn sort(&self) -> &SortSettings {
        &self.sort
    }

    pub fn seen(&self) -> &SeenRegistry {
        &self.seen
    }

    /// The set the UI currently has open. Sample and membership views draw from it.
    pub fn set_active_set(&mut self, set_id: impl Into<SetId>) {
        let set_id = set_id.into();
        if self.active_set.as_deref() != Some(set_id.as_str()) {
            debug!("Active set is now {}", set_id);
            self.active_set = Some(set_id);
        }
    }

    pub fn set_sort(&mut self, mode: SortMode, seed: impl Into<String>) {
        let sort = SortSettings {
            mode,
            seed: seed.into(),
        };
        if sort != self.sort {
            info!("Sort changed to {} (seed {})", sort.mode.as_str(), sort.seed);
            self.ordered.invalidate_all();
            self.sort = sort;
        }
    }

    /// Replace the context with `items`, positioned on `image_id`.
    ///
    /// `index` is a hint; it is used when it points at `image_id`.
    pub fn open(
        &mut self,
        image_id: &str,
        items: Vec<ViewItem>,
        kind: ContextKind,
        index: Option<usize>,
    ) -> Result<usize> {
        let label = kind.default_label().to_string();
        self.open_labeled(image_id, items, kind, index, label)
    }

    pub fn open_labeled(
        &mut self,
        image_id: &str,
        items: Vec<ViewItem>,
        kind: ContextKind,
        index: Option<usize>,
        label: impl Into<String>,
    ) -> Result<usize> {
        let index = index
            .filter(|&i| items.get(i).is_some_and(|item| item.id() == image_id))
            .or_else(|| items.iter().position(|item| item.id() == image_id))
            .ok_or(ViewerError::InvalidState("image is not part of the opened items"))?;

        self.supersede();
        self.enter_kind(&kind);
        self.history = None;
        let context = ViewContext::new(kind, items, Some(index), label);
        info!("Opened {} ({} items) at {}", context.label, context.len(), index);
        self.context = Some(context);
        Ok(index)
    }

    /// Build the first batch of `kind` from the source and open it at index 0.
    pub fn open_view(&mut self, kind: ContextKind, label: Option<String>) -> Result<NavOutcome> {
        let request = match &kind {
            ContextKind::Sample | ContextKind::Favorites | ContextKind::NonFavorites | ContextKind::Hidden => {
                Request::Set {
                    set_id: self
                        .active_set
                        .clone()
                        .ok_or(ViewerError::InvalidState("no active set"))?,
                }
            }
            ContextKind::Slideshow { set_ids } => {
                if set_ids.is_empty() {
                    return Err(ViewerError::Exhausted);
                }
                Request::Sets {
                    set_ids: set_ids.clone(),
                }
            }
            ContextKind::Set { context_set_id, .. } => Request::Set {
                set_id: context_set_id
                    .clone()
                    .or_else(|| self.active_set.clone())
                    .ok_or(ViewerError::InvalidState("no active set"))?,
            },
        };
        self.supersede();
        Ok(self.dispatch(PendingOp::Open { kind, label }, request))
    }

    /// Drop the context, the history entry and any in-flight work.
    pub fn close(&mut self) {
        self.supersede();
        self.context = None;
        self.history = None;
        self.last_navigation = None;
    }

    pub fn next(&mut self, now: Instant) -> Result<NavOutcome> {
        self.step_forward(now, true)
    }

    /// Timer-driven step forward. The manual navigation throttle does not apply.
    pub fn advance(&mut self, now: Instant) -> Result<NavOutcome> {
        self.step_forward(now, false)
    }

    fn step_forward(&mut self, now: Instant, throttle: bool) -> Result<NavOutcome> {
        let context = self
            .context
            .as_ref()
            .ok_or(ViewerError::InvalidState("no open context"))?;
        let at_end = context.is_at_end();
        let current = context.current_index();
        let len = context.len();
        let kind = context.kind.clone();

        if throttle && self.throttled(now) {
            return Ok(NavOutcome::Throttled);
        }
        if self.pending.is_some() {
            debug!("Ignoring next while an append is pending");
            return Ok(NavOutcome::Ignored);
        }
        self.last_navigation = Some(now);

        if !at_end || (current.is_none() && len > 0) {
            let index = current.map_or(0, |i| i + 1);
            return Ok(self.move_to(index));
        }

        let request = match &kind {
            ContextKind::Sample | ContextKind::Favorites | ContextKind::NonFavorites | ContextKind::Hidden => {
                Request::Set {
                    set_id: self.scope_set()?,
                }
            }
            ContextKind::Slideshow { set_ids } => {
                if set_ids.is_empty() {
                    return Err(ViewerError::Exhausted);
                }
                Request::Sets {
                    set_ids: set_ids.clone(),
                }
            }
            ContextKind::Set {
                context_set_id: Some(set_id),
                ..
            } => Request::Set { set_id: set_id.clone() },
            ContextKind::Set {
                context_set_id: None, ..
            } => Request::More {
                set_id: self.scope_set()?,
                loaded: len,
            },
        };
        debug!("End of {} reached, requesting more", kind.default_label());
        Ok(self.dispatch(PendingOp::Append, request))
    }

    /// Step back. A pending append or peek is abandoned.
    pub fn previous(&mut self, now: Instant) -> Result<NavOutcome> {
        let context = self
            .context
            .as_ref()
            .ok_or(ViewerError::InvalidState("no open context"))?;
        let current = context.current_index();

        if self.throttled(now) {
            return Ok(NavOutcome::Throttled);
        }
        let index = match current {
            Some(i) if i > 0 => i - 1,
            _ => return Err(ViewerError::Exhausted),
        };
        self.last_navigation = Some(now);
        if self.pending.is_some() {
            self.supersede();
        }
        Ok(self.move_to(index))
    }

    /// Show the current image within its whole set in time order.
    pub fn open_chronological_peek(&mut self) -> Result<NavOutcome> {
        let context = self
            .context
            .as_ref()
            .ok_or(ViewerError::InvalidState("no open context"))?;
        let allowed = match &context.kind {
            ContextKind::Set { order, .. } => *order == SetOrder::Random,
            ContextKind::Sample => false,
            ContextKind::Favorites | ContextKind::NonFavorites | ContextKind::Hidden | ContextKind::Slideshow { .. } => {
                true
            }
        };
        if !allowed {
            return Err(ViewerError::InvalidState("chronological peek is not available here"));
        }
        let item = context
            .current()
            .ok_or(ViewerError::InvalidState("no current image"))?;
        let image_id = item.id().to_string();
        let set_id = item.set_id.clone();

        if self.pending.is_some() {
            return Ok(NavOutcome::Ignored);
        }
        Ok(self.dispatch(
            PendingOp::Peek {
                image_id,
                set_id: set_id.clone(),
            },
            Request::Set { set_id },
        ))
    }

    /// Go back to the context saved by the last peek.
    pub fn restore(&mut self) -> Result<usize> {
        let entry = self
            .history
            .take()
            .ok_or(ViewerError::InvalidState("nothing to go back to"))?;
        self.supersede();
        let index = entry.index();
        info!("Restored {} at {:?}", entry.context.label, index);
        self.context = Some(entry.context);
        index.ok_or(ViewerError::InvalidState("restored context has no current image"))
    }

    pub fn toggle_favorite(&mut self) -> Result<()> {
        let item = self.current().ok_or(ViewerError::InvalidState("no current image"))?;
        debug!("Toggling favorite on {}", item.id());
        self.source.toggle_favorite(&item.set_id, item.id());
        Ok(())
    }

    pub fn toggle_hidden(&mut self) -> Result<()> {
        let item = self.current().ok_or(ViewerError::InvalidState("no current image"))?;
        debug!("Toggling hidden on {}", item.id());
        self.source.toggle_hidden(&item.set_id, item.id());
        Ok(())
    }

    /// Membership counts of the active set, once its listing has been seen.
    pub fn counts(&self) -> Option<Counts> {
        let set_id = self.active_set.as_deref()?;
        let lists = self.ordered.get(set_id)?;
        Some(Counts {
            total: lists.favorites.len() + lists.nonfavorites.len() + lists.hidden.len(),
            favorites: lists.favorites.len(),
            nonfavorites: lists.nonfavorites.len(),
            hidden: lists.hidden.len(),
        })
    }

    /// Apply every result that has arrived, without waiting.
    pub fn poll_completions(&mut self) -> Vec<NavEvent> {
        let finished = self.pending.as_ref().is_some_and(|p| p.task.is_finished());
        let mut events = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            if let Some(event) = self.apply(completion) {
                events.push(event);
            }
        }
        if finished && self.pending.as_ref().is_some_and(|p| p.task.is_finished()) {
            warn!("Navigation task ended without reporting a result");
            self.pending = None;
        }
        events
    }

    /// Wait for the in-flight append, peek or open (if any) and apply it.
    pub async fn wait_pending(&mut self) -> Vec<NavEvent> {
        if let Some(pending) = self.pending.as_mut() {
            if let Err(e) = (&mut pending.task).await {
                warn!("Navigation task failed: {}", e);
            }
        }
        self.poll_completions()
    }

    fn throttled(&self, now: Instant) -> bool {
        self.last_navigation
            .is_some_and(|last| now.saturating_duration_since(last) < self.config.throttle)
    }

    fn move_to(&mut self, index: usize) -> NavOutcome {
        if let Some(context) = self.context.as_mut() {
            if context.set_index(index) {
                return NavOutcome::Moved(index);
            }
        }
        NavOutcome::Ignored
    }

    fn scope_set(&self) -> Result<SetId> {
        self.active_set
            .clone()
            .or_else(|| self.current().map(|item| item.set_id.clone()))
            .ok_or(ViewerError::InvalidState("no active set"))
    }

    /// Re-entering a view starts a fresh no-repeat cycle.
    fn enter_kind(&mut self, kind: &ContextKind) {
        self.seen.clear_kind(kind.tag());
        if kind.tag() == KindTag::Slideshow {
            self.last_pick = None;
        }
    }

    fn supersede(&mut self) {
        self.generation += 1;
        if let Some(pending) = self.pending.take() {
            debug!("Abandoning pending navigation (generation {})", pending.generation);
            pending.task.abort();
        }
    }

    fn dispatch(&mut self, op: PendingOp, request: Request) -> NavOutcome {
        self.generation += 1;
        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let task = self.runtime.spawn(async move {
            let result = run_request(source, request).await;
            let _ = tx.send(Completion { generation, result });
        });
        self.pending = Some(Pending { generation, op, task });
        NavOutcome::Pending
    }

    fn apply(&mut self, completion: Completion) -> Option<NavEvent> {
        let pending = match self.pending.take() {
            Some(pending) if pending.generation == completion.generation => pending,
            other => {
                self.pending = other;
                debug!("Discarding stale navigation result (generation {})", completion.generation);
                return None;
            }
        };
        let fetched = match completion.result {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Set source failed: {}", e);
                return Some(NavEvent::Failed(ViewerError::Source(e)));
            }
        };
        Some(match pending.op {
            PendingOp::Append => self.apply_append(fetched),
            PendingOp::Peek { image_id, set_id } => self.apply_peek(&image_id, &set_id, fetched),
            PendingOp::Open { kind, label } => self.apply_open(kind, label, fetched),
        })
    }

    fn apply_append(&mut self, fetched: Fetched) -> NavEvent {
        let Some(context) = self.context.as_ref() else {
            return NavEvent::Failed(ViewerError::InvalidState("no open context"));
        };
        let kind = context.kind.clone();
        let existing: HashSet<ImageId> = context.items().iter().map(|item| item.id().to_string()).collect();
        if kind.tag() == KindTag::Slideshow && self.last_pick.is_none() {
            self.last_pick = context.current().map(LastPick::of);
        }

        let batch = self.batch_for(&kind, fetched, &existing);
        let appended = batch.len();
        let first = self.context.as_mut().and_then(|context| {
            let first = context.append(batch)?;
            context.set_index(first).then_some(first)
        });
        match first {
            Some(index) => {
                debug!("Appended {} item(s), now at {}", appended, index);
                NavEvent::Moved(index)
            }
            None => {
                debug!("Nothing left to append to {}", kind.default_label());
                NavEvent::Exhausted
            }
        }
    }

    fn apply_peek(&mut self, image_id: &str, set_id: &str, fetched: Fetched) -> NavEvent {
        let Fetched::Images { images, .. } = fetched else {
            return NavEvent::Failed(ViewerError::InvalidState("unexpected peek result"));
        };
        let Some(context) = self.context.as_ref() else {
            return NavEvent::Failed(ViewerError::InvalidState("no open context"));
        };
        let set = self.source.set_ref(set_id);
        let visible: Vec<ImageDescriptor> = images
            .into_iter()
            .filter(|image| image.id == image_id || !set.as_ref().is_some_and(|s| s.is_hidden(&image.id)))
            .collect();
        let items: Vec<ViewItem> = chronological_order(&visible)
            .into_iter()
            .map(|image| ViewItem::new(image, set_id))
            .collect();
        let Some(index) = items.iter().position(|item| item.id() == image_id) else {
            return NavEvent::Failed(ViewerError::InvalidState("image is not part of its set"));
        };

        self.history = Some(HistoryEntry::capture(context));
        let context_set_id = (self.active_set.as_deref() != Some(set_id)).then(|| set_id.to_string());
        let label = set
            .map(|s| s.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Set".to_string());
        let kind = ContextKind::Set {
            context_set_id,
            order: SetOrder::Chronological,
        };
        info!("Chronological peek into {} at {}", label, index);
        self.context = Some(ViewContext::new(kind, items, Some(index), label));
        NavEvent::Peeked(index)
    }

    fn apply_open(&mut self, kind: ContextKind, label: Option<String>, fetched: Fetched) -> NavEvent {
        self.enter_kind(&kind);
        let batch = self.batch_for(&kind, fetched, &HashSet::new());
        if batch.is_empty() {
            return NavEvent::Exhausted;
        }
        let label = label.unwrap_or_else(|| kind.default_label().to_string());
        info!("Opened {} ({} items)", label, batch.len());
        self.history = None;
        self.context = Some(ViewContext::new(kind, batch, Some(0), label));
        NavEvent::Opened(0)
    }

    fn set_ref_or_empty(&self, set_id: &str) -> SetRef {
        self.source
            .set_ref(set_id)
            .unwrap_or_else(|| SetRef::new(set_id, set_id))
    }

    fn order_set(&self, images: Vec<ImageDescriptor>, order: SetOrder) -> Vec<ImageDescriptor> {
        match order {
            SetOrder::Original => images,
            SetOrder::Random => seeded_shuffle(&images, &self.sort.seed),
            SetOrder::Chronological => chronological_order(&images),
        }
    }

    /// The items to add to a context of `kind`, skipping ids in `existing`.
    fn batch_for(&mut self, kind: &ContextKind, fetched: Fetched, existing: &HashSet<ImageId>) -> Vec<ViewItem> {
        let count = self.config.batch_size.max(1);
        match (kind, fetched) {
            (ContextKind::Sample, Fetched::Images { set_id, images }) => {
                let set = self.set_ref_or_empty(&set_id);
                self.ordered.refresh(&set, &images, &self.sort);
                let pool: Vec<ImageDescriptor> = images.into_iter().filter(|i| !set.is_hidden(&i.id)).collect();
                pick_next_batch(&set_id, KindTag::Sample, &pool, count, &mut self.seen, &mut self.rng)
                    .into_iter()
                    .map(|image| ViewItem::new(image, set_id.clone()))
                    .collect()
            }
            (
                ContextKind::Favorites | ContextKind::NonFavorites | ContextKind::Hidden,
                Fetched::Images { set_id, images },
            ) => {
                let Some(membership) = membership_of(kind) else {
                    return Vec::new();
                };
                let set = self.set_ref_or_empty(&set_id);
                let lists = self.ordered.refresh(&set, &images, &self.sort);
                lists
                    .list(membership)
                    .iter()
                    .filter(|image| !existing.contains(&image.id))
                    .take(count)
                    .map(|image| ViewItem::new(image.clone(), set_id.clone()))
                    .collect()
            }
            (ContextKind::Slideshow { .. }, Fetched::Pool(pool)) => pick_slideshow_batch(
                &pool,
                count,
                &mut self.last_pick,
                &mut self.seen,
                self.config.weights,
                &mut self.rng,
            ),
            (ContextKind::Set { order, .. }, Fetched::Images { set_id, images })
            | (ContextKind::Set { order, .. }, Fetched::Page { set_id, images }) => {
                let set = self.set_ref_or_empty(&set_id);
                let visible: Vec<ImageDescriptor> = images
                    .into_iter()
                    .filter(|image| !set.is_hidden(&image.id) && !existing.contains(&image.id))
                    .collect();
                self.order_set(visible, *order)
                    .into_iter()
                    .map(|image| ViewItem::new(image, set_id.clone()))
                    .collect()
            }
            (kind, _) => {
                warn!("Result does not match {} context", kind.default_label());
                Vec::new()
            }
        }
    }
}

impl<S: SetSource> Drop for NavigationController<S> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
    }
}
