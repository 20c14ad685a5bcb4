//! The viewer facade the UI layer talks to.
//!
//! Owns the navigation controller, the media cache, the auto-advance timer
//! and the gesture interpreter, and routes keys, pointer input and timer
//! ticks between them. State changes the UI should react to go out as
//! [`ViewerEvent`]s on a crossbeam channel; everything else is read through
//! [`Viewer::snapshot`].

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, ViewerError};
use crate::gesture::{
    GestureEvent, GestureInterpreter, Intent, Interaction, PointerEvent, Size, SwipeProgress, Transform,
};
use crate::input::{Action, KeyMap, Modifiers};
use crate::media_cache::{neighbor_window, Direction, LoadingIndicator, MediaCache, MediaHandle};
use crate::model::{ContextKind, ImageId, SetId, ViewContext, ViewItem};
use crate::navigation::{Counts, NavEvent, NavOutcome, NavigationController};
use crate::source::{FetchBytes, SetSource};
use crate::timer::{PauseReason, TimerController, TimerPhase, TimerSignal};

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// A new context is showing (open, peek or restore).
    Opened { label: String, index: usize },
    Moved { index: usize, image_id: ImageId },
    /// The current image's media is available.
    Loaded { image_id: ImageId },
    /// Nothing further in that direction.
    Shake,
    Error(ViewerError),
    Timer(TimerSignal),
    Closed,
}

/// Everything the UI needs to draw a frame.
#[derive(Debug, Clone)]
pub struct ViewerSnapshot {
    pub image_id: Option<ImageId>,
    pub set_id: Option<SetId>,
    pub index: Option<usize>,
    pub len: usize,
    pub label: Option<String>,
    pub transform: Transform,
    pub swipe: Option<SwipeProgress>,
    pub timer_phase: TimerPhase,
    pub timer_progress: f32,
    pub fading: bool,
    pub favorite: bool,
    pub hidden: bool,
    /// Loading indicator, shown only once the debounce has passed.
    pub loading: bool,
    /// An append, peek or open is in flight.
    pub pending: bool,
    pub can_restore: bool,
    pub counts: Option<Counts>,
    pub media: Option<MediaHandle>,
}

type MediaCompletion = (ImageId, Result<MediaHandle>);

pub struct Viewer<S: SetSource, F: FetchBytes> {
    source: Arc<S>,
    navigation: NavigationController<S>,
    media: MediaCache<F>,
    timer: TimerController,
    gestures: GestureInterpreter,
    keymap: KeyMap,
    loading: LoadingIndicator,
    runtime: Handle,
    shown: Option<MediaHandle>,
    last_index: Option<usize>,
    last_tick: Option<Instant>,
    waiter: Option<JoinHandle<()>>,
    media_tx: mpsc::UnboundedSender<MediaCompletion>,
    media_rx: mpsc::UnboundedReceiver<MediaCompletion>,
    events_tx: Sender<ViewerEvent>,
    events_rx: Receiver<ViewerEvent>,
}

impl<S: SetSource, F: FetchBytes> Viewer<S, F> {
    pub fn new(source: Arc<S>, fetcher: Arc<F>, config: &Config, runtime: Handle, viewport: Size) -> Self {
        let navigation = NavigationController::new(Arc::clone(&source), config.navigation_config(), runtime.clone());
        let media_config = config.media_cache_config();
        let loading = LoadingIndicator::new(media_config.loading_debounce);
        let media = MediaCache::new(fetcher, media_config, runtime.clone());
        let mut timer = TimerController::new(config.timer_config(), config.wake_manager());
        timer.set_last_used(config.last_timer_duration());
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = unbounded();

        Self {
            source,
            navigation,
            media,
            timer,
            gestures: GestureInterpreter::new(config.gesture_config(), viewport),
            keymap: config.keymap.clone(),
            loading,
            runtime,
            shown: None,
            last_index: None,
            last_tick: None,
            waiter: None,
            media_tx,
            media_rx,
            events_tx,
            events_rx,
        }
    }

    /// Receiver for [`ViewerEvent`]s. Every clone sees each event once.
    pub fn events(&self) -> Receiver<ViewerEvent> {
        self.events_rx.clone()
    }

    pub fn navigation(&self) -> &NavigationController<S> {
        &self.navigation
    }

    pub fn navigation_mut(&mut self) -> &mut NavigationController<S> {
        &mut self.navigation
    }

    pub fn media(&self) -> &MediaCache<F> {
        &self.media
    }

    pub fn timer(&self) -> &TimerController {
        &self.timer
    }

    pub fn gestures(&self) -> &GestureInterpreter {
        &self.gestures
    }

    pub fn current_media(&self) -> Option<&MediaHandle> {
        self.shown.as_ref()
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.gestures.set_viewport(viewport);
    }

    pub fn set_active_set(&mut self, set_id: impl Into<SetId>) {
        self.navigation.set_active_set(set_id);
    }

    pub fn open(
        &mut self,
        image_id: &str,
        items: Vec<ViewItem>,
        kind: ContextKind,
        index: Option<usize>,
        now: Instant,
    ) -> Result<usize> {
        let index = self.navigation.open(image_id, items, kind, index)?;
        self.last_index = None;
        self.emit_opened(index);
        self.show_current(now);
        Ok(index)
    }

    /// Build a view from the source; the result arrives through [`Viewer::flush`].
    pub fn open_view(&mut self, kind: ContextKind, label: Option<String>) -> Result<NavOutcome> {
        self.navigation.open_view(kind, label)
    }

    pub fn next(&mut self, now: Instant) {
        let outcome = self.navigation.next(now);
        self.handle_outcome(outcome, now);
    }

    pub fn previous(&mut self, now: Instant) {
        let outcome = self.navigation.previous(now);
        self.handle_outcome(outcome, now);
    }

    /// Cancel all media work, stop the timer and drop the context.
    pub fn close(&mut self) {
        self.abort_waiter();
        self.media.clear();
        for signal in self.timer.stop() {
            self.emit(ViewerEvent::Timer(signal));
        }
        self.gestures.reset();
        self.navigation.close();
        self.loading.finish();
        self.shown = None;
        self.last_index = None;
        info!("Viewer closed");
        self.emit(ViewerEvent::Closed);
    }

    /// Close and release the wake lock. Leaves no background work behind.
    pub fn teardown(&mut self) {
        self.close();
        self.timer.teardown();
    }

    pub fn start_timer(&mut self, duration: Duration) {
        let signals = self.timer.start(duration);
        for signal in signals {
            self.emit(ViewerEvent::Timer(signal));
        }
    }

    pub fn stop_timer(&mut self) {
        for signal in self.timer.stop() {
            self.emit(ViewerEvent::Timer(signal));
        }
    }

    pub fn set_menu_open(&mut self, open: bool) {
        if open {
            self.timer.pause(PauseReason::MenuOpen);
        } else {
            self.timer.resume(PauseReason::MenuOpen);
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        if visible {
            self.timer.resume(PauseReason::Hidden);
        } else {
            self.timer.pause(PauseReason::Hidden);
        }
    }

    pub fn handle_action(&mut self, action: Action, now: Instant) {
        debug!("Action {}", action.as_str());
        match action {
            Action::NextImage => self.next(now),
            Action::PreviousImage => self.previous(now),
            Action::ToggleFavorite => {
                let result = self.navigation.toggle_favorite();
                self.report(result);
            }
            Action::ToggleHidden => {
                let result = self.navigation.toggle_hidden();
                self.report(result);
            }
            Action::ChronologicalPeek => {
                if self.navigation.history().is_some() {
                    match self.navigation.restore() {
                        Ok(index) => {
                            self.last_index = None;
                            self.emit_opened(index);
                            self.show_current(now);
                        }
                        Err(e) => self.report_error(e),
                    }
                } else {
                    let outcome = self.navigation.open_chronological_peek();
                    self.handle_outcome(outcome, now);
                }
            }
            Action::ToggleTimer => {
                for signal in self.timer.toggle() {
                    self.emit(ViewerEvent::Timer(signal));
                }
            }
            Action::Close => self.close(),
            Action::ZoomIn => self.gestures.zoom_in(),
            Action::ZoomOut => self.gestures.zoom_out(),
            Action::ResetZoom => self.gestures.reset_transform(),
        }
    }

    /// Dispatch a key by name. Returns the action it was bound to.
    pub fn handle_key(&mut self, key_name: &str, modifiers: Modifiers, now: Instant) -> Option<Action> {
        let action = self.keymap.action_for_name(key_name, modifiers)?;
        self.handle_action(action, now);
        Some(action)
    }

    pub fn handle_pointer(&mut self, event: PointerEvent, now: Instant) {
        if let PointerEvent::Wheel { delta_y, .. } = event {
            // The wheel zooms unless it was rebound to something else.
            match self.keymap.action_for_scroll(delta_y) {
                Some(Action::ZoomIn | Action::ZoomOut) | None => {}
                Some(action) => {
                    self.handle_action(action, now);
                    return;
                }
            }
        }

        for gesture in self.gestures.handle(event) {
            match gesture {
                GestureEvent::Intent(intent) => self.handle_intent(intent, now),
                GestureEvent::Interaction(Interaction::Started) => self.timer.interaction_started(),
                GestureEvent::Interaction(Interaction::Ended) => self.timer.interaction_ended(),
                GestureEvent::TransformChanged => {}
            }
        }
    }

    fn handle_intent(&mut self, intent: Intent, now: Instant) {
        match intent {
            Intent::Prev => self.previous(now),
            Intent::Next => self.next(now),
            Intent::Favorite => self.handle_action(Action::ToggleFavorite, now),
            Intent::Close => self.close(),
        }
    }

    /// Advance the timer to `now` and apply finished background work.
    pub fn tick(&mut self, now: Instant) {
        self.flush(now);
        let delta = self
            .last_tick
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_tick = Some(now);

        for signal in self.timer.tick(delta) {
            if signal == TimerSignal::Advance {
                let outcome = self.navigation.advance(now);
                self.handle_outcome(outcome, now);
            }
            self.emit(ViewerEvent::Timer(signal));
        }
    }

    /// Apply navigation and media results that have already arrived.
    pub fn flush(&mut self, now: Instant) {
        for event in self.navigation.poll_completions() {
            self.apply_nav_event(event, now);
        }
        while let Ok((id, result)) = self.media_rx.try_recv() {
            self.apply_media(id, result);
        }
    }

    /// Wait for in-flight navigation work and the current image, then apply them.
    pub async fn wait_idle(&mut self) {
        while self.navigation.is_pending() {
            for event in self.navigation.wait_pending().await {
                self.apply_nav_event(event, Instant::now());
            }
        }
        if let Some(waiter) = self.waiter.as_mut() {
            if let Err(e) = waiter.await {
                if !e.is_cancelled() {
                    warn!("Media waiter failed: {}", e);
                }
            }
            self.waiter = None;
        }
        self.flush(Instant::now());
    }

    pub fn snapshot(&self, now: Instant) -> ViewerSnapshot {
        let context = self.navigation.context();
        let current = context.and_then(ViewContext::current);
        let set = current.and_then(|item| self.source.set_ref(&item.set_id));
        ViewerSnapshot {
            image_id: current.map(|item| item.id().to_string()),
            set_id: current.map(|item| item.set_id.clone()),
            index: context.and_then(ViewContext::current_index),
            len: context.map_or(0, ViewContext::len),
            label: context.map(|c| c.label.clone()),
            transform: self.gestures.transform(),
            swipe: self.gestures.swipe_progress(),
            timer_phase: self.timer.phase(),
            timer_progress: self.timer.progress(),
            fading: self.timer.is_fading(),
            favorite: match (&set, current) {
                (Some(set), Some(item)) => set.is_favorite(item.id()),
                _ => false,
            },
            hidden: match (&set, current) {
                (Some(set), Some(item)) => set.is_hidden(item.id()),
                _ => false,
            },
            loading: self.loading.is_visible(now),
            pending: self.navigation.is_pending(),
            can_restore: self.navigation.history().is_some(),
            counts: self.navigation.counts(),
            media: self.shown.clone(),
        }
    }

    fn handle_outcome(&mut self, outcome: Result<NavOutcome>, now: Instant) {
        match outcome {
            Ok(NavOutcome::Moved(index)) => {
                self.emit_moved(index);
                self.show_current(now);
            }
            Ok(NavOutcome::Pending | NavOutcome::Throttled | NavOutcome::Ignored) => {}
            Err(e) => self.report_error(e),
        }
    }

    fn apply_nav_event(&mut self, event: NavEvent, now: Instant) {
        match event {
            NavEvent::Opened(index) | NavEvent::Peeked(index) => {
                self.last_index = None;
                self.emit_opened(index);
                self.show_current(now);
            }
            NavEvent::Moved(index) => {
                self.emit_moved(index);
                self.show_current(now);
            }
            NavEvent::Exhausted => self.emit(ViewerEvent::Shake),
            NavEvent::Failed(e) => self.report_error(e),
        }
    }

    fn report(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.report_error(e);
        }
    }

    fn report_error(&mut self, error: ViewerError) {
        match error {
            ViewerError::Exhausted => self.emit(ViewerEvent::Shake),
            ViewerError::Cancelled => {}
            ViewerError::InvalidState(reason) => debug!("Ignored: {}", reason),
            e => {
                warn!("{}", e);
                self.emit(ViewerEvent::Error(e));
            }
        }
    }

    /// Resolve the current image and move the prefetch window around it.
    fn show_current(&mut self, now: Instant) {
        let Some(context) = self.navigation.context() else {
            return;
        };
        let (Some(index), Some(item)) = (context.current_index(), context.current()) else {
            return;
        };
        let id = item.id().to_string();
        let direction = match self.last_index {
            Some(last) if index < last => Direction::Backward,
            _ => Direction::Forward,
        };
        let config = self.media.config();
        let window: Vec<ImageId> = neighbor_window(
            index,
            context.len(),
            direction,
            config.prefetch_ahead,
            config.prefetch_behind,
        )
        .into_iter()
        .filter_map(|i| context.items().get(i).map(|item| item.id().to_string()))
        .collect();
        self.last_index = Some(index);

        self.gestures.reset_transform();
        self.abort_waiter();
        let ticket = self.media.focus(&id, &window);

        if let Some(handle) = ticket.ready().cloned() {
            self.apply_media(id, Ok(handle));
            return;
        }

        self.shown = None;
        self.gestures.set_image_size(None);
        self.loading.start(now);
        let tx = self.media_tx.clone();
        self.waiter = Some(self.runtime.spawn(async move {
            let result = ticket.wait().await;
            let _ = tx.send((id, result));
        }));
    }

    fn apply_media(&mut self, id: ImageId, result: Result<MediaHandle>) {
        let is_current = self.navigation.current().is_some_and(|item| item.id() == id);
        if !is_current {
            debug!("Dropping media for {} (no longer current)", id);
            return;
        }
        match result {
            Ok(handle) => {
                self.loading.finish();
                self.gestures.set_image_size(handle.dimensions);
                self.shown = Some(handle);
                self.emit(ViewerEvent::Loaded { image_id: id });
            }
            Err(ViewerError::Cancelled) => {}
            Err(e) => {
                self.loading.finish();
                self.report_error(e);
            }
        }
    }

    fn abort_waiter(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            waiter.abort();
        }
    }

    fn emit_opened(&self, index: usize) {
        let label = self
            .navigation
            .context()
            .map(|c| c.label.clone())
            .unwrap_or_default();
        self.emit(ViewerEvent::Opened { label, index });
    }

    fn emit_moved(&self, index: usize) {
        if let Some(item) = self.navigation.current() {
            self.emit(ViewerEvent::Moved {
                index,
                image_id: item.id().to_string(),
            });
        }
    }

    fn emit(&self, event: ViewerEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl<S: SetSource, F: FetchBytes> Drop for Viewer<S, F> {
    fn drop(&mut self) {
        self.abort_waiter();
        self.media.cancel_all();
        self.timer.teardown();
    }
}
