//! Pointer/touch/wheel interpretation: zoom, pan, swipes and taps.
//!
//! Coordinates are viewport pixels with the origin at the top-left corner.
//! The image is drawn centered and fitted (contain), then scaled by `zoom`
//! and shifted by `pan`.

use std::ops::{Add, Sub};
use std::time::Duration;

use smallvec::SmallVec;
use tokio::time::Instant;
use tracing::trace;

/// Minimum fraction of the viewport a zoomed image must still cover.
const MIN_COVERAGE: f32 = 0.1;

/// Fraction of the scaled image that must stay inside the viewport per axis.
const MIN_VISIBLE: f32 = 0.1;

const ZOOM_EPSILON: f32 = 1e-3;

/// Keyboard zoom step.
const KEY_ZOOM_FACTOR: f32 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Point) -> f32 {
        (self - other).length()
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
    }

    fn scale(self, factor: f32) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn is_empty(self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Raw input. Touch points map to pointer ids; the mouse is a single pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down {
        id: u64,
        pos: Point,
        time: Instant,
        /// The press started over a UI control (button, menu).
        over_control: bool,
    },
    Move {
        id: u64,
        pos: Point,
    },
    Up {
        id: u64,
        pos: Point,
        time: Instant,
    },
    Cancel {
        id: u64,
    },
    Wheel {
        pos: Point,
        /// Positive scrolls down (zooms out).
        delta_y: f32,
    },
}

/// Discrete navigation produced by swipes and edge taps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Prev,
    Next,
    Favorite,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Started,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    Intent(Intent),
    Interaction(Interaction),
    TransformChanged,
}

pub type GestureEvents = SmallVec<[GestureEvent; 3]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Left,
    Right,
    Up,
    Down,
}

impl SwipeDirection {
    fn from_delta(delta: Point) -> Self {
        if delta.x.abs() >= delta.y.abs() {
            if delta.x < 0.0 {
                SwipeDirection::Left
            } else {
                SwipeDirection::Right
            }
        } else if delta.y < 0.0 {
            SwipeDirection::Up
        } else {
            SwipeDirection::Down
        }
    }

    /// Displacement along this direction; negative once dragged back past the origin.
    fn along(self, delta: Point) -> f32 {
        match self {
            SwipeDirection::Left => -delta.x,
            SwipeDirection::Right => delta.x,
            SwipeDirection::Up => -delta.y,
            SwipeDirection::Down => delta.y,
        }
    }

    pub fn intent(self) -> Intent {
        match self {
            SwipeDirection::Left => Intent::Next,
            SwipeDirection::Right => Intent::Prev,
            SwipeDirection::Up => Intent::Favorite,
            SwipeDirection::Down => Intent::Close,
        }
    }
}

/// Visual state of an in-progress swipe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeProgress {
    pub direction: SwipeDirection,
    /// Pixels travelled along the locked direction (never negative).
    pub offset: f32,
    /// `offset / commit threshold`, clamped to `[0, 1]`.
    pub fraction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub zoom: f32,
    pub pan: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GestureConfig {
    pub swipe_hint_px: f32,
    pub swipe_commit_px: f32,
    /// Swipes are only recognized at or below this zoom.
    pub swipe_zoom_limit: f32,
    pub edge_tap_px: f32,
    pub tap_slop_px: f32,
    pub double_tap_window: Duration,
    pub double_tap_slop_px: f32,
    pub double_tap_zoom: f32,
    /// Vertical drag distance that doubles the zoom in one-hand mode.
    pub one_hand_zoom_px: f32,
    pub wheel_sensitivity: f32,
    pub max_zoom_percent: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe_hint_px: 20.0,
            swipe_commit_px: 80.0,
            swipe_zoom_limit: 1.05,
            edge_tap_px: 88.0,
            tap_slop_px: 10.0,
            double_tap_window: Duration::from_millis(300),
            double_tap_slop_px: 24.0,
            double_tap_zoom: 2.0,
            one_hand_zoom_px: 200.0,
            wheel_sensitivity: 0.002,
            max_zoom_percent: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GestureState {
    Idle,
    Pressed {
        id: u64,
        origin: Point,
        over_control: bool,
        moved: bool,
        second_tap: bool,
    },
    Panning {
        id: u64,
        last: Point,
    },
    Pinching {
        start_distance: f32,
        start_zoom: f32,
        start_pan: Point,
        start_mid: Point,
    },
    OneHandZooming {
        id: u64,
        origin: Point,
        start_zoom: f32,
    },
    SwipeTracking {
        id: u64,
        origin: Point,
        direction: SwipeDirection,
        offset: f32,
    },
}

/// Turns pointer streams into a clamped transform and navigation intents.
pub struct GestureInterpreter {
    config: GestureConfig,
    viewport: Size,
    image: Option<Size>,
    zoom: f32,
    pan: Point,
    state: GestureState,
    pointers: SmallVec<[(u64, Point); 2]>,
    last_tap: Option<(Instant, Point)>,
    interacting: bool,
}

impl GestureInterpreter {
    pub fn new(config: GestureConfig, viewport: Size) -> Self {
        Self {
            config,
            viewport,
            image: None,
            zoom: 1.0,
            pan: Point::ZERO,
            state: GestureState::Idle,
            pointers: SmallVec::new(),
            last_tap: None,
            interacting: false,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn transform(&self) -> Transform {
        Transform {
            zoom: self.zoom,
            pan: self.pan,
        }
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn pan(&self) -> Point {
        self.pan
    }

    pub fn is_interacting(&self) -> bool {
        self.interacting
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
        self.apply_zoom(self.zoom);
    }

    /// New image shown: remember its pixel size and reset the transform.
    pub fn set_image_size(&mut self, size: Option<(u32, u32)>) {
        self.image = size.map(|(w, h)| Size::new(w as f32, h as f32));
        self.reset_transform();
    }

    pub fn reset_transform(&mut self) {
        self.zoom = 1.0;
        self.pan = Point::ZERO;
    }

    /// Drop all gesture state. Returns `Ended` if an interaction was in progress.
    pub fn reset(&mut self) -> GestureEvents {
        let mut out = GestureEvents::new();
        self.state = GestureState::Idle;
        self.pointers.clear();
        self.last_tap = None;
        self.end_interaction(&mut out);
        self.reset_transform();
        out
    }

    /// Size of the image at zoom 1 (fitted inside the viewport).
    pub fn fitted_size(&self) -> Size {
        match self.image {
            Some(image) if !image.is_empty() && !self.viewport.is_empty() => {
                let scale = (self.viewport.width / image.width).min(self.viewport.height / image.height);
                Size::new(image.width * scale, image.height * scale)
            }
            _ => self.viewport,
        }
    }

    /// Upper zoom bound: a zoomed image never covers less than 10% of the viewport.
    pub fn max_zoom(&self) -> f32 {
        let fitted = self.fitted_size();
        if fitted.is_empty() || self.viewport.is_empty() {
            return 1.0;
        }
        let fill = (self.viewport.width / fitted.width).max(self.viewport.height / fitted.height);
        let natural = if fill >= 1.0 / MIN_COVERAGE {
            1.0 / MIN_COVERAGE
        } else {
            (fill / MIN_COVERAGE).sqrt()
        };
        natural.min(self.config.max_zoom_percent / 100.0).max(1.0)
    }

    /// Largest `|pan|` per axis that keeps 10% of the scaled image visible.
    pub fn pan_limit(&self) -> Point {
        let fitted = self.fitted_size();
        let sx = fitted.width * self.zoom;
        let sy = fitted.height * self.zoom;
        Point::new(
            self.viewport.width * 0.5 + sx * (0.5 - MIN_VISIBLE),
            self.viewport.height * 0.5 + sy * (0.5 - MIN_VISIBLE),
        )
    }

    pub fn swipe_progress(&self) -> Option<SwipeProgress> {
        match self.state {
            GestureState::SwipeTracking { direction, offset, .. } => Some(SwipeProgress {
                direction,
                offset,
                fraction: (offset / self.config.swipe_commit_px.max(1.0)).clamp(0.0, 1.0),
            }),
            _ => None,
        }
    }

    pub fn zoom_in(&mut self) {
        self.zoom_around(self.zoom * KEY_ZOOM_FACTOR, self.viewport_center());
    }

    pub fn zoom_out(&mut self) {
        self.zoom_around(self.zoom / KEY_ZOOM_FACTOR, self.viewport_center());
    }

    pub fn handle(&mut self, event: PointerEvent) -> GestureEvents {
        let mut out = GestureEvents::new();
        match event {
            PointerEvent::Down {
                id,
                pos,
                time,
                over_control,
            } => self.on_down(id, pos, time, over_control, &mut out),
            PointerEvent::Move { id, pos } => self.on_move(id, pos, &mut out),
            PointerEvent::Up { id, pos, time } => self.on_up(id, pos, time, &mut out),
            PointerEvent::Cancel { id } => self.on_cancel(id, &mut out),
            PointerEvent::Wheel { pos, delta_y } => {
                let factor = (-delta_y * self.config.wheel_sensitivity).exp();
                self.zoom_around(self.zoom * factor, pos);
                out.push(GestureEvent::TransformChanged);
                if !self.interacting {
                    out.push(GestureEvent::Interaction(Interaction::Started));
                    out.push(GestureEvent::Interaction(Interaction::Ended));
                }
            }
        }
        out
    }

    fn on_down(&mut self, id: u64, pos: Point, time: Instant, over_control: bool, out: &mut GestureEvents) {
        if !self.track_pointer(id, pos) {
            return;
        }

        match self.pointers.len() {
            1 => {
                let second_tap = !over_control
                    && self.last_tap.is_some_and(|(at, tap_pos)| {
                        time.saturating_duration_since(at) <= self.config.double_tap_window
                            && tap_pos.distance(pos) <= self.config.double_tap_slop_px
                    });
                self.state = GestureState::Pressed {
                    id,
                    origin: pos,
                    over_control,
                    moved: false,
                    second_tap,
                };
            }
            2 => {
                if matches!(self.state, GestureState::Pressed { over_control: true, .. }) {
                    return;
                }
                let (a, b) = (self.pointers[0].1, self.pointers[1].1);
                self.state = GestureState::Pinching {
                    start_distance: a.distance(b).max(1.0),
                    start_zoom: self.zoom,
                    start_pan: self.pan,
                    start_mid: a.midpoint(b),
                };
                self.begin_interaction(out);
            }
            _ => {}
        }
    }

    fn on_move(&mut self, id: u64, pos: Point, out: &mut GestureEvents) {
        let Some(slot) = self.pointers.iter_mut().find(|(pid, _)| *pid == id) else {
            return;
        };
        slot.1 = pos;

        match self.state {
            GestureState::Pressed {
                id: pid,
                origin,
                over_control,
                second_tap,
                ..
            } if pid == id => {
                let delta = pos - origin;
                let distance = delta.length();
                if distance <= self.config.tap_slop_px {
                    return;
                }
                if over_control {
                    self.mark_moved();
                } else if second_tap {
                    self.state = GestureState::OneHandZooming {
                        id,
                        origin,
                        start_zoom: self.zoom,
                    };
                    self.begin_interaction(out);
                    self.one_hand_zoom(origin, pos, self.zoom);
                    out.push(GestureEvent::TransformChanged);
                } else if self.zoom > self.config.swipe_zoom_limit {
                    self.state = GestureState::Panning { id, last: pos };
                    self.begin_interaction(out);
                    self.pan_by(delta);
                    out.push(GestureEvent::TransformChanged);
                } else if distance >= self.config.swipe_hint_px {
                    let direction = SwipeDirection::from_delta(delta);
                    trace!("Swipe locked {:?}", direction);
                    self.state = GestureState::SwipeTracking {
                        id,
                        origin,
                        direction,
                        offset: direction.along(delta).max(0.0),
                    };
                    self.begin_interaction(out);
                } else {
                    self.mark_moved();
                }
            }
            GestureState::Panning { id: pid, last } if pid == id => {
                self.pan_by(pos - last);
                self.state = GestureState::Panning { id, last: pos };
                out.push(GestureEvent::TransformChanged);
            }
            GestureState::Pinching {
                start_distance,
                start_zoom,
                start_pan,
                start_mid,
            } => {
                if self.pointers.len() < 2 {
                    return;
                }
                let (a, b) = (self.pointers[0].1, self.pointers[1].1);
                let zoom = start_zoom * a.distance(b) / start_distance;
                self.pinch_to(zoom, start_zoom, start_pan, start_mid, a.midpoint(b));
                out.push(GestureEvent::TransformChanged);
            }
            GestureState::OneHandZooming {
                id: pid,
                origin,
                start_zoom,
            } if pid == id => {
                self.one_hand_zoom(origin, pos, start_zoom);
                out.push(GestureEvent::TransformChanged);
            }
            GestureState::SwipeTracking {
                id: pid,
                origin,
                direction,
                ..
            } if pid == id => {
                self.state = GestureState::SwipeTracking {
                    id,
                    origin,
                    direction,
                    offset: direction.along(pos - origin).max(0.0),
                };
            }
            _ => {}
        }
    }

    fn on_up(&mut self, id: u64, pos: Point, time: Instant, out: &mut GestureEvents) {
        if let Some(slot) = self.pointers.iter_mut().find(|(pid, _)| *pid == id) {
            slot.1 = pos;
        }
        self.pointers.retain(|(pid, _)| *pid != id);

        match self.state {
            GestureState::Pressed {
                id: pid,
                origin,
                over_control,
                moved,
                second_tap,
            } if pid == id => {
                self.state = GestureState::Idle;
                if !moved && !over_control && origin.distance(pos) <= self.config.tap_slop_px {
                    self.on_tap(pos, time, second_tap, out);
                }
            }
            GestureState::Panning { id: pid, .. } | GestureState::OneHandZooming { id: pid, .. } if pid == id => {
                self.state = GestureState::Idle;
            }
            GestureState::SwipeTracking {
                id: pid,
                direction,
                offset,
                ..
            } if pid == id => {
                self.state = GestureState::Idle;
                if offset >= self.config.swipe_commit_px {
                    out.push(GestureEvent::Intent(direction.intent()));
                }
            }
            GestureState::Pinching { .. } => {
                if let Some(&(rest_id, rest_pos)) = self.pointers.first() {
                    self.state = if self.zoom > self.config.swipe_zoom_limit {
                        GestureState::Panning {
                            id: rest_id,
                            last: rest_pos,
                        }
                    } else {
                        GestureState::Pressed {
                            id: rest_id,
                            origin: rest_pos,
                            over_control: false,
                            moved: true,
                            second_tap: false,
                        }
                    };
                }
            }
            _ => {}
        }

        if self.pointers.is_empty() {
            self.state = GestureState::Idle;
            self.end_interaction(out);
        }
    }

    fn on_cancel(&mut self, id: u64, out: &mut GestureEvents) {
        self.pointers.retain(|(pid, _)| *pid != id);
        if self.pointers.is_empty() {
            self.state = GestureState::Idle;
            self.end_interaction(out);
        }
    }

    fn on_tap(&mut self, pos: Point, time: Instant, second_tap: bool, out: &mut GestureEvents) {
        let edge = self.config.edge_tap_px;
        if pos.x <= edge {
            self.last_tap = None;
            out.push(GestureEvent::Intent(Intent::Prev));
        } else if pos.x >= self.viewport.width - edge {
            self.last_tap = None;
            out.push(GestureEvent::Intent(Intent::Next));
        } else if second_tap {
            self.last_tap = None;
            if self.zoom > self.config.swipe_zoom_limit {
                self.reset_transform();
            } else {
                self.zoom_around(self.config.double_tap_zoom, pos);
            }
            out.push(GestureEvent::TransformChanged);
        } else {
            self.last_tap = Some((time, pos));
        }
    }

    fn track_pointer(&mut self, id: u64, pos: Point) -> bool {
        if let Some(slot) = self.pointers.iter_mut().find(|(pid, _)| *pid == id) {
            slot.1 = pos;
            return true;
        }
        if self.pointers.len() >= 2 {
            return false;
        }
        self.pointers.push((id, pos));
        true
    }

    fn mark_moved(&mut self) {
        if let GestureState::Pressed { moved, .. } = &mut self.state {
            *moved = true;
        }
    }

    fn begin_interaction(&mut self, out: &mut GestureEvents) {
        if !self.interacting {
            self.interacting = true;
            out.push(GestureEvent::Interaction(Interaction::Started));
        }
    }

    fn end_interaction(&mut self, out: &mut GestureEvents) {
        if self.interacting {
            self.interacting = false;
            out.push(GestureEvent::Interaction(Interaction::Ended));
        }
    }

    fn viewport_center(&self) -> Point {
        Point::new(self.viewport.width * 0.5, self.viewport.height * 0.5)
    }

    /// Zoom keeping the image point under `pivot` fixed on screen.
    fn zoom_around(&mut self, new_zoom: f32, pivot: Point) {
        let new_zoom = new_zoom.clamp(1.0, self.max_zoom());
        let ratio = new_zoom / self.zoom;
        let cursor = pivot - self.viewport_center();
        self.pan = self.pan.scale(ratio) - cursor.scale(ratio - 1.0);
        self.apply_zoom(new_zoom);
    }

    fn pinch_to(&mut self, zoom: f32, start_zoom: f32, start_pan: Point, start_mid: Point, mid: Point) {
        let zoom = zoom.clamp(1.0, self.max_zoom());
        let center = self.viewport_center();
        // Image point that was under the starting midpoint follows the current midpoint.
        let anchor = (start_mid - center - start_pan).scale(1.0 / start_zoom);
        self.pan = mid - center - anchor.scale(zoom);
        self.apply_zoom(zoom);
    }

    fn one_hand_zoom(&mut self, origin: Point, pos: Point, start_zoom: f32) {
        let steps = (pos.y - origin.y) / self.config.one_hand_zoom_px.max(1.0);
        let target = start_zoom * 2f32.powf(steps);
        let ratio_base = self.zoom;
        self.zoom_around(target, origin);
        trace!("One-hand zoom {:.2} -> {:.2}", ratio_base, self.zoom);
    }

    fn pan_by(&mut self, delta: Point) {
        self.pan = self.pan + delta;
        self.clamp_pan();
    }

    fn apply_zoom(&mut self, zoom: f32) {
        let zoom = zoom.clamp(1.0, self.max_zoom());
        if zoom <= 1.0 + ZOOM_EPSILON {
            self.zoom = 1.0;
            self.pan = Point::ZERO;
        } else {
            self.zoom = zoom;
            self.clamp_pan();
        }
    }

    fn clamp_pan(&mut self) {
        let limit = self.pan_limit();
        self.pan = Point::new(
            self.pan.x.clamp(-limit.x, limit.x),
            self.pan.y.clamp(-limit.y, limit.y),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> GestureInterpreter {
        let mut g = GestureInterpreter::new(GestureConfig::default(), Size::new(1000.0, 800.0));
        g.set_image_size(Some((2000, 1600)));
        g
    }

    fn down(id: u64, x: f32, y: f32, time: Instant) -> PointerEvent {
        PointerEvent::Down {
            id,
            pos: Point::new(x, y),
            time,
            over_control: false,
        }
    }

    fn mv(id: u64, x: f32, y: f32) -> PointerEvent {
        PointerEvent::Move {
            id,
            pos: Point::new(x, y),
        }
    }

    fn up(id: u64, x: f32, y: f32, time: Instant) -> PointerEvent {
        PointerEvent::Up {
            id,
            pos: Point::new(x, y),
            time,
        }
    }

    fn intents(events: &GestureEvents) -> Vec<Intent> {
        events
            .iter()
            .filter_map(|e| match e {
                GestureEvent::Intent(i) => Some(*i),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn max_zoom_follows_coverage_rule() {
        let g = interpreter();
        // Same aspect as the viewport: fill = 1, so sqrt(1 / 0.1).
        assert!((g.max_zoom() - 10f32.sqrt()).abs() < 1e-4);

        let mut wide = GestureInterpreter::new(GestureConfig::default(), Size::new(1000.0, 800.0));
        wide.set_image_size(Some((20_000, 100)));
        assert!((wide.max_zoom() - 10.0).abs() < 1e-4);

        let mut capped = GestureInterpreter::new(
            GestureConfig {
                max_zoom_percent: 200.0,
                ..GestureConfig::default()
            },
            Size::new(1000.0, 800.0),
        );
        capped.set_image_size(Some((2000, 1600)));
        assert!((capped.max_zoom() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn wheel_zoom_keeps_point_under_cursor() {
        let mut g = interpreter();
        let cursor = Point::new(700.0, 300.0);
        let center = Point::new(500.0, 400.0);
        let world_before = (cursor - center - g.pan()).scale(1.0 / g.zoom());
        g.handle(PointerEvent::Wheel { pos: cursor, delta_y: -300.0 });
        assert!(g.zoom() > 1.0);
        let world_after = (cursor - center - g.pan()).scale(1.0 / g.zoom());
        assert!(world_before.distance(world_after) < 1e-3);
    }

    #[test]
    fn left_swipe_commits_next() {
        let mut g = interpreter();
        let t = Instant::now();
        g.handle(down(1, 500.0, 400.0, t));
        let started = g.handle(mv(1, 470.0, 402.0));
        assert!(started.contains(&GestureEvent::Interaction(Interaction::Started)));
        g.handle(mv(1, 400.0, 405.0));
        let progress = g.swipe_progress().unwrap();
        assert_eq!(progress.direction, SwipeDirection::Left);
        assert!((progress.offset - 100.0).abs() < 1e-3);
        let events = g.handle(up(1, 400.0, 405.0, t));
        assert_eq!(intents(&events), vec![Intent::Next]);
        assert!(events.contains(&GestureEvent::Interaction(Interaction::Ended)));
    }

    #[test]
    fn vertical_swipes_map_to_favorite_and_close() {
        let mut g = interpreter();
        let t = Instant::now();
        g.handle(down(1, 500.0, 400.0, t));
        g.handle(mv(1, 500.0, 300.0));
        assert_eq!(intents(&g.handle(up(1, 500.0, 300.0, t))), vec![Intent::Favorite]);

        g.handle(down(2, 500.0, 400.0, t));
        g.handle(mv(2, 505.0, 500.0));
        assert_eq!(intents(&g.handle(up(2, 505.0, 500.0, t))), vec![Intent::Close]);
    }

    #[test]
    fn reversal_past_origin_does_not_flip_direction() {
        let mut g = interpreter();
        let t = Instant::now();
        g.handle(down(1, 500.0, 400.0, t));
        g.handle(mv(1, 470.0, 400.0));
        g.handle(mv(1, 650.0, 400.0));
        let progress = g.swipe_progress().unwrap();
        assert_eq!(progress.direction, SwipeDirection::Left);
        assert_eq!(progress.offset, 0.0);
        assert!(intents(&g.handle(up(1, 650.0, 400.0, t))).is_empty());
    }

    #[test]
    fn short_swipe_does_not_commit() {
        let mut g = interpreter();
        let t = Instant::now();
        g.handle(down(1, 500.0, 400.0, t));
        g.handle(mv(1, 450.0, 400.0));
        assert!(intents(&g.handle(up(1, 450.0, 400.0, t))).is_empty());
    }

    #[test]
    fn edge_taps_navigate() {
        let mut g = interpreter();
        let t = Instant::now();
        g.handle(down(1, 40.0, 400.0, t));
        assert_eq!(intents(&g.handle(up(1, 40.0, 400.0, t))), vec![Intent::Prev]);
        g.handle(down(1, 960.0, 400.0, t));
        assert_eq!(intents(&g.handle(up(1, 960.0, 400.0, t))), vec![Intent::Next]);
    }

    #[test]
    fn double_tap_toggles_zoom() {
        let mut g = interpreter();
        let t = Instant::now();
        g.handle(down(1, 500.0, 400.0, t));
        g.handle(up(1, 500.0, 400.0, t));
        let t2 = t + Duration::from_millis(150);
        g.handle(down(1, 505.0, 402.0, t2));
        g.handle(up(1, 505.0, 402.0, t2));
        assert!((g.zoom() - 2.0).abs() < 1e-4);

        let t3 = t2 + Duration::from_secs(2);
        g.handle(down(1, 500.0, 400.0, t3));
        g.handle(up(1, 500.0, 400.0, t3));
        let t4 = t3 + Duration::from_millis(100);
        g.handle(down(1, 500.0, 400.0, t4));
        g.handle(up(1, 500.0, 400.0, t4));
        assert_eq!(g.zoom(), 1.0);
        assert_eq!(g.pan(), Point::ZERO);
    }

    #[test]
    fn drag_pans_only_when_zoomed_and_stays_clamped() {
        let mut g = interpreter();
        let t = Instant::now();
        g.zoom_in();
        g.zoom_in();
        assert!(g.zoom() > 1.05);
        g.handle(down(1, 500.0, 400.0, t));
        g.handle(mv(1, 5000.0, -5000.0));
        let limit = g.pan_limit();
        assert!(g.pan().x <= limit.x + 1e-3);
        assert!(g.pan().y >= -limit.y - 1e-3);
        assert!(g.swipe_progress().is_none());
        g.handle(up(1, 5000.0, -5000.0, t));
    }

    #[test]
    fn press_over_control_never_pans() {
        let mut g = interpreter();
        let t = Instant::now();
        g.zoom_in();
        g.handle(PointerEvent::Down {
            id: 1,
            pos: Point::new(500.0, 400.0),
            time: t,
            over_control: true,
        });
        let events = g.handle(mv(1, 600.0, 450.0));
        assert!(events.is_empty());
        assert_eq!(g.pan(), Point::ZERO);
    }

    #[test]
    fn pinch_zooms_around_midpoint_and_clamps() {
        let mut g = interpreter();
        let t = Instant::now();
        g.handle(down(1, 400.0, 400.0, t));
        g.handle(down(2, 600.0, 400.0, t));
        g.handle(mv(2, 800.0, 400.0));
        assert!(g.zoom() > 1.0);
        g.handle(mv(2, 100_000.0, 400.0));
        assert!((g.zoom() - g.max_zoom()).abs() < 1e-3);
        g.handle(up(2, 100_000.0, 400.0, t));
        let events = g.handle(up(1, 400.0, 400.0, t));
        assert!(events.contains(&GestureEvent::Interaction(Interaction::Ended)));
        assert!(!g.is_interacting());
    }

    #[test]
    fn double_tap_and_drag_zooms_one_handed() {
        let mut g = interpreter();
        let t = Instant::now();
        g.handle(down(1, 500.0, 400.0, t));
        g.handle(up(1, 500.0, 400.0, t));
        g.handle(down(1, 500.0, 400.0, t + Duration::from_millis(100)));
        g.handle(mv(1, 500.0, 600.0));
        assert!((g.zoom() - 2.0).abs() < 1e-3);
        assert!(g.swipe_progress().is_none());
    }

    #[test]
    fn zoom_never_leaves_bounds() {
        let mut g = interpreter();
        for _ in 0..50 {
            g.zoom_in();
        }
        assert!(g.zoom() <= g.max_zoom() + 1e-4);
        for _ in 0..50 {
            g.zoom_out();
        }
        assert_eq!(g.zoom(), 1.0);
        assert_eq!(g.pan(), Point::ZERO);
    }
}
