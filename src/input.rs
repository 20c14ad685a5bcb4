//! Keyboard and wheel bindings.
//!
//! Handles:
//! - Key names coming from the UI layer ("Right", "f", "Escape", "+")
//! - Modifier combinations (ctrl/shift/alt)
//! - Mapping bindings onto viewer [`Action`]s

use std::collections::HashMap;

/// Keys the viewer can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    ArrowLeft, ArrowRight, ArrowUp, ArrowDown,
    Escape, Enter, Space, Tab, Backspace, Delete, Home, End, PageUp, PageDown,
    Minus, Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        alt: false,
        shift: false,
    };
}

/// Represents all possible input types for shortcuts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputBinding {
    Key(Key),
    KeyWithCtrl(Key),
    KeyWithShift(Key),
    KeyWithAlt(Key),
    ScrollUp,
    ScrollDown,
}

/// Everything a binding can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    NextImage,
    PreviousImage,
    ToggleFavorite,
    ToggleHidden,
    /// Open the chronological peek, or go back from it.
    ChronologicalPeek,
    ToggleTimer,
    Close,
    ZoomIn,
    ZoomOut,
    ResetZoom,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::NextImage,
        Action::PreviousImage,
        Action::ToggleFavorite,
        Action::ToggleHidden,
        Action::ChronologicalPeek,
        Action::ToggleTimer,
        Action::Close,
        Action::ZoomIn,
        Action::ZoomOut,
        Action::ResetZoom,
    ];

    pub fn from_str(s: &str) -> Option<Action> {
        match s.trim().to_lowercase().as_str() {
            "next_image" | "next" => Some(Action::NextImage),
            "previous_image" | "previous" | "prev" => Some(Action::PreviousImage),
            "toggle_favorite" | "favorite" | "favourite" => Some(Action::ToggleFavorite),
            "toggle_hidden" | "hide" | "hidden" => Some(Action::ToggleHidden),
            "chronological_peek" | "peek" | "chronological" => Some(Action::ChronologicalPeek),
            "toggle_timer" | "timer" | "slideshow_timer" => Some(Action::ToggleTimer),
            "close" | "exit" => Some(Action::Close),
            "zoom_in" => Some(Action::ZoomIn),
            "zoom_out" => Some(Action::ZoomOut),
            "reset_zoom" | "reset" => Some(Action::ResetZoom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::NextImage => "next_image",
            Action::PreviousImage => "previous_image",
            Action::ToggleFavorite => "toggle_favorite",
            Action::ToggleHidden => "toggle_hidden",
            Action::ChronologicalPeek => "chronological_peek",
            Action::ToggleTimer => "toggle_timer",
            Action::Close => "close",
            Action::ZoomIn => "zoom_in",
            Action::ZoomOut => "zoom_out",
            Action::ResetZoom => "reset_zoom",
        }
    }
}

/// Parse an input binding from string
pub fn parse_input_binding(s: &str) -> Option<InputBinding> {
    let s = s.trim().to_lowercase();

    if let Some(key_str) = s.strip_prefix("ctrl+") {
        return parse_key(key_str).map(InputBinding::KeyWithCtrl);
    }
    if let Some(key_str) = s.strip_prefix("shift+") {
        return parse_key(key_str).map(InputBinding::KeyWithShift);
    }
    if let Some(key_str) = s.strip_prefix("alt+") {
        return parse_key(key_str).map(InputBinding::KeyWithAlt);
    }

    match s.as_str() {
        "scroll_up" | "wheel_up" => return Some(InputBinding::ScrollUp),
        "scroll_down" | "wheel_down" => return Some(InputBinding::ScrollDown),
        _ => {}
    }

    parse_key(&s).map(InputBinding::Key)
}

/// Parse a single key name, accepting the names browsers and toolkits use.
pub fn parse_key(s: &str) -> Option<Key> {
    if s == " " {
        return Some(Key::Space);
    }
    let s = s.trim().to_lowercase();
    if s.len() == 1 {
        let c = s.chars().next()?;
        if c.is_ascii_lowercase() {
            return letter_key(c);
        }
        if let Some(d) = c.to_digit(10) {
            return digit_key(d);
        }
    }

    match s.as_str() {
        "num0" | "digit0" => Some(Key::Num0),
        "num1" | "digit1" => Some(Key::Num1),
        "num2" | "digit2" => Some(Key::Num2),
        "num3" | "digit3" => Some(Key::Num3),
        "num4" | "digit4" => Some(Key::Num4),
        "num5" | "digit5" => Some(Key::Num5),
        "num6" | "digit6" => Some(Key::Num6),
        "num7" | "digit7" => Some(Key::Num7),
        "num8" | "digit8" => Some(Key::Num8),
        "num9" | "digit9" => Some(Key::Num9),
        "f1" => Some(Key::F1),
        "f2" => Some(Key::F2),
        "f3" => Some(Key::F3),
        "f4" => Some(Key::F4),
        "f5" => Some(Key::F5),
        "f6" => Some(Key::F6),
        "f7" => Some(Key::F7),
        "f8" => Some(Key::F8),
        "f9" => Some(Key::F9),
        "f10" => Some(Key::F10),
        "f11" => Some(Key::F11),
        "f12" => Some(Key::F12),
        "left" | "arrow_left" | "arrowleft" => Some(Key::ArrowLeft),
        "right" | "arrow_right" | "arrowright" => Some(Key::ArrowRight),
        "up" | "arrow_up" | "arrowup" => Some(Key::ArrowUp),
        "down" | "arrow_down" | "arrowdown" => Some(Key::ArrowDown),
        "escape" | "esc" => Some(Key::Escape),
        "enter" | "return" => Some(Key::Enter),
        "space" | "spacebar" | " " => Some(Key::Space),
        "tab" => Some(Key::Tab),
        "backspace" => Some(Key::Backspace),
        "delete" | "del" => Some(Key::Delete),
        "home" => Some(Key::Home),
        "end" => Some(Key::End),
        "pageup" | "page_up" => Some(Key::PageUp),
        "pagedown" | "page_down" => Some(Key::PageDown),
        "minus" | "-" | "subtract" => Some(Key::Minus),
        "plus" | "+" | "=" | "equals" | "add" => Some(Key::Plus),
        _ => None,
    }
}

fn letter_key(c: char) -> Option<Key> {
    const LETTERS: [Key; 26] = [
        Key::A, Key::B, Key::C, Key::D, Key::E, Key::F, Key::G, Key::H, Key::I,
        Key::J, Key::K, Key::L, Key::M, Key::N, Key::O, Key::P, Key::Q, Key::R,
        Key::S, Key::T, Key::U, Key::V, Key::W, Key::X, Key::Y, Key::Z,
    ];
    LETTERS.get((c as u8).checked_sub(b'a')? as usize).copied()
}

fn digit_key(d: u32) -> Option<Key> {
    const DIGITS: [Key; 10] = [
        Key::Num0, Key::Num1, Key::Num2, Key::Num3, Key::Num4,
        Key::Num5, Key::Num6, Key::Num7, Key::Num8, Key::Num9,
    ];
    DIGITS.get(d as usize).copied()
}

/// Convert InputBinding back to string representation
pub fn binding_to_string(binding: &InputBinding) -> String {
    match binding {
        InputBinding::Key(key) => key_to_string(key),
        InputBinding::KeyWithCtrl(key) => format!("ctrl+{}", key_to_string(key)),
        InputBinding::KeyWithShift(key) => format!("shift+{}", key_to_string(key)),
        InputBinding::KeyWithAlt(key) => format!("alt+{}", key_to_string(key)),
        InputBinding::ScrollUp => "scroll_up".to_string(),
        InputBinding::ScrollDown => "scroll_down".to_string(),
    }
}

fn key_to_string(key: &Key) -> String {
    format!("{:?}", key).to_lowercase()
}

/// Binding table in both directions.
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    bindings: HashMap<InputBinding, Action>,
    action_bindings: HashMap<Action, Vec<InputBinding>>,
}

impl KeyMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut map = Self::empty();
        map.set_defaults();
        map
    }

    fn set_defaults(&mut self) {
        // Navigation
        self.add_binding(InputBinding::Key(Key::ArrowRight), Action::NextImage);
        self.add_binding(InputBinding::Key(Key::ArrowLeft), Action::PreviousImage);

        // Membership
        self.add_binding(InputBinding::Key(Key::F), Action::ToggleFavorite);
        self.add_binding(InputBinding::Key(Key::H), Action::ToggleHidden);

        self.add_binding(InputBinding::Key(Key::C), Action::ChronologicalPeek);
        self.add_binding(InputBinding::Key(Key::Space), Action::ToggleTimer);
        self.add_binding(InputBinding::Key(Key::Escape), Action::Close);

        // Zoom
        self.add_binding(InputBinding::Key(Key::Plus), Action::ZoomIn);
        self.add_binding(InputBinding::Key(Key::Minus), Action::ZoomOut);
        self.add_binding(InputBinding::Key(Key::Num0), Action::ResetZoom);
        self.add_binding(InputBinding::ScrollUp, Action::ZoomIn);
        self.add_binding(InputBinding::ScrollDown, Action::ZoomOut);
    }

    /// Add a binding. A binding maps to exactly one action; rebinding moves it.
    pub fn add_binding(&mut self, input: InputBinding, action: Action) {
        if let Some(previous) = self.bindings.insert(input.clone(), action) {
            if let Some(list) = self.action_bindings.get_mut(&previous) {
                list.retain(|b| *b != input);
            }
        }
        let list = self.action_bindings.entry(action).or_default();
        if !list.contains(&input) {
            list.push(input);
        }
    }

    pub fn has_bindings(&self, action: Action) -> bool {
        self.action_bindings.get(&action).is_some_and(|l| !l.is_empty())
    }

    /// Fill in default bindings for actions the map does not bind at all.
    pub fn fill_missing_defaults(&mut self) {
        let defaults = Self::with_defaults();
        for action in Action::ALL {
            if self.has_bindings(action) {
                continue;
            }
            for binding in defaults.get_bindings(action) {
                if !self.bindings.contains_key(&binding) {
                    self.add_binding(binding, action);
                }
            }
        }
    }

    pub fn action_for(&self, binding: &InputBinding) -> Option<Action> {
        self.bindings.get(binding).copied()
    }

    pub fn action_for_key(&self, key: Key, modifiers: Modifiers) -> Option<Action> {
        let binding = if modifiers.ctrl {
            InputBinding::KeyWithCtrl(key)
        } else if modifiers.alt {
            InputBinding::KeyWithAlt(key)
        } else if modifiers.shift {
            InputBinding::KeyWithShift(key)
        } else {
            InputBinding::Key(key)
        };
        self.action_for(&binding).or_else(|| {
            // "+" usually arrives with shift held; fall back to the bare key.
            if modifiers.shift && !modifiers.ctrl && !modifiers.alt {
                self.action_for(&InputBinding::Key(key))
            } else {
                None
            }
        })
    }

    /// Look up a key by the name the UI layer reports.
    pub fn action_for_name(&self, key_name: &str, modifiers: Modifiers) -> Option<Action> {
        parse_key(key_name).and_then(|key| self.action_for_key(key, modifiers))
    }

    pub fn action_for_scroll(&self, delta_y: f32) -> Option<Action> {
        if delta_y < 0.0 {
            self.action_for(&InputBinding::ScrollUp)
        } else if delta_y > 0.0 {
            self.action_for(&InputBinding::ScrollDown)
        } else {
            None
        }
    }

    pub fn get_bindings(&self, action: Action) -> Vec<InputBinding> {
        self.action_bindings.get(&action).cloned().unwrap_or_default()
    }

    /// `action = binding, binding` lines in a stable order.
    pub fn to_ini_lines(&self) -> Vec<String> {
        Action::ALL
            .iter()
            .filter(|action| self.has_bindings(**action))
            .map(|action| {
                let bindings: Vec<String> = self.get_bindings(*action).iter().map(binding_to_string).collect();
                format!("{} = {}", action.as_str(), bindings.join(", "))
            })
            .collect()
    }
}
