use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::gesture::GestureConfig;
use crate::input::{parse_input_binding, Action, KeyMap};
use crate::media_cache::MediaCacheConfig;
use crate::model::{SortMode, SortSettings};
use crate::navigation::NavigationConfig;
use crate::sampling::SlideshowWeights;
use crate::timer::TimerConfig;
use crate::wake::WakeManager;

const DEFAULT_CONFIG_INI: &str = include_str!("../config.ini");

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // [Viewer]
    pub sort_mode: SortMode,
    pub sort_seed: String,
    pub batch_size: usize,
    pub cache_capacity: usize,
    pub prefetch_ahead: usize,
    pub prefetch_behind: usize,
    pub decode_images: bool,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub loading_debounce_ms: u64,
    pub throttle_ms: u64,

    // [Timer]
    /// Last auto-advance duration, 0 when the timer was never used.
    pub last_timer_ms: u64,
    pub settle_delay_ms: u64,
    pub manual_pause_ceiling_ms: u64,
    pub fade_threshold_ms: u64,
    pub wake_lock: bool,

    // [Gestures]
    pub gestures: GestureConfig,

    // [Slideshow]
    pub same_set_weight: f64,
    pub same_folder_weight: f64,

    // [Shortcuts]
    pub keymap: KeyMap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sort_mode: SortMode::Random,
            sort_seed: "default".to_string(),
            batch_size: 12,
            cache_capacity: 20,
            prefetch_ahead: 3,
            prefetch_behind: 1,
            decode_images: false,
            max_retries: 3,
            backoff_ms: 200,
            loading_debounce_ms: 140,
            throttle_ms: 50,
            last_timer_ms: 0,
            settle_delay_ms: 300,
            manual_pause_ceiling_ms: 60_000,
            fade_threshold_ms: 500,
            wake_lock: true,
            gestures: GestureConfig::default(),
            same_set_weight: 0.1,
            same_folder_weight: 0.5,
            keymap: KeyMap::with_defaults(),
        }
    }
}

impl Config {
    /// Per-user config directory, created on demand.
    fn config_dir() -> PathBuf {
        let dir = directories::ProjectDirs::from("", "", "set-viewer")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let _ = fs::create_dir_all(&dir);
        dir
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.ini")
    }

    /// Load configuration from the user config dir.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, writing the template there on first run.
    ///
    /// A file that differs from the template is rewritten so bindings for newly
    /// added actions show up in it.
    pub fn load_from(path: &Path) -> Self {
        let mut created_from_template = false;
        if !path.exists() {
            match fs::write(path, DEFAULT_CONFIG_INI) {
                Ok(()) => created_from_template = true,
                Err(e) => {
                    warn!("Could not write config template to {}: {}", path.display(), e);
                    return Self::parse_ini(DEFAULT_CONFIG_INI);
                }
            }
        }

        match fs::read_to_string(path) {
            Ok(content) => {
                let is_template_copy = content == DEFAULT_CONFIG_INI;
                let config = Self::parse_ini(&content);
                if !created_from_template && !is_template_copy {
                    if let Err(e) = config.save_to(path) {
                        warn!("Could not update {}: {}", path.display(), e);
                    }
                }
                config
            }
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                Self::parse_ini(DEFAULT_CONFIG_INI)
            }
        }
    }

    /// Parse INI content. Unknown keys are ignored, out-of-range values clamped.
    pub fn parse_ini(content: &str) -> Self {
        let mut config = Config {
            keymap: KeyMap::empty(),
            ..Config::default()
        };

        let mut in_viewer = false;
        let mut in_timer = false;
        let mut in_gestures = false;
        let mut in_slideshow = false;
        let mut in_shortcuts = false;

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let section = line[1..line.len() - 1].trim().to_lowercase();
                in_viewer = section == "viewer";
                in_timer = section == "timer";
                in_gestures = section == "gestures";
                in_slideshow = section == "slideshow";
                in_shortcuts = section == "shortcuts";
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if in_viewer {
                config.apply_viewer_key(&key, value);
            } else if in_timer {
                config.apply_timer_key(&key, value);
            } else if in_gestures {
                config.apply_gesture_key(&key, value);
            } else if in_slideshow {
                match key.as_str() {
                    "same_set_weight" | "same_set" => {
                        if let Ok(v) = value.parse::<f64>() {
                            config.same_set_weight = v.clamp(0.0, 1.0);
                        }
                    }
                    "same_folder_weight" | "same_folder" => {
                        if let Ok(v) = value.parse::<f64>() {
                            config.same_folder_weight = v.clamp(0.0, 1.0);
                        }
                    }
                    _ => {}
                }
            } else if in_shortcuts {
                let Some(action) = Action::from_str(&key) else {
                    debug!("Unknown shortcut action '{}'", key);
                    continue;
                };
                for binding_str in value.split(',') {
                    if let Some(binding) = parse_input_binding(binding_str) {
                        config.keymap.add_binding(binding, action);
                    } else if !binding_str.trim().is_empty() {
                        debug!("Unrecognized binding '{}' for {}", binding_str.trim(), action.as_str());
                    }
                }
            }
        }

        config.keymap.fill_missing_defaults();
        config
    }

    fn apply_viewer_key(&mut self, key: &str, value: &str) {
        match key {
            "sort_mode" | "sort" => {
                if let Some(mode) = SortMode::from_str(value) {
                    self.sort_mode = mode;
                }
            }
            "sort_seed" | "seed" => {
                if !value.is_empty() {
                    self.sort_seed = value.to_string();
                }
            }
            "batch_size" => {
                if let Ok(v) = value.parse::<usize>() {
                    self.batch_size = v.clamp(1, 500);
                }
            }
            "cache_capacity" | "cache_size" => {
                if let Ok(v) = value.parse::<usize>() {
                    self.cache_capacity = v.clamp(1, 500);
                }
            }
            "prefetch_ahead" => {
                if let Ok(v) = value.parse::<usize>() {
                    self.prefetch_ahead = v.min(16);
                }
            }
            "prefetch_behind" => {
                if let Ok(v) = value.parse::<usize>() {
                    self.prefetch_behind = v.min(16);
                }
            }
            "decode_images" | "decode" => {
                if let Some(v) = parse_bool(value) {
                    self.decode_images = v;
                }
            }
            "max_retries" | "retries" => {
                if let Ok(v) = value.parse::<u32>() {
                    self.max_retries = v.min(10);
                }
            }
            "backoff_ms" => {
                if let Ok(v) = value.parse::<u64>() {
                    self.backoff_ms = v.clamp(10, 10_000);
                }
            }
            "loading_debounce_ms" => {
                if let Ok(v) = value.parse::<u64>() {
                    self.loading_debounce_ms = v.min(5_000);
                }
            }
            "throttle_ms" | "navigation_throttle_ms" => {
                if let Ok(v) = value.parse::<u64>() {
                    self.throttle_ms = v.min(1_000);
                }
            }
            _ => {}
        }
    }

    fn apply_timer_key(&mut self, key: &str, value: &str) {
        match key {
            "last_timer_ms" | "timer_ms" => {
                if let Ok(v) = value.parse::<u64>() {
                    self.last_timer_ms = v;
                }
            }
            "settle_delay_ms" => {
                if let Ok(v) = value.parse::<u64>() {
                    self.settle_delay_ms = v.min(10_000);
                }
            }
            "manual_pause_ceiling_ms" | "pause_ceiling_ms" => {
                if let Ok(v) = value.parse::<u64>() {
                    self.manual_pause_ceiling_ms = v.max(1_000);
                }
            }
            "fade_threshold_ms" | "fade_ms" => {
                if let Ok(v) = value.parse::<u64>() {
                    self.fade_threshold_ms = v.min(10_000);
                }
            }
            "wake_lock" | "keep_awake" => {
                if let Some(v) = parse_bool(value) {
                    self.wake_lock = v;
                }
            }
            _ => {}
        }
    }

    fn apply_gesture_key(&mut self, key: &str, value: &str) {
        let g = &mut self.gestures;
        if key == "double_tap_ms" {
            if let Ok(v) = value.parse::<u64>() {
                g.double_tap_window = Duration::from_millis(v.clamp(50, 2_000));
            }
            return;
        }
        let Ok(v) = value.parse::<f32>() else {
            return;
        };
        match key {
            "swipe_hint_px" => g.swipe_hint_px = v.max(0.0),
            "swipe_commit_px" => g.swipe_commit_px = v.max(1.0),
            "swipe_zoom_limit" => g.swipe_zoom_limit = v.clamp(1.0, 4.0),
            "edge_tap_px" => g.edge_tap_px = v.max(0.0),
            "tap_slop_px" => g.tap_slop_px = v.max(0.0),
            "double_tap_slop_px" => g.double_tap_slop_px = v.max(0.0),
            "double_tap_zoom" => g.double_tap_zoom = v.clamp(1.0, 20.0),
            "one_hand_zoom_px" => g.one_hand_zoom_px = v.max(1.0),
            "wheel_sensitivity" => g.wheel_sensitivity = v.clamp(0.0001, 0.1),
            "max_zoom_percent" => g.max_zoom_percent = v.clamp(100.0, 10_000.0),
            _ => {}
        }
    }

    /// Save configuration to the user config dir.
    pub fn save(&self) {
        let path = Self::config_path();
        if let Err(e) = self.save_to(&path) {
            warn!("Could not save {}: {}", path.display(), e);
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, self.to_ini())
    }

    /// Render the commented INI file.
    pub fn to_ini(&self) -> String {
        let g = &self.gestures;
        let mut content = String::new();
        content.push_str("; set-viewer configuration\n");
        content.push_str("; Lines starting with ';' or '#' are comments.\n\n");

        content.push_str("[Viewer]\n");
        content.push_str("; random or chronological\n");
        content.push_str(&format!("sort_mode = {}\n", self.sort_mode.as_str()));
        content.push_str(&format!("sort_seed = {}\n", self.sort_seed));
        content.push_str("; Images appended per batch at the end of a sample or slideshow\n");
        content.push_str(&format!("batch_size = {}\n", self.batch_size));
        content.push_str(&format!("cache_capacity = {}\n", self.cache_capacity));
        content.push_str(&format!("prefetch_ahead = {}\n", self.prefetch_ahead));
        content.push_str(&format!("prefetch_behind = {}\n", self.prefetch_behind));
        content.push_str(&format!("decode_images = {}\n", self.decode_images));
        content.push_str(&format!("max_retries = {}\n", self.max_retries));
        content.push_str(&format!("backoff_ms = {}\n", self.backoff_ms));
        content.push_str(&format!("loading_debounce_ms = {}\n", self.loading_debounce_ms));
        content.push_str(&format!("throttle_ms = {}\n\n", self.throttle_ms));

        content.push_str("[Timer]\n");
        content.push_str(&format!("last_timer_ms = {}\n", self.last_timer_ms));
        content.push_str(&format!("settle_delay_ms = {}\n", self.settle_delay_ms));
        content.push_str("; A manual pause longer than this stops the timer\n");
        content.push_str(&format!("manual_pause_ceiling_ms = {}\n", self.manual_pause_ceiling_ms));
        content.push_str(&format!("fade_threshold_ms = {}\n", self.fade_threshold_ms));
        content.push_str(&format!("wake_lock = {}\n\n", self.wake_lock));

        content.push_str("[Gestures]\n");
        content.push_str(&format!("swipe_hint_px = {}\n", g.swipe_hint_px));
        content.push_str(&format!("swipe_commit_px = {}\n", g.swipe_commit_px));
        content.push_str(&format!("swipe_zoom_limit = {}\n", g.swipe_zoom_limit));
        content.push_str(&format!("edge_tap_px = {}\n", g.edge_tap_px));
        content.push_str(&format!("tap_slop_px = {}\n", g.tap_slop_px));
        content.push_str(&format!("double_tap_ms = {}\n", g.double_tap_window.as_millis()));
        content.push_str(&format!("double_tap_slop_px = {}\n", g.double_tap_slop_px));
        content.push_str(&format!("double_tap_zoom = {}\n", g.double_tap_zoom));
        content.push_str(&format!("one_hand_zoom_px = {}\n", g.one_hand_zoom_px));
        content.push_str(&format!("wheel_sensitivity = {}\n", g.wheel_sensitivity));
        content.push_str(&format!("max_zoom_percent = {}\n\n", g.max_zoom_percent));

        content.push_str("[Slideshow]\n");
        content.push_str(&format!("same_set_weight = {}\n", self.same_set_weight));
        content.push_str(&format!("same_folder_weight = {}\n\n", self.same_folder_weight));

        content.push_str("[Shortcuts]\n");
        content.push_str("; Format: action = key1, key2, ...\n");
        content.push_str("; Modifiers: ctrl+, shift+, alt+\n");
        for line in self.keymap.to_ini_lines() {
            content.push_str(&line);
            content.push('\n');
        }

        content
    }

    pub fn sort_settings(&self) -> SortSettings {
        SortSettings {
            mode: self.sort_mode,
            seed: self.sort_seed.clone(),
        }
    }

    pub fn slideshow_weights(&self) -> SlideshowWeights {
        SlideshowWeights {
            same_set: self.same_set_weight,
            same_folder: self.same_folder_weight,
        }
    }

    pub fn navigation_config(&self) -> NavigationConfig {
        NavigationConfig {
            batch_size: self.batch_size,
            throttle: Duration::from_millis(self.throttle_ms),
            weights: self.slideshow_weights(),
            sort: self.sort_settings(),
        }
    }

    pub fn media_cache_config(&self) -> MediaCacheConfig {
        MediaCacheConfig {
            capacity: self.cache_capacity,
            prefetch_ahead: self.prefetch_ahead,
            prefetch_behind: self.prefetch_behind,
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.backoff_ms),
            decode_images: self.decode_images,
            loading_debounce: Duration::from_millis(self.loading_debounce_ms),
        }
    }

    pub fn timer_config(&self) -> TimerConfig {
        TimerConfig {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            manual_pause_ceiling: Duration::from_millis(self.manual_pause_ceiling_ms),
            fade_threshold: Duration::from_millis(self.fade_threshold_ms),
        }
    }

    pub fn gesture_config(&self) -> GestureConfig {
        self.gestures.clone()
    }

    pub fn wake_manager(&self) -> WakeManager {
        if self.wake_lock {
            WakeManager::platform()
        } else {
            WakeManager::disabled()
        }
    }

    pub fn last_timer_duration(&self) -> Duration {
        Duration::from_millis(self.last_timer_ms)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{InputBinding, Key, Modifiers};

    #[test]
    fn template_matches_defaults() {
        let parsed = Config::parse_ini(DEFAULT_CONFIG_INI);
        let defaults = Config::default();
        assert_eq!(parsed.sort_mode, defaults.sort_mode);
        assert_eq!(parsed.batch_size, defaults.batch_size);
        assert_eq!(parsed.cache_capacity, defaults.cache_capacity);
        assert_eq!(parsed.gestures, defaults.gestures);
        assert_eq!(parsed.timer_config(), defaults.timer_config());
        for action in Action::ALL {
            assert_eq!(parsed.keymap.get_bindings(action), defaults.keymap.get_bindings(action));
        }
    }

    #[test]
    fn values_are_clamped_and_aliases_accepted() {
        let config = Config::parse_ini(
            "[Viewer]\nsort = chrono\ncache_size = 0\nbatch_size = 100000\ndecode = yes\n\
             [Gestures]\nmax_zoom_percent = 5\n[Slideshow]\nsame_set = 3\n",
        );
        assert_eq!(config.sort_mode, SortMode::Chronological);
        assert_eq!(config.cache_capacity, 1);
        assert_eq!(config.batch_size, 500);
        assert!(config.decode_images);
        assert_eq!(config.gestures.max_zoom_percent, 100.0);
        assert_eq!(config.same_set_weight, 1.0);
    }

    #[test]
    fn missing_shortcuts_get_defaults() {
        let config = Config::parse_ini("[Shortcuts]\nnext_image = ctrl+n\n");
        assert_eq!(
            config.keymap.action_for(&InputBinding::KeyWithCtrl(Key::N)),
            Some(Action::NextImage)
        );
        // A configured action does not get its default keys back.
        assert_eq!(config.keymap.action_for_name("right", Modifiers::NONE), None);
        assert_eq!(config.keymap.action_for_name("escape", Modifiers::NONE), Some(Action::Close));
    }

    #[test]
    fn first_load_writes_template_and_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");

        let config = Config::load_from(&path);
        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG_INI);
        assert_eq!(config.last_timer_ms, 0);

        let mut config = config;
        config.last_timer_ms = 7_500;
        config.sort_seed = "holiday".to_string();
        config.wake_lock = false;
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path);
        assert_eq!(reloaded.last_timer_duration(), Duration::from_millis(7_500));
        assert_eq!(reloaded.sort_settings().seed, "holiday");
        assert!(!reloaded.wake_lock);
        assert_eq!(reloaded.gestures, config.gestures);
    }
}
