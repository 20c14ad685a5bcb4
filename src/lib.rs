//! Navigation, sampling and media-delivery engine for a full-screen photo
//! set viewer.
//!
//! The UI layer drives a [`Viewer`]: it feeds keys, pointer events and
//! clock ticks in, and reads a [`ViewerSnapshot`] plus [`ViewerEvent`]s
//! back out. Set listings and image bytes come from collaborators
//! implementing [`SetSource`] and [`FetchBytes`].

pub mod config;
pub mod error;
pub mod gesture;
pub mod input;
pub mod media_cache;
pub mod model;
pub mod navigation;
pub mod sampling;
pub mod source;
pub mod timer;
pub mod viewer;
pub mod wake;

pub use config::Config;
pub use error::{FetchError, Result, SourceError, ViewerError, WakeLockError};
pub use gesture::{GestureConfig, GestureInterpreter, Intent, Point, PointerEvent, Size};
pub use input::{Action, KeyMap, Modifiers};
pub use media_cache::{MediaCache, MediaCacheConfig, MediaHandle};
pub use model::{ContextKind, ImageDescriptor, ImageId, SetId, SetOrder, SetRef, SortMode, ViewContext, ViewItem};
pub use navigation::{Counts, NavEvent, NavOutcome, NavigationConfig, NavigationController};
pub use source::{FetchBytes, LocalFolderSource, SetSource};
pub use timer::{TimerController, TimerPhase, TimerSignal};
pub use viewer::{Viewer, ViewerEvent, ViewerSnapshot};
