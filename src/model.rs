//! Core data model: image descriptors, set metadata and view contexts.

use chrono::{DateTime, Utc};
use hashbrown::HashSet;

pub type ImageId = String;
pub type SetId = String;

/// Immutable description of one image inside a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub id: ImageId,
    pub name: String,
    pub folder_path: String,
    pub created_time: Option<DateTime<Utc>>,
    pub exif_time: Option<DateTime<Utc>>,
}

impl ImageDescriptor {
    pub fn new(id: impl Into<ImageId>, name: impl Into<String>, folder_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            folder_path: folder_path.into(),
            created_time: None,
            exif_time: None,
        }
    }

    pub fn with_created_time(mut self, time: DateTime<Utc>) -> Self {
        self.created_time = Some(time);
        self
    }

    pub fn with_exif_time(mut self, time: DateTime<Utc>) -> Self {
        self.exif_time = Some(time);
        self
    }

    /// Capture time if known, falling back to the upload/creation time.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.exif_time.or(self.created_time)
    }
}

/// How an image is classified inside its set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    Favorite,
    NonFavorite,
    Hidden,
}

/// Set metadata owned by the metadata collaborator. Read-only here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetRef {
    pub id: SetId,
    pub name: String,
    pub favorite_ids: HashSet<ImageId>,
    pub hidden_ids: HashSet<ImageId>,
    pub image_count: Option<usize>,
}

impl SetRef {
    pub fn new(id: impl Into<SetId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorite_ids.contains(id)
    }

    pub fn is_hidden(&self, id: &str) -> bool {
        self.hidden_ids.contains(id)
    }

    /// Hidden wins over favorite: a hidden favorite only shows up in the hidden view.
    pub fn classify(&self, id: &str) -> Membership {
        if self.is_hidden(id) {
            Membership::Hidden
        } else if self.is_favorite(id) {
            Membership::Favorite
        } else {
            Membership::NonFavorite
        }
    }
}

/// An image together with the set it was drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewItem {
    pub image: ImageDescriptor,
    pub set_id: SetId,
}

impl ViewItem {
    pub fn new(image: ImageDescriptor, set_id: impl Into<SetId>) -> Self {
        Self {
            image,
            set_id: set_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.image.id
    }
}

/// Ordering of a single-set context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOrder {
    Original,
    Random,
    Chronological,
}

/// The logical collection being browsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKind {
    /// One set. `context_set_id` is set when the set differs from the globally
    /// active one (e.g. after a chronological peek from a slideshow).
    Set {
        context_set_id: Option<SetId>,
        order: SetOrder,
    },
    Sample,
    Favorites,
    NonFavorites,
    Hidden,
    Slideshow {
        set_ids: Vec<SetId>,
    },
}

/// Payload-free discriminant of [`ContextKind`], used as a registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    Set,
    Sample,
    Favorites,
    NonFavorites,
    Hidden,
    Slideshow,
}

impl ContextKind {
    pub fn tag(&self) -> KindTag {
        match self {
            ContextKind::Set { .. } => KindTag::Set,
            ContextKind::Sample => KindTag::Sample,
            ContextKind::Favorites => KindTag::Favorites,
            ContextKind::NonFavorites => KindTag::NonFavorites,
            ContextKind::Hidden => KindTag::Hidden,
            ContextKind::Slideshow { .. } => KindTag::Slideshow,
        }
    }

    pub fn default_label(&self) -> &'static str {
        match self {
            ContextKind::Set { .. } => "Set",
            ContextKind::Sample => "Sample",
            ContextKind::Favorites => "Favorites",
            ContextKind::NonFavorites => "Non-favorites",
            ContextKind::Hidden => "Hidden",
            ContextKind::Slideshow { .. } => "Slideshow",
        }
    }

    pub fn context_set_id(&self) -> Option<&str> {
        match self {
            ContextKind::Set { context_set_id, .. } => context_set_id.as_deref(),
            _ => None,
        }
    }
}

/// The collection and cursor the viewer is currently showing.
///
/// Items are append-only once the context is open, so indices stay stable
/// while navigating forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewContext {
    pub kind: ContextKind,
    pub label: String,
    items: Vec<ViewItem>,
    current_index: Option<usize>,
}

impl ViewContext {
    /// Build a context. An out-of-range `index` is treated as "no image open".
    pub fn new(kind: ContextKind, items: Vec<ViewItem>, index: Option<usize>, label: impl Into<String>) -> Self {
        let current_index = index.filter(|&i| i < items.len());
        Self {
            kind,
            label: label.into(),
            items,
            current_index,
        }
    }

    pub fn items(&self) -> &[ViewItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current(&self) -> Option<&ViewItem> {
        self.current_index.and_then(|i| self.items.get(i))
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current().map(ViewItem::id)
    }

    pub fn is_at_end(&self) -> bool {
        match self.current_index {
            Some(i) => i + 1 >= self.items.len(),
            None => true,
        }
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position_of(id).is_some()
    }

    /// Move the cursor. Returns false (and leaves the cursor alone) when out of range.
    pub fn set_index(&mut self, index: usize) -> bool {
        if index < self.items.len() {
            self.current_index = Some(index);
            true
        } else {
            false
        }
    }

    /// Append items and return the index of the first appended one.
    pub fn append(&mut self, items: Vec<ViewItem>) -> Option<usize> {
        if items.is_empty() {
            return None;
        }
        let first = self.items.len();
        self.items.extend(items);
        Some(first)
    }
}

/// Snapshot pushed when entering a derived context, restored by "back".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub context: ViewContext,
    pub image_id: Option<ImageId>,
}

impl HistoryEntry {
    pub fn capture(context: &ViewContext) -> Self {
        Self {
            image_id: context.current_id().map(str::to_owned),
            context: context.clone(),
        }
    }

    pub fn index(&self) -> Option<usize> {
        self.context.current_index()
    }

    pub fn context_set_id(&self) -> Option<&str> {
        self.context.kind.context_set_id()
    }
}

/// Global ordering used for favorites/non-favorites/hidden pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortMode {
    Random,
    Chronological,
}

impl SortMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "random" | "shuffle" | "seeded" => Some(Self::Random),
            "chronological" | "chrono" | "time" | "date" => Some(Self::Chronological),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Chronological => "chronological",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSettings {
    pub mode: SortMode,
    pub seed: String,
}

impl Default for SortSettings {
    fn default() -> Self {
        Self {
            mode: SortMode::Random,
            seed: "default".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> ViewItem {
        ViewItem::new(ImageDescriptor::new(id, format!("{id}.jpg"), "/a"), "s1")
    }

    #[test]
    fn out_of_range_index_means_no_image_open() {
        let ctx = ViewContext::new(ContextKind::Sample, vec![item("a")], Some(3), "Sample");
        assert_eq!(ctx.current_index(), None);
        assert!(ctx.is_at_end());
    }

    #[test]
    fn append_keeps_existing_indices() {
        let mut ctx = ViewContext::new(ContextKind::Sample, vec![item("a"), item("b")], Some(1), "Sample");
        let first = ctx.append(vec![item("c")]);
        assert_eq!(first, Some(2));
        assert_eq!(ctx.current_id(), Some("b"));
        assert!(!ctx.is_at_end());
        assert!(ctx.append(Vec::new()).is_none());
    }

    #[test]
    fn hidden_wins_over_favorite() {
        let mut set = SetRef::new("s1", "Set one");
        set.favorite_ids.insert("a".into());
        set.hidden_ids.insert("a".into());
        set.favorite_ids.insert("b".into());
        assert_eq!(set.classify("a"), Membership::Hidden);
        assert_eq!(set.classify("b"), Membership::Favorite);
        assert_eq!(set.classify("c"), Membership::NonFavorite);
    }

    #[test]
    fn set_refs_compare_by_membership_content() {
        let mut a = SetRef::new("s1", "Set one");
        a.favorite_ids.extend(["x", "y"].map(String::from));
        let mut b = SetRef::new("s1", "Set one");
        b.favorite_ids.extend(["y", "x"].map(String::from));
        assert_eq!(a, b);
        b.hidden_ids.insert("x".into());
        assert_ne!(a, b);
    }
}
