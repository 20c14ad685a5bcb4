//! Collaborator seams: where set listings and image bytes come from.
//!
//! The engine only talks to these traits. [`LocalFolderSource`] implements
//! both on top of a directory tree and backs the headless binary and tests.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use jwalk::WalkDir;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{FetchError, SourceError};
use crate::model::{ImageDescriptor, SetId, SetRef};
use crate::sampling::compare_natural;

/// Supported image extensions
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tiff", "tif"];

/// Check if a file is a supported image
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Set listings and set metadata.
pub trait SetSource: Send + Sync + 'static {
    /// Ordered image list of a set. `build_if_missing` asks the backend to
    /// materialize a listing it has not built yet.
    fn resolve_set_images(
        &self,
        set_id: &str,
        build_if_missing: bool,
    ) -> impl Future<Output = Result<Vec<ImageDescriptor>, SourceError>> + Send;

    /// Next page of the set's listing after the first `loaded` images.
    /// An empty result means there is nothing more.
    fn load_more(
        &self,
        set_id: &str,
        loaded: usize,
    ) -> impl Future<Output = Result<Vec<ImageDescriptor>, SourceError>> + Send;

    fn toggle_favorite(&self, set_id: &str, image_id: &str);

    fn toggle_hidden(&self, set_id: &str, image_id: &str);

    fn set_ref(&self, set_id: &str) -> Option<SetRef>;
}

/// Byte-level media fetch primitive used by the media cache.
pub trait FetchBytes: Send + Sync + 'static {
    fn fetch_bytes(&self, id: &str) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

#[derive(Debug, Clone)]
struct ScannedSet {
    meta: SetRef,
    images: Vec<ImageDescriptor>,
}

/// Directory-backed source: every immediate sub-directory of `root` is a set
/// (or `root` itself when it has none). Image ids are paths relative to `root`.
pub struct LocalFolderSource {
    root: PathBuf,
    page_size: usize,
    sets: RwLock<HashMap<SetId, ScannedSet>>,
    order: Vec<SetId>,
}

impl LocalFolderSource {
    /// Default number of images handed out per `load_more` page.
    pub const DEFAULT_PAGE_SIZE: usize = 200;

    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SourceError::Other(format!("not a directory: {}", root.display())));
        }

        let mut set_dirs: Vec<PathBuf> = WalkDir::new(&root)
            .min_depth(1)
            .max_depth(1)
            .skip_hidden(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.path())
            .collect();
        set_dirs.sort_by(|a, b| compare_natural(&file_name(a), &file_name(b)));
        if set_dirs.is_empty() {
            set_dirs.push(root.clone());
        }

        let mut sets = HashMap::new();
        let mut order = Vec::with_capacity(set_dirs.len());
        for dir in set_dirs {
            let set_id = if dir == root { ".".to_string() } else { file_name(&dir) };
            let images = scan_images(&root, &dir);
            let mut meta = SetRef::new(set_id.clone(), set_id.clone());
            meta.image_count = Some(images.len());
            debug!("Scanned set {} ({} images)", set_id, images.len());
            order.push(set_id.clone());
            sets.insert(set_id, ScannedSet { meta, images });
        }
        info!("Opened {} with {} set(s)", root.display(), order.len());

        Ok(Self {
            root,
            page_size: Self::DEFAULT_PAGE_SIZE,
            sets: RwLock::new(sets),
            order,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Set ids in natural order of their folder names.
    pub fn set_ids(&self) -> Vec<SetId> {
        self.order.clone()
    }

    /// Total number of images across all sets.
    pub fn image_count(&self) -> usize {
        self.sets.read().values().map(|s| s.images.len()).sum()
    }

    fn rescan(&self, set_id: &str) -> Option<Vec<ImageDescriptor>> {
        let dir = if set_id == "." { self.root.clone() } else { self.root.join(set_id) };
        if !dir.is_dir() {
            return None;
        }
        let images = scan_images(&self.root, &dir);
        let mut sets = self.sets.write();
        let entry = sets.entry(set_id.to_string()).or_insert_with(|| ScannedSet {
            meta: SetRef::new(set_id, set_id),
            images: Vec::new(),
        });
        entry.meta.image_count = Some(images.len());
        entry.images = images.clone();
        Some(images)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

fn relative_id(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn scan_images(root: &Path, dir: &Path) -> Vec<ImageDescriptor> {
    let mut images: Vec<ImageDescriptor> = WalkDir::new(dir)
        .skip_hidden(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_supported_image(&entry.path()))
        .map(|entry| {
            let path = entry.path();
            let folder = path.parent().map(|p| relative_id(root, p)).unwrap_or_default();
            let mut image = ImageDescriptor::new(relative_id(root, &path), file_name(&path), folder);
            if let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) {
                image = image.with_created_time(DateTime::<Utc>::from(modified));
            }
            image
        })
        .collect();

    images.sort_by(|a, b| {
        compare_natural(&a.folder_path, &b.folder_path).then_with(|| compare_natural(&a.name, &b.name))
    });
    images
}

impl SetSource for LocalFolderSource {
    async fn resolve_set_images(
        &self,
        set_id: &str,
        build_if_missing: bool,
    ) -> Result<Vec<ImageDescriptor>, SourceError> {
        if let Some(set) = self.sets.read().get(set_id) {
            return Ok(set.images.clone());
        }
        if build_if_missing {
            if let Some(images) = self.rescan(set_id) {
                return Ok(images);
            }
        }
        Err(SourceError::UnknownSet(set_id.to_string()))
    }

    async fn load_more(&self, set_id: &str, loaded: usize) -> Result<Vec<ImageDescriptor>, SourceError> {
        let sets = self.sets.read();
        let set = sets
            .get(set_id)
            .ok_or_else(|| SourceError::UnknownSet(set_id.to_string()))?;
        Ok(set
            .images
            .iter()
            .skip(loaded)
            .take(self.page_size)
            .cloned()
            .collect())
    }

    fn toggle_favorite(&self, set_id: &str, image_id: &str) {
        if let Some(set) = self.sets.write().get_mut(set_id) {
            if !set.meta.favorite_ids.remove(image_id) {
                set.meta.favorite_ids.insert(image_id.to_string());
            }
        }
    }

    fn toggle_hidden(&self, set_id: &str, image_id: &str) {
        if let Some(set) = self.sets.write().get_mut(set_id) {
            if !set.meta.hidden_ids.remove(image_id) {
                set.meta.hidden_ids.insert(image_id.to_string());
            }
        }
    }

    fn set_ref(&self, set_id: &str) -> Option<SetRef> {
        self.sets.read().get(set_id).map(|s| s.meta.clone())
    }
}

impl FetchBytes for LocalFolderSource {
    async fn fetch_bytes(&self, id: &str) -> Result<Bytes, FetchError> {
        let path = self.root.join(id);
        let read = tokio::task::spawn_blocking(move || std::fs::read(path))
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?;
        match read {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FetchError::NotFound(id.to_string())),
            Err(e) => Err(FetchError::Other(e.to_string())),
        }
    }
}
