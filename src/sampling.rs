//! Orderings and batch pickers over image lists.
//!
//! Everything here is pure with respect to I/O: callers pass the registries
//! and random source explicitly, and get new values back.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use hashbrown::{HashMap, HashSet};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::model::{
    ImageDescriptor, ImageId, KindTag, Membership, SetId, SetRef, SortMode, SortSettings, ViewItem,
};

/// Above this many items shuffle keys are hashed on the rayon pool.
const PARALLEL_KEY_THRESHOLD: usize = 2048;

/// Registry key used for the cross-set slideshow pool.
pub const SLIDESHOW_POOL_KEY: &str = "*slideshow*";

/// Anything that carries an [`ImageDescriptor`].
pub trait AsImage {
    fn image(&self) -> &ImageDescriptor;
}

impl AsImage for ImageDescriptor {
    fn image(&self) -> &ImageDescriptor {
        self
    }
}

impl AsImage for ViewItem {
    fn image(&self) -> &ImageDescriptor {
        &self.image
    }
}

fn shuffle_key(seed: &str, id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b"|");
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Deterministic permutation keyed by `hash(seed + "|" + id)`, ties broken by id.
pub fn seeded_shuffle<T>(items: &[T], seed: &str) -> Vec<T>
where
    T: AsImage + Clone + Sync,
{
    let mut keyed: Vec<(u64, &T)> = if items.len() >= PARALLEL_KEY_THRESHOLD {
        items
            .par_iter()
            .map(|item| (shuffle_key(seed, &item.image().id), item))
            .collect()
    } else {
        items
            .iter()
            .map(|item| (shuffle_key(seed, &item.image().id), item))
            .collect()
    };

    keyed.sort_by(|(ka, a), (kb, b)| ka.cmp(kb).then_with(|| a.image().id.cmp(&b.image().id)));
    keyed.into_iter().map(|(_, item)| item.clone()).collect()
}

/// Numeric-aware, case-insensitive name comparison (`img2` < `img10`).
pub fn compare_natural(a: &str, b: &str) -> Ordering {
    natord::compare_ignore_case(a, b).then_with(|| a.cmp(b))
}

/// `(exifTime ?? createdTime ?? name)` ascending. Timestamped images come first.
fn compare_chronological(a: &ImageDescriptor, b: &ImageDescriptor) -> Ordering {
    let by_time = match (a.timestamp(), b.timestamp()) {
        (Some(ta), Some(tb)) => ta.cmp(&tb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_time
        .then_with(|| compare_natural(&a.name, &b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Group by folder, sort each group by time, then interleave groups by
/// their earliest element (not lexically by path).
pub fn chronological_order<T>(items: &[T]) -> Vec<T>
where
    T: AsImage + Clone,
{
    let mut by_folder: HashMap<&str, Vec<&T>> = HashMap::new();
    for item in items {
        by_folder
            .entry(item.image().folder_path.as_str())
            .or_default()
            .push(item);
    }

    let mut groups: Vec<(&str, Vec<&T>)> = by_folder.into_iter().collect();
    for (_, group) in groups.iter_mut() {
        group.sort_by(|a, b| compare_chronological(a.image(), b.image()));
    }
    groups.sort_by(|(path_a, a), (path_b, b)| {
        let first = match (a.first(), b.first()) {
            (Some(x), Some(y)) => compare_chronological(x.image(), y.image()),
            _ => Ordering::Equal,
        };
        first.then_with(|| compare_natural(path_a, path_b))
    });

    groups
        .into_iter()
        .flat_map(|(_, group)| group.into_iter().cloned())
        .collect()
}

/// Order-independent fingerprint of a pool's membership.
fn pool_fingerprint<T: AsImage>(pool: &[T]) -> u64 {
    let mut acc: u64 = pool.len() as u64;
    for item in pool {
        let mut hasher = DefaultHasher::new();
        item.image().id.hash(&mut hasher);
        acc = acc.wrapping_add(hasher.finish());
    }
    acc
}

#[derive(Debug, Clone, Default)]
struct SeenEntry {
    fingerprint: u64,
    seen: HashSet<ImageId>,
}

/// Per `(set, view kind)` memory of which images were already served this cycle.
#[derive(Debug, Clone, Default)]
pub struct SeenRegistry {
    entries: HashMap<(SetId, KindTag), SeenEntry>,
}

impl SeenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen_count(&self, set_id: &str, kind: KindTag) -> usize {
        self.entries
            .get(&(set_id.to_string(), kind))
            .map_or(0, |e| e.seen.len())
    }

    pub fn has_seen(&self, set_id: &str, kind: KindTag, id: &str) -> bool {
        self.entries
            .get(&(set_id.to_string(), kind))
            .is_some_and(|e| e.seen.contains(id))
    }

    /// Forget everything served for `kind` (the kind's tab was re-entered).
    pub fn clear_kind(&mut self, kind: KindTag) {
        self.entries.retain(|(_, k), _| *k != kind);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Seen-set for `key`, reconciled against `pool`.
    ///
    /// When the pool's membership changed, ids no longer in the pool are
    /// dropped (a completely different list therefore clears the entry).
    fn prepare<T: AsImage>(&mut self, set_id: &str, kind: KindTag, pool: &[T]) -> &mut HashSet<ImageId> {
        let fingerprint = pool_fingerprint(pool);
        let entry = self.entries.entry((set_id.to_string(), kind)).or_default();
        if entry.fingerprint != fingerprint {
            let ids: HashSet<&str> = pool.iter().map(|item| item.image().id.as_str()).collect();
            entry.seen.retain(|id| ids.contains(id.as_str()));
            entry.fingerprint = fingerprint;
        }
        &mut entry.seen
    }
}

fn distinct_ids<T: AsImage>(pool: &[T]) -> usize {
    pool.iter()
        .map(|item| item.image().id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Draw up to `count` images not yet served this cycle, uniformly without
/// replacement. Wraps (clears the cycle) only once the whole pool was served.
pub fn pick_next_batch<T, R>(
    set_id: &str,
    kind: KindTag,
    pool: &[T],
    count: usize,
    registry: &mut SeenRegistry,
    rng: &mut R,
) -> Vec<T>
where
    T: AsImage + Clone,
    R: Rng + ?Sized,
{
    if pool.is_empty() || count == 0 {
        return Vec::new();
    }
    let distinct = distinct_ids(pool);
    let seen = registry.prepare(set_id, kind, pool);

    let mut batch: Vec<T> = Vec::with_capacity(count.min(distinct));
    let mut taken: HashSet<&str> = HashSet::new();

    while batch.len() < count && taken.len() < distinct {
        if seen.len() >= distinct {
            seen.clear();
        }
        let mut candidates: Vec<&T> = Vec::new();
        let mut offered: HashSet<&str> = HashSet::new();
        for item in pool {
            let id = item.image().id.as_str();
            if !seen.contains(id) && !taken.contains(id) && offered.insert(id) {
                candidates.push(item);
            }
        }
        if candidates.is_empty() {
            break;
        }

        let amount = (count - batch.len()).min(candidates.len());
        for index in rand::seq::index::sample(rng, candidates.len(), amount) {
            let item = candidates[index];
            let id = item.image().id.as_str();
            seen.insert(id.to_string());
            taken.insert(id);
            batch.push(item.clone());
        }
    }

    batch
}

/// Multipliers applied to a candidate's selection weight in the slideshow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideshowWeights {
    /// Candidate comes from the same set as the previous pick.
    pub same_set: f64,
    /// Candidate also sits in the same folder as the previous pick.
    pub same_folder: f64,
}

impl Default for SlideshowWeights {
    fn default() -> Self {
        Self {
            same_set: 0.1,
            same_folder: 0.5,
        }
    }
}

/// The most recent slideshow pick, used to bias the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastPick {
    pub set_id: SetId,
    pub folder_path: String,
}

impl LastPick {
    pub fn of(item: &ViewItem) -> Self {
        Self {
            set_id: item.set_id.clone(),
            folder_path: item.image.folder_path.clone(),
        }
    }
}

fn slideshow_weight(item: &ViewItem, last: Option<&LastPick>, weights: SlideshowWeights) -> f64 {
    let Some(last) = last else {
        return 1.0;
    };
    let mut weight = 1.0;
    if item.set_id == last.set_id {
        weight *= weights.same_set;
        if item.image.folder_path == last.folder_path {
            weight *= weights.same_folder;
        }
    }
    weight.max(0.0)
}

/// Cross-set batch that discourages (but never forbids) back-to-back picks
/// from the same set or the same folder. Same no-repeat cycle semantics as
/// [`pick_next_batch`], keyed under [`SLIDESHOW_POOL_KEY`].
pub fn pick_slideshow_batch<R>(
    pool: &[ViewItem],
    count: usize,
    last: &mut Option<LastPick>,
    registry: &mut SeenRegistry,
    weights: SlideshowWeights,
    rng: &mut R,
) -> Vec<ViewItem>
where
    R: Rng + ?Sized,
{
    if pool.is_empty() || count == 0 {
        return Vec::new();
    }
    let distinct = distinct_ids(pool);
    let seen = registry.prepare(SLIDESHOW_POOL_KEY, KindTag::Slideshow, pool);

    let mut batch: Vec<ViewItem> = Vec::with_capacity(count.min(distinct));
    let mut taken: HashSet<&str> = HashSet::new();

    while batch.len() < count && taken.len() < distinct {
        if seen.len() >= distinct {
            seen.clear();
        }
        let mut candidates: Vec<&ViewItem> = Vec::new();
        let mut offered: HashSet<&str> = HashSet::new();
        for item in pool {
            let id = item.id();
            if !seen.contains(id) && !taken.contains(id) && offered.insert(id) {
                candidates.push(item);
            }
        }
        if candidates.is_empty() {
            break;
        }

        let candidate_weights: Vec<f64> = candidates
            .iter()
            .map(|item| slideshow_weight(item, last.as_ref(), weights))
            .collect();
        let index = match WeightedIndex::new(&candidate_weights) {
            Ok(dist) => dist.sample(rng),
            // Every weight collapsed to zero: fall back to a uniform draw.
            Err(_) => rng.gen_range(0..candidates.len()),
        };

        let item = candidates[index];
        seen.insert(item.id().to_string());
        taken.insert(item.id());
        *last = Some(LastPick::of(item));
        batch.push(item.clone());
    }

    batch
}

/// Cached favorites / non-favorites / hidden orderings for one set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedLists {
    pub mode: SortMode,
    pub seed: String,
    pub favorites: Vec<ImageDescriptor>,
    pub nonfavorites: Vec<ImageDescriptor>,
    pub hidden: Vec<ImageDescriptor>,
}

impl OrderedLists {
    pub fn list(&self, membership: Membership) -> &[ImageDescriptor] {
        match membership {
            Membership::Favorite => &self.favorites,
            Membership::NonFavorite => &self.nonfavorites,
            Membership::Hidden => &self.hidden,
        }
    }
}

fn order_for(items: &[ImageDescriptor], sort: &SortSettings) -> Vec<ImageDescriptor> {
    match sort.mode {
        SortMode::Random => seeded_shuffle(items, &sort.seed),
        SortMode::Chronological => chronological_order(items),
    }
}

fn classified<'a>(images: &'a [ImageDescriptor], set: &SetRef, membership: Membership) -> Vec<&'a ImageDescriptor> {
    images
        .iter()
        .filter(|image| set.classify(&image.id) == membership)
        .collect()
}

fn reconcile_list(
    previous: &[ImageDescriptor],
    current: &[&ImageDescriptor],
    sort: &SortSettings,
) -> Vec<ImageDescriptor> {
    let by_id: HashMap<&str, &ImageDescriptor> = current.iter().map(|image| (image.id.as_str(), *image)).collect();

    let mut kept_ids: HashSet<&str> = HashSet::new();
    let mut out: Vec<ImageDescriptor> = Vec::with_capacity(current.len());
    for old in previous {
        if let Some(fresh) = by_id.get(old.id.as_str()) {
            if kept_ids.insert(fresh.id.as_str()) {
                out.push((*fresh).clone());
            }
        }
    }

    let added: Vec<ImageDescriptor> = current
        .iter()
        .filter(|image| !kept_ids.contains(image.id.as_str()))
        .map(|image| (*image).clone())
        .collect();
    out.extend(order_for(&added, sort));
    out
}

/// Bring a set's cached orderings up to date with a new image list.
///
/// Retained items keep their relative order; newly classified items are
/// appended in fresh order. A sort mode or seed change rebuilds from scratch.
pub fn update_ordered_lists(
    previous: Option<&OrderedLists>,
    images: &[ImageDescriptor],
    set: &SetRef,
    sort: &SortSettings,
) -> OrderedLists {
    let favorites = classified(images, set, Membership::Favorite);
    let nonfavorites = classified(images, set, Membership::NonFavorite);
    let hidden = classified(images, set, Membership::Hidden);

    match previous {
        Some(prev) if prev.mode == sort.mode && prev.seed == sort.seed => OrderedLists {
            mode: sort.mode,
            seed: sort.seed.clone(),
            favorites: reconcile_list(&prev.favorites, &favorites, sort),
            nonfavorites: reconcile_list(&prev.nonfavorites, &nonfavorites, sort),
            hidden: reconcile_list(&prev.hidden, &hidden, sort),
        },
        _ => OrderedLists {
            mode: sort.mode,
            seed: sort.seed.clone(),
            favorites: reconcile_list(&[], &favorites, sort),
            nonfavorites: reconcile_list(&[], &nonfavorites, sort),
            hidden: reconcile_list(&[], &hidden, sort),
        },
    }
}

/// Last computed orderings per set.
#[derive(Debug, Clone, Default)]
pub struct OrderedListCache {
    entries: HashMap<SetId, OrderedLists>,
}

impl OrderedListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, set_id: &str) -> Option<&OrderedLists> {
        self.entries.get(set_id)
    }

    /// Reconcile the cached orderings for `set` against `images`, replacing the entry.
    pub fn refresh(&mut self, set: &SetRef, images: &[ImageDescriptor], sort: &SortSettings) -> &OrderedLists {
        let updated = update_ordered_lists(self.entries.get(&set.id), images, set, sort);
        self.entries.insert(set.id.clone(), updated);
        &self.entries[&set.id]
    }

    /// Sort mode or seed changed.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
