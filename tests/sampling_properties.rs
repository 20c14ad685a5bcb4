mod common;

use std::collections::HashSet;

use common::image;
use rand::rngs::StdRng;
use rand::SeedableRng;
use set_viewer::model::{ImageDescriptor, KindTag, SetRef, SortMode, SortSettings, ViewItem};
use set_viewer::sampling::{
    pick_next_batch, pick_slideshow_batch, seeded_shuffle, update_ordered_lists, SeenRegistry, SlideshowWeights,
};

fn pool(n: usize) -> Vec<ImageDescriptor> {
    (0..n).map(|i| image(&format!("img{i:05}"), "/p")).collect()
}

fn ids(images: &[ImageDescriptor]) -> Vec<String> {
    images.iter().map(|i| i.id.clone()).collect()
}

#[test]
fn large_shuffles_are_deterministic_permutations() {
    // Big enough to take the parallel hashing path.
    let items = pool(5_000);
    let first = seeded_shuffle(&items, "holiday");
    let second = seeded_shuffle(&items, "holiday");
    assert_eq!(ids(&first), ids(&second));

    let unique: HashSet<String> = ids(&first).into_iter().collect();
    assert_eq!(unique.len(), items.len());
    assert_ne!(ids(&first), ids(&items));
    assert_ne!(ids(&first), ids(&seeded_shuffle(&items, "other")));
}

#[test]
fn every_image_is_served_once_before_any_repeat() {
    for seed in 0..8u64 {
        let items = pool(37);
        let mut registry = SeenRegistry::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut served = HashSet::new();
        for _ in 0..items.len() {
            let batch = pick_next_batch("s", KindTag::Sample, &items, 1, &mut registry, &mut rng);
            assert_eq!(batch.len(), 1);
            assert!(served.insert(batch[0].id.clone()), "repeat before exhaustion (seed {seed})");
        }
        assert_eq!(served.len(), items.len());
        // The next draw starts a new cycle.
        assert_eq!(pick_next_batch("s", KindTag::Sample, &items, 1, &mut registry, &mut rng).len(), 1);
        assert_eq!(registry.seen_count("s", KindTag::Sample), 1);
    }
}

#[test]
fn three_item_pool_wraps_only_after_exhaustion() {
    let items = vec![image("A", "/p"), image("B", "/p"), image("C", "/p")];
    let mut registry = SeenRegistry::new();
    let mut rng = StdRng::seed_from_u64(1);

    let first = pick_next_batch("s", KindTag::Sample, &items, 2, &mut registry, &mut rng);
    assert_eq!(first.len(), 2);
    assert_ne!(first[0].id, first[1].id);

    let second = pick_next_batch("s", KindTag::Sample, &items, 2, &mut registry, &mut rng);
    let remaining: Vec<&str> = ["A", "B", "C"]
        .into_iter()
        .filter(|id| !first.iter().any(|i| i.id == *id))
        .collect();
    assert_eq!(second[0].id, remaining[0]);
    assert!(first.iter().any(|i| i.id == second[1].id));
}

#[test]
fn slideshow_batches_cover_every_set() {
    let mut items = Vec::new();
    for set in ["x", "y", "z"] {
        for i in 0..20 {
            items.push(ViewItem::new(image(&format!("{set}{i}"), &format!("/{set}")), set));
        }
    }
    let mut registry = SeenRegistry::new();
    let mut rng = StdRng::seed_from_u64(42);
    let mut last = None;

    let mut served = Vec::new();
    while served.len() < items.len() {
        served.extend(pick_slideshow_batch(
            &items,
            7,
            &mut last,
            &mut registry,
            SlideshowWeights::default(),
            &mut rng,
        ));
    }
    served.truncate(items.len());
    let unique: HashSet<&str> = served.iter().map(ViewItem::id).collect();
    assert_eq!(unique.len(), items.len());

    let same_set_steps = served.windows(2).filter(|w| w[0].set_id == w[1].set_id).count();
    assert!(same_set_steps < items.len() / 2, "{same_set_steps} back-to-back picks from one set");
}

#[test]
fn zero_weights_fall_back_to_uniform_picks() {
    let items: Vec<ViewItem> = (0..5).map(|i| ViewItem::new(image(&format!("i{i}"), "/a"), "a")).collect();
    let weights = SlideshowWeights {
        same_set: 0.0,
        same_folder: 0.0,
    };
    let mut registry = SeenRegistry::new();
    let mut rng = StdRng::seed_from_u64(3);
    let mut last = None;
    let batch = pick_slideshow_batch(&items, 5, &mut last, &mut registry, weights, &mut rng);
    assert_eq!(batch.len(), 5);
}

#[test]
fn membership_changes_keep_retained_order() {
    let images: Vec<ImageDescriptor> = (0..12).map(|i| image(&format!("n{i}"), "/s")).collect();
    let sort = SortSettings {
        mode: SortMode::Random,
        seed: "seed".into(),
    };
    let mut set = SetRef::new("s", "s");
    set.favorite_ids.extend(["n1", "n4", "n7"].map(String::from));
    let before = update_ordered_lists(None, &images, &set, &sort);

    // Unfavorite n4, hide n7, favorite n9.
    set.favorite_ids.remove("n4");
    set.hidden_ids.insert("n7".into());
    set.favorite_ids.insert("n9".into());
    let after = update_ordered_lists(Some(&before), &images, &set, &sort);

    let retained: Vec<&String> = before
        .nonfavorites
        .iter()
        .map(|i| &i.id)
        .filter(|id| after.nonfavorites.iter().any(|a| &a.id == *id))
        .collect();
    let prefix: Vec<&String> = after.nonfavorites.iter().map(|i| &i.id).take(retained.len()).collect();
    assert_eq!(prefix, retained);
    assert_eq!(after.nonfavorites.last().map(|i| i.id.as_str()), Some("n4"));
    assert_eq!(ids(&after.hidden), vec!["n7".to_string()]);
    assert_eq!(after.favorites.len(), 2);
    assert_eq!(after.favorites[0].id, "n1");
}
