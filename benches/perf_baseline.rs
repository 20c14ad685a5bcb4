use std::hint::black_box;

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use set_viewer::model::{ImageDescriptor, KindTag, SetRef, SortSettings, ViewItem};
use set_viewer::sampling::{
    chronological_order, pick_next_batch, pick_slideshow_batch, seeded_shuffle, update_ordered_lists, SeenRegistry,
    SlideshowWeights,
};

fn images(count: usize) -> Vec<ImageDescriptor> {
    (0..count)
        .map(|i| {
            let folder = format!("/sets/folder{}", i % 17);
            let taken = Utc.timestamp_opt(1_600_000_000 + ((i * 7_919) % 100_000) as i64, 0).unwrap();
            ImageDescriptor::new(format!("img{i}"), format!("IMG_{i}.jpg"), folder).with_exif_time(taken)
        })
        .collect()
}

fn bench_ordering(c: &mut Criterion) {
    let pool = images(10_000);
    c.bench_function("seeded_shuffle_10k", |b| b.iter(|| seeded_shuffle(black_box(&pool), "bench")));
    c.bench_function("chronological_order_10k", |b| b.iter(|| chronological_order(black_box(&pool))));

    let mut set = SetRef::new("s", "Bench");
    set.favorite_ids.extend(pool.iter().step_by(5).map(|i| i.id.clone()));
    set.hidden_ids.extend(pool.iter().step_by(11).map(|i| i.id.clone()));
    let sort = SortSettings::default();
    c.bench_function("update_ordered_lists_10k", |b| {
        b.iter(|| update_ordered_lists(None, black_box(&pool), &set, &sort))
    });
}

fn bench_sampling(c: &mut Criterion) {
    let pool = images(2_000);
    c.bench_function("pick_next_batch_2k_full_cycle", |b| {
        b.iter_batched(
            || (SeenRegistry::new(), StdRng::seed_from_u64(1)),
            |(mut registry, mut rng)| {
                for _ in 0..(pool.len() / 12) {
                    black_box(pick_next_batch("s", KindTag::Sample, &pool, 12, &mut registry, &mut rng));
                }
            },
            BatchSize::SmallInput,
        )
    });

    let items: Vec<ViewItem> = pool
        .iter()
        .enumerate()
        .map(|(i, image)| ViewItem::new(image.clone(), format!("set{}", i % 8)))
        .collect();
    c.bench_function("pick_slideshow_batch_2k", |b| {
        b.iter_batched(
            || (SeenRegistry::new(), StdRng::seed_from_u64(2), None),
            |(mut registry, mut rng, mut last)| {
                black_box(pick_slideshow_batch(
                    &items,
                    12,
                    &mut last,
                    &mut registry,
                    SlideshowWeights::default(),
                    &mut rng,
                ))
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_ordering, bench_sampling);
criterion_main!(benches);
