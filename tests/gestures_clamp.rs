use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use set_viewer::gesture::{GestureConfig, GestureEvent, GestureInterpreter, Point, PointerEvent, Size};
use tokio::time::Instant;

const EPS: f32 = 1e-3;

fn assert_bounded(g: &GestureInterpreter, step: usize) {
    let zoom = g.zoom();
    assert!(zoom >= 1.0 - EPS, "zoom {zoom} below 1 at step {step}");
    assert!(zoom <= g.max_zoom() + EPS, "zoom {zoom} above {} at step {step}", g.max_zoom());

    let pan = g.pan();
    let limit = g.pan_limit();
    assert!(pan.x.abs() <= limit.x + EPS, "pan.x {} beyond {} at step {step}", pan.x, limit.x);
    assert!(pan.y.abs() <= limit.y + EPS, "pan.y {} beyond {} at step {step}", pan.y, limit.y);
    if zoom <= 1.0 + EPS {
        assert_eq!(pan, Point::ZERO, "pan kept at fit zoom (step {step})");
    }
}

fn random_point(rng: &mut StdRng, viewport: Size) -> Point {
    Point::new(
        rng.gen_range(-200.0..viewport.width + 200.0),
        rng.gen_range(-200.0..viewport.height + 200.0),
    )
}

/// Drive a random mix of wheel, drag and pinch gestures, checking bounds after every event.
fn random_walk(seed: u64, viewport: Size, image: (u32, u32)) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut g = GestureInterpreter::new(GestureConfig::default(), viewport);
    g.set_image_size(Some(image));
    let mut now = Instant::now();
    let mut step = 0;

    for _ in 0..200 {
        now += Duration::from_millis(rng.gen_range(5..400));
        let mut events = Vec::new();
        match rng.gen_range(0..3) {
            0 => events.push(PointerEvent::Wheel {
                pos: random_point(&mut rng, viewport),
                delta_y: rng.gen_range(-1_500.0..1_500.0),
            }),
            1 => {
                let start = random_point(&mut rng, viewport);
                events.push(PointerEvent::Down {
                    id: 1,
                    pos: start,
                    time: now,
                    over_control: false,
                });
                for _ in 0..rng.gen_range(1..6) {
                    events.push(PointerEvent::Move {
                        id: 1,
                        pos: random_point(&mut rng, viewport),
                    });
                }
                events.push(PointerEvent::Up {
                    id: 1,
                    pos: random_point(&mut rng, viewport),
                    time: now,
                });
            }
            _ => {
                let a = random_point(&mut rng, viewport);
                let b = random_point(&mut rng, viewport);
                events.push(PointerEvent::Down {
                    id: 1,
                    pos: a,
                    time: now,
                    over_control: false,
                });
                events.push(PointerEvent::Down {
                    id: 2,
                    pos: b,
                    time: now,
                    over_control: false,
                });
                for _ in 0..rng.gen_range(1..6) {
                    events.push(PointerEvent::Move {
                        id: rng.gen_range(1..=2),
                        pos: random_point(&mut rng, viewport),
                    });
                }
                events.push(PointerEvent::Up { id: 2, pos: b, time: now });
                events.push(PointerEvent::Move {
                    id: 1,
                    pos: random_point(&mut rng, viewport),
                });
                events.push(PointerEvent::Up { id: 1, pos: a, time: now });
            }
        }

        for event in events {
            g.handle(event);
            step += 1;
            assert_bounded(&g, step);
        }
        assert!(!g.is_interacting(), "interaction left open after step {step}");
    }
}

#[test]
fn random_gestures_stay_within_bounds() {
    let shapes = [
        (Size::new(1000.0, 800.0), (2000, 1600)),
        (Size::new(1920.0, 1080.0), (600, 4000)),
        (Size::new(390.0, 844.0), (6000, 4000)),
        (Size::new(800.0, 600.0), (20_000, 100)),
    ];
    for (seed, (viewport, image)) in shapes.into_iter().enumerate() {
        random_walk(seed as u64, viewport, image);
    }
}

#[test]
fn shrinking_the_viewport_reclamps_pan() {
    let mut g = GestureInterpreter::new(GestureConfig::default(), Size::new(1600.0, 1200.0));
    g.set_image_size(Some((1600, 1200)));
    for _ in 0..10 {
        g.handle(PointerEvent::Wheel {
            pos: Point::new(0.0, 0.0),
            delta_y: -500.0,
        });
    }
    assert!(g.zoom() > 1.0);

    g.set_viewport(Size::new(400.0, 300.0));
    assert_bounded(&g, 0);
}

#[test]
fn zoomed_drags_pan_instead_of_swiping() {
    let mut g = GestureInterpreter::new(GestureConfig::default(), Size::new(1000.0, 800.0));
    g.set_image_size(Some((1000, 800)));
    g.zoom_in();
    g.zoom_in();
    let now = Instant::now();

    let mut events = g.handle(PointerEvent::Down {
        id: 1,
        pos: Point::new(500.0, 400.0),
        time: now,
        over_control: false,
    });
    events.extend(g.handle(PointerEvent::Move {
        id: 1,
        pos: Point::new(100.0, 400.0),
    }));
    events.extend(g.handle(PointerEvent::Up {
        id: 1,
        pos: Point::new(100.0, 400.0),
        time: now,
    }));

    assert!(!events.iter().any(|e| matches!(e, GestureEvent::Intent(_))));
    assert!(g.pan().x < 0.0);
    assert_bounded(&g, 0);
}

#[test]
fn missing_dimensions_fit_to_viewport() {
    let mut g = GestureInterpreter::new(GestureConfig::default(), Size::new(1000.0, 800.0));
    g.set_image_size(None);
    assert_eq!(g.fitted_size(), Size::new(1000.0, 800.0));
    assert!((g.max_zoom() - 10f32.sqrt()).abs() < 1e-4);
}
