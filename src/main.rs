//! Headless slideshow over a folder of photo sets.
//!
//! `set-viewer <folder> [seconds]` treats every sub-folder as a set, runs a
//! cross-set slideshow and logs each image as it comes up. Exits once every
//! image has been shown.

use std::collections::HashSet;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use set_viewer::{Config, ContextKind, LocalFolderSource, Size, TimerSignal, Viewer, ViewerEvent};
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_SECONDS: f64 = 3.0;
const TICK: Duration = Duration::from_millis(50);
/// Consecutive exhausted advances before giving up.
const MAX_SHAKES: usize = 3;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(folder) = args.get(1).map(PathBuf::from) else {
        eprintln!("usage: set-viewer <folder> [seconds]");
        std::process::exit(2);
    };
    let seconds = match args.get(2) {
        Some(value) => value.parse::<f64>()?,
        None => DEFAULT_SECONDS,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(folder, seconds))
}

async fn run(folder: PathBuf, seconds: f64) -> Result<(), Box<dyn Error>> {
    let source = Arc::new(LocalFolderSource::open(&folder)?);
    let total = source.image_count();
    if total == 0 {
        info!("No images under {}", folder.display());
        return Ok(());
    }

    let mut config = Config::load();
    let mut viewer = Viewer::new(
        Arc::clone(&source),
        Arc::clone(&source),
        &config,
        Handle::current(),
        Size::new(1920.0, 1080.0),
    );
    let events = viewer.events();

    viewer.open_view(
        ContextKind::Slideshow {
            set_ids: source.set_ids(),
        },
        None,
    )?;
    viewer.wait_idle().await;
    viewer.start_timer(Duration::from_secs_f64(seconds.max(0.1)));

    let mut shown: HashSet<String> = HashSet::new();
    let mut shakes = 0;
    let mut interval = tokio::time::interval(TICK);
    'run: loop {
        interval.tick().await;
        viewer.tick(Instant::now());

        while let Ok(event) = events.try_recv() {
            match event {
                ViewerEvent::Opened { label, index } => info!("Opened {} at {}", label, index),
                ViewerEvent::Moved { image_id, .. } => {
                    shakes = 0;
                    info!("[{}/{}] {}", shown.len() + 1, total, image_id);
                    shown.insert(image_id);
                }
                ViewerEvent::Loaded { image_id } => {
                    if let Some(size) = viewer.current_media().and_then(|m| m.dimensions) {
                        info!("{} is {}x{}", image_id, size.0, size.1);
                    }
                    shown.insert(image_id);
                }
                ViewerEvent::Shake => {
                    shakes += 1;
                    if shakes >= MAX_SHAKES {
                        warn!("Slideshow exhausted");
                        break 'run;
                    }
                }
                ViewerEvent::Error(e) => warn!("{}", e),
                ViewerEvent::Timer(TimerSignal::DurationChanged(duration)) => {
                    config.last_timer_ms = duration.as_millis() as u64;
                    config.save();
                }
                ViewerEvent::Timer(_) => {}
                ViewerEvent::Closed => break 'run,
            }
        }

        if shown.len() >= total {
            info!("All {} images shown", total);
            break;
        }
    }

    viewer.teardown();
    Ok(())
}
