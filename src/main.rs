use chrono::Utc;
use dotenvy::dotenv;
use glam::Vec3;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use voxen_core::config::{EngineConfig, GenParams};
use voxen_core::world::catalog::BlockCatalog;
use voxen_world::manager::ChunkManager;
use voxen_world::mesh::MeshCache;

/// Headless smoke run: bring the whole stack up, walk the spawn area once
/// and write everything back out. Rendering, input and physics live in
/// other binaries; this one only drives the world core.
fn main() -> std::io::Result<()> {
    init_logging();

    let config = EngineConfig::load_or_default("config/engine.toml")?;
    let catalog = Arc::new(BlockCatalog::load_from("data")?);
    info!("block catalog ready ({} blocks)", catalog.len());

    let params = GenParams { seed: config.seed, ..GenParams::default() };
    let mut manager =
        ChunkManager::initialize(&config.world_path, &config, params, catalog, None)?;
    info!("world '{}' open, seed {}", config.world_path, manager.seed());

    let spawn = Vec3::new(0.5, 0.0, 0.5);
    manager.pregenerate_spawn(spawn, 2);

    let surface = manager.surface_height(0, 0);
    let eye = Vec3::new(0.5, surface as f32 + 2.0, 0.5);
    manager.update_observer(eye, Vec3::ZERO);

    let mut cache = MeshCache::new();
    let mut quads = 0usize;
    manager.render_chunks(eye, &mut cache, |_| quads += 1);
    info!(
        "{} chunks loaded, {} meshed, {} quads in render range",
        manager.loaded_count(),
        cache.len(),
        quads
    );

    manager.shutdown();
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::new(load_log_env_filter()))
        .with(tracing_subscriber::fmt::layer())
        .with(log_file_appender())
        .init();
}

/// Appends log output to `logs/voxen-DD-MM-YYYY.log` next to the console
/// layer. Returns None (console only) when the directory cannot be made.
fn log_file_appender<S>() -> Option<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let log_dir = PathBuf::from("logs");
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory: {e}");
        return None;
    }

    let file_name = Utc::now().format("voxen-%d-%m-%Y.log").to_string();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(file_name))
        .ok()?;
    let file = Arc::new(Mutex::new(file));

    let writer = BoxMakeWriter::new(move || {
        let file = file.lock().expect("log file handle").try_clone().expect("clone log file");
        Box::new(file) as Box<dyn Write + Send>
    });

    Some(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer).boxed())
}

/// Log filter from `LOG_ENV_FILTER`, optionally sourced from a `.env` file.
fn load_log_env_filter() -> String {
    dotenv().ok();
    env::var("LOG_ENV_FILTER").unwrap_or_else(|_| "info".to_string())
}

// =================================================================================================
//
//                                            Unit Tests
//
// =================================================================================================
