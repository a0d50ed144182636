//! # PHOTON
//!
//! Loads a config and a scene, then runs the logic, physics and render
//! threads until killed or until `--frames` ticks have run.
//!
//! ```bash
//! photon --config photon.toml --map assets/hall.json --frames 600
//! RUST_LOG=photon=debug photon --map assets/hall.json
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use photon::{Engine, HeadlessBackend};
use photon_core::EngineConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// PHOTON engine runtime.
#[derive(Parser, Debug)]
#[command(name = "photon", about = "PHOTON engine runtime")]
struct Args {
    /// TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scene file loaded at startup. Overrides `initial_scene`.
    #[arg(short, long)]
    map: Option<PathBuf>,

    /// Stop after this many ticks per subsystem.
    #[arg(short, long)]
    frames: Option<u64>,

    /// Render without a window.
    #[arg(long)]
    headless: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    info!(
        logic_hz = config.logic_hz,
        physics_hz = config.physics_hz,
        render_hz = config.render_hz,
        "PHOTON starting"
    );

    let map = args
        .map
        .clone()
        .or_else(|| config.initial_scene.as_ref().map(PathBuf::from));
    let engine = Engine::new(config);

    if let Some(map) = map {
        let stats = engine
            .load_scene_file(&map)
            .with_context(|| format!("loading scene {}", map.display()))?;
        info!(created = stats.created, "map loaded");
    } else {
        warn!("no map given, running an empty world");
    }

    if !args.headless {
        warn!("no window backend is built in, rendering headless");
    }

    let report = engine.run(HeadlessBackend::new(), args.frames)?;
    for (name, stats) in [
        ("logic", &report.logic),
        ("physics", &report.physics),
        ("render", &report.render),
    ] {
        info!(
            subsystem = name,
            frames = stats.frames_recorded,
            avg_ms = stats.avg_work_ms(),
            max_us = stats.max_work_us,
            over_budget = stats.over_budget_ratio(),
            "subsystem summary"
        );
    }
    Ok(())
}
