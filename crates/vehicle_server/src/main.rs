//! # vehicle_server
//!
//! Runs the vehicle world on a fixed-rate tick loop.
//!
//! ## Startup Sequence
//!
//! 1. Load the engine configuration (default `config/engine.toml`).
//! 2. Register the vehicle components and load prototype files.
//! 3. Restore the last save, if there is one.
//! 4. Run the tick loop, saving every `save.period` ticks.
//! 5. Save once more on exit.

mod systems;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vehicle_component::ComponentRegistry;
use vehicle_world::{EngineConfig, PrototypeRegistry, TickLoop, World};

#[derive(Parser)]
#[command(name = "vehicle_server", about = "Vehicle ECS tick-loop server")]
struct Args {
    /// Path to the engine configuration file
    #[arg(short, long, default_value = "config/engine.toml")]
    config: PathBuf,

    /// Stop after this many ticks (overrides `tick.max_ticks`)
    #[arg(short, long)]
    max_ticks: Option<u64>,

    /// Ticks per second (overrides `tick.rate`)
    #[arg(short, long)]
    rate: Option<f64>,

    /// Start from an empty world instead of restoring the save file
    #[arg(long)]
    fresh: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("vehicle_server=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut config = load_config(&args.config)?;
    if let Some(max_ticks) = args.max_ticks {
        config.tick.max_ticks = max_ticks;
    }
    if let Some(rate) = args.rate {
        config.tick.tick_rate = rate;
    }

    let mut tick_loop = build(&config)?;
    if !args.fresh {
        let report = tick_loop.load().context("failed to restore save file")?;
        info!(
            tick = report.tick,
            restored = report.restored,
            skipped = report.skipped,
            vehicles = report.vehicles,
            "world restored"
        );
    }

    tick_loop.run();

    let saved = tick_loop.save().context("final save failed")?;
    info!(tick = tick_loop.tick_id(), entities = saved, "vehicle server shut down");
    Ok(())
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    if path.exists() {
        let config = EngineConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    } else {
        info!(path = %path.display(), "no configuration file, using defaults");
        Ok(EngineConfig::default())
    }
}

/// Assemble the world, prototypes, and tick loop described by `config`.
fn build(config: &EngineConfig) -> Result<TickLoop> {
    let mut registry = ComponentRegistry::new();
    vehicle_components::register_all(&mut registry)?;
    let registry = Arc::new(registry);
    info!(components = registry.len(), "registered components");

    let mut prototypes = PrototypeRegistry::new(Arc::clone(&registry));
    if config.paths.prototypes.exists() {
        prototypes
            .load_dir(&config.paths.prototypes)
            .context("failed to load prototypes")?;
    }
    info!(
        prototypes = prototypes.len(),
        names = ?prototypes.names().collect::<Vec<_>>(),
        "prototypes ready"
    );

    let world = World::with_capacity(registry, config.storage.max_entities);
    let mut tick_loop = TickLoop::new(config.tick.clone(), world, prototypes)
        .with_persistence(config.save.clone(), &config.paths);
    systems::install(&mut tick_loop);
    Ok(tick_loop)
}
