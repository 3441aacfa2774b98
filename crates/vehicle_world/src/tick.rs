//! Fixed-rate tick loop.
//!
//! Each tick:
//!
//! 1. Run every registered system in registration order. Systems query the
//!    world and queue structural changes in the shared [`CommandBuffer`].
//! 2. Apply the command buffer.
//! 3. Save a snapshot every `save.period` ticks and a backup every
//!    `save.backup_period` ticks, if persistence is configured.
//! 4. Advance the tick counter.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::command::{ApplyReport, CommandBuffer};
use crate::config::{PathConfig, SaveConfig};
use crate::error::WorldError;
use crate::prototype::PrototypeRegistry;
use crate::snapshot::{self, LoadReport};
use crate::world::World;

/// Configuration for the tick loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Target ticks per second.
    #[serde(rename = "rate")]
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20.0,
            max_ticks: 0,
        }
    }
}

/// A per-tick system. Receives the world, the shared command buffer, and
/// the tick's time step in seconds.
pub type System = Box<dyn FnMut(&mut World, &mut CommandBuffer, f64) + Send>;

struct Persistence {
    save: SaveConfig,
    save_path: PathBuf,
    backup_dir: PathBuf,
}

/// The tick loop state.
pub struct TickLoop {
    /// Number of completed ticks.
    tick_id: u64,
    config: TickConfig,
    world: World,
    prototypes: PrototypeRegistry,
    commands: CommandBuffer,
    systems: Vec<(String, System)>,
    persistence: Option<Persistence>,
}

impl TickLoop {
    #[must_use]
    pub fn new(config: TickConfig, world: World, prototypes: PrototypeRegistry) -> Self {
        Self {
            tick_id: 0,
            config,
            world,
            prototypes,
            commands: CommandBuffer::new(),
            systems: Vec::new(),
            persistence: None,
        }
    }

    /// Enable periodic saves and backups.
    #[must_use]
    pub fn with_persistence(mut self, save: SaveConfig, paths: &PathConfig) -> Self {
        self.persistence = Some(Persistence {
            save,
            save_path: paths.save.clone(),
            backup_dir: paths.backup.clone(),
        });
        self
    }

    /// Append a system. Systems run in the order they were added.
    pub fn add_system(
        &mut self,
        name: impl Into<String>,
        system: impl FnMut(&mut World, &mut CommandBuffer, f64) + Send + 'static,
    ) {
        let name = name.into();
        debug!(system = %name, "added system");
        self.systems.push((name, Box::new(system)));
    }

    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[must_use]
    pub fn prototypes(&self) -> &PrototypeRegistry {
        &self.prototypes
    }

    /// Commands queued outside of a tick are applied with the next one.
    pub fn commands_mut(&mut self) -> &mut CommandBuffer {
        &mut self.commands
    }

    /// Run one tick.
    pub fn tick(&mut self, dt: f64) -> ApplyReport {
        debug!(tick_id = self.tick_id, dt, systems = self.systems.len(), "tick start");

        for (name, system) in &mut self.systems {
            system(&mut self.world, &mut self.commands, dt);
            debug!(tick_id = self.tick_id, system = %name, queued = self.commands.len(), "ran system");
        }
        let report = self.world.apply(&mut self.commands, &self.prototypes);

        self.tick_id += 1;
        self.persist();
        report
    }

    fn persist(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let save = &persistence.save;
        if due(self.tick_id, save.period) {
            if let Err(err) = self.save_to(&persistence.save_path, save) {
                error!(tick_id = self.tick_id, error = %err, "periodic save failed");
            }
        }
        if due(self.tick_id, save.backup_period) {
            if let Err(err) = snapshot::write_backup(
                &self.world,
                self.tick_id,
                &persistence.backup_dir,
                save.format,
                save.pretty,
            ) {
                error!(tick_id = self.tick_id, error = %err, "backup failed");
            }
        }
    }

    fn save_to(&self, path: &Path, save: &SaveConfig) -> Result<usize, WorldError> {
        snapshot::save_snapshot(&self.world, self.tick_id, path, save.format, save.pretty)
    }

    /// Write the save file now. Does nothing without persistence.
    ///
    /// # Errors
    ///
    /// Snapshot write failures.
    pub fn save(&self) -> Result<usize, WorldError> {
        match &self.persistence {
            Some(persistence) => self.save_to(&persistence.save_path, &persistence.save),
            None => Ok(0),
        }
    }

    /// Restore the save file into the world and resume its tick counter.
    /// Does nothing without persistence.
    ///
    /// # Errors
    ///
    /// See [`snapshot::load_snapshot`].
    pub fn load(&mut self) -> Result<LoadReport, WorldError> {
        let Some(persistence) = &self.persistence else {
            return Ok(LoadReport::default());
        };
        let report = snapshot::load_snapshot(
            &mut self.world,
            &persistence.save_path,
            persistence.save.format,
        )?;
        self.tick_id = report.tick;
        Ok(report)
    }

    /// Run the tick loop for the configured number of ticks, or
    /// indefinitely.
    pub fn run(&mut self) {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate);
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            start_tick = self.tick_id,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();

            let report = self.tick(tick_duration.as_secs_f64());
            if !report.is_clean() {
                warn!(
                    tick_id = self.tick_id,
                    failed = report.errors.len(),
                    "commands failed this tick"
                );
            }

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }
}

impl fmt::Debug for TickLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickLoop")
            .field("tick_id", &self.tick_id)
            .field("config", &self.config)
            .field("world", &self.world)
            .field("prototypes", &self.prototypes)
            .field("queued", &self.commands.len())
            .field(
                "systems",
                &self.systems.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

fn due(tick_id: u64, period: u64) -> bool {
    period > 0 && tick_id % period == 0
}
