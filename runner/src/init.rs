use std::path::PathBuf;
use std::time::Duration;

use bevy::prelude::*;
use bevy_app::ScheduleRunnerPlugin;
use log::info;
use rand::{rngs::StdRng, SeedableRng};
use shoal::{
    load_config, spawn_school, ConfigError, DriverError, FishSchool, FrameDriver, JobScheduler,
    SeedSource, SimulationConfig, WaveSurface,
};
use thiserror::Error;

use crate::systems::{
    register_systems, CompletedTicks, RunSamples, Scheduler, School, TickLimit, Water,
};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub config_path: PathBuf,
    /// Stop after this many ticks; 0 runs forever.
    pub ticks: u64,
    /// Overrides `worker_threads` from the config file.
    pub threads: Option<usize>,
    pub run_samples: bool,
}

/// Inserts the job scheduler, both simulations and their systems into `app`.
pub fn setup_simulation(
    app: &mut App,
    config: &SimulationConfig,
    ticks: u64,
    run_samples: bool,
) -> Result<(), RunnerError> {
    let scheduler = JobScheduler::new(config.worker_threads);
    info!(
        "Job scheduler running {} worker threads",
        scheduler.worker_count()
    );

    let mut spawn_rng = match config.fish.seed {
        SeedSource::Fixed(seed) => StdRng::seed_from_u64(seed),
        SeedSource::WallClockMillis => StdRng::from_entropy(),
    };
    let agents = spawn_school(&config.fish, &mut spawn_rng);
    let school = FrameDriver::init(
        FishSchool::new(config.fish.clone()),
        agents,
        config.fish.batch_size,
    )?;

    let surface = WaveSurface::from_config(&config.wave).map_err(DriverError::from)?;
    let vertices = surface.initial_vertices();
    let water = FrameDriver::init(surface, vertices, config.wave.batch_size)?;

    app.insert_resource(Scheduler(scheduler));
    app.insert_resource(School(school));
    app.insert_resource(Water(water));
    app.insert_resource(TickLimit(ticks));
    app.insert_resource(CompletedTicks::default());
    app.insert_resource(RunSamples(run_samples));

    register_systems(app);
    Ok(())
}

pub fn init(options: RunnerOptions) -> Result<AppExit, RunnerError> {
    let mut app = App::new();
    app.add_plugins(bevy::log::LogPlugin::default());

    let mut config = load_config(&options.config_path)?;
    if options.threads.is_some() {
        config.worker_threads = options.threads;
        config.validate()?;
    }

    app.add_plugins(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
            1.0 / config.ticks_per_second as f64,
        ))),
    );

    info!(
        "Starting simulation: {} fish, {} water vertices per side, {} ticks/s",
        config.fish.amount_of_fish,
        config.wave.subdivisions + 1,
        config.ticks_per_second
    );

    setup_simulation(&mut app, &config, options.ticks, options.run_samples)?;

    Ok(app.run())
}
