//! Simulation settings, loaded from a RON file.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bevy::math::Vec3;
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_TICKS_PER_SECOND};
use crate::mesh::WaterMesh;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where the extra per-tick seed of the fish job comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SeedSource {
    /// Millisecond part of the wall clock; differs from run to run.
    #[default]
    WallClockMillis,
    /// Same seed every tick, for reproducible runs.
    Fixed(u64),
}

impl SeedSource {
    pub fn wall_clock_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|now| u64::from(now.subsec_millis()))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FishConfig {
    pub amount_of_fish: usize,
    /// Position of the spawner; fish appear `spawn_height` above it.
    pub origin: Vec3,
    /// Size of the spawn box, also the box fish must stay in.
    pub spawn_bounds: Vec3,
    pub spawn_height: f32,
    /// Center of the swim box (the water's position).
    pub center: Vec3,
    pub swim_change_frequency: u32,
    pub swim_speed: f32,
    pub turn_speed: f32,
    pub batch_size: usize,
    pub seed: SeedSource,
}

impl Default for FishConfig {
    fn default() -> Self {
        Self {
            amount_of_fish: 500,
            origin: Vec3::ZERO,
            spawn_bounds: Vec3::new(60.0, 10.0, 60.0),
            spawn_height: 2.0,
            center: Vec3::ZERO,
            swim_change_frequency: 2000,
            swim_speed: 4.0,
            turn_speed: 1.5,
            batch_size: DEFAULT_BATCH_SIZE,
            seed: SeedSource::WallClockMillis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    /// Noise frequency: how many noise units per world unit.
    pub wave_scale: f32,
    /// How fast the noise field scrolls.
    pub wave_offset_speed: f32,
    pub wave_height: f32,
    pub size: f32,
    pub subdivisions: u32,
    pub double_sided: bool,
    pub noise_seed: u32,
    pub batch_size: usize,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            wave_scale: 0.3,
            wave_offset_speed: 1.25,
            wave_height: 0.4,
            size: 10.0,
            subdivisions: 64,
            double_sided: true,
            noise_seed: 0,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Worker threads for the job pool; `None` uses every available core.
    pub worker_threads: Option<usize>,
    pub ticks_per_second: u64,
    pub fish: FishConfig,
    pub wave: WaveConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            fish: FishConfig::default(),
            wave: WaveConfig::default(),
        }
    }
}

fn finite_vec(name: &str, value: Vec3) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be finite")))
    }
}

impl SimulationConfig {
    pub fn from_ron(contents: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig =
            ron::de::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == Some(0) {
            return Err(ConfigError::Invalid("worker_threads must be at least 1".into()));
        }
        if self.ticks_per_second == 0 {
            return Err(ConfigError::Invalid("ticks_per_second must be at least 1".into()));
        }

        let fish = &self.fish;
        if fish.batch_size == 0 || self.wave.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if fish.swim_change_frequency < 1 {
            return Err(ConfigError::Invalid(
                "fish.swim_change_frequency must be at least 1".into(),
            ));
        }
        finite_vec("fish.origin", fish.origin)?;
        finite_vec("fish.center", fish.center)?;
        finite_vec("fish.spawn_bounds", fish.spawn_bounds)?;
        if fish.spawn_bounds.min_element() < 0.0 {
            return Err(ConfigError::Invalid("fish.spawn_bounds must not be negative".into()));
        }
        for (name, value) in [
            ("fish.spawn_height", fish.spawn_height),
            ("fish.swim_speed", fish.swim_speed),
            ("fish.turn_speed", fish.turn_speed),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{name} must be finite")));
            }
        }

        let wave = &self.wave;
        if !(wave.size.is_finite() && wave.size > 0.0) {
            return Err(ConfigError::Invalid("wave.size must be positive".into()));
        }
        if wave.subdivisions == 0 {
            return Err(ConfigError::Invalid("wave.subdivisions must be at least 1".into()));
        }
        if WaterMesh::plane_vertex_count(wave.subdivisions, wave.double_sided) > u64::from(u32::MAX) {
            return Err(ConfigError::Invalid(format!(
                "wave.subdivisions {} exceeds the u32 vertex index range",
                wave.subdivisions
            )));
        }
        for (name, value) in [
            ("wave.wave_scale", wave.wave_scale),
            ("wave.wave_offset_speed", wave.wave_offset_speed),
            ("wave.wave_height", wave.wave_height),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{name} must be finite")));
            }
        }

        Ok(())
    }
}

/// Loads the config at `path`, falling back to the defaults when the file does not exist.
pub fn load_config(path: &Path) -> Result<SimulationConfig, ConfigError> {
    if !path.exists() {
        info!(
            "Config file not found: {}. Using default settings.",
            path.display()
        );
        return Ok(SimulationConfig::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = SimulationConfig::from_ron(&contents)?;

    info!("Loaded config from disk: {}", path.display());
    Ok(config)
}
