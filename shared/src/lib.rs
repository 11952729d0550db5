pub mod buffer;
pub mod config;
pub mod constants;
pub mod driver;
pub mod fish;
pub mod jobs;
pub mod mesh;
pub mod samples;
pub mod wave;

pub use buffer::{BufferError, NativeArray, ReadOnlyArray};
pub use config::{load_config, ConfigError, FishConfig, SeedSource, SimulationConfig, WaveConfig};
pub use constants::*;
pub use driver::{BatchSimulation, DriverError, FrameDriver, FramePhase, FrameTime};
pub use fish::{spawn_school, FishAgent, FishSchool};
pub use jobs::{Job, JobError, JobHandle, JobScheduler, ParallelForJob};
pub use mesh::WaterMesh;
pub use wave::{CoherentNoise, PerlinNoise, WaveSurface};
