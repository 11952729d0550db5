//! Noise-driven wave deformation of a water mesh.
//!
//! Each upward-facing vertex gets its height from a scrolling coherent noise
//! field. Bottom-facing vertices keep their position.

use std::sync::Arc;

use bevy::math::{Vec2, Vec3};
use log::debug;
use noiz::prelude::*;

use crate::buffer::{BufferError, ReadOnlyArray};
use crate::config::WaveConfig;
use crate::constants::WAVE_BASE_OFFSET;
use crate::driver::{BatchSimulation, DriverError, FrameTime};
use crate::jobs::ParallelForJob;
use crate::mesh::WaterMesh;

/// Smooth pseudo-random scalar field, roughly in `[-1, 1]`.
pub trait CoherentNoise: Send + Sync + 'static {
    fn sample(&self, point: Vec2) -> f32;
}

/// Seeded Perlin noise.
pub struct PerlinNoise {
    noise: Noise<common_noise::Perlin>,
}

impl PerlinNoise {
    pub fn new(seed: u32) -> Self {
        let mut noise = Noise::<common_noise::Perlin>::default();
        noise.set_seed(seed);
        Self { noise }
    }
}

impl CoherentNoise for PerlinNoise {
    fn sample(&self, point: Vec2) -> f32 {
        self.noise.sample_for::<f32>(point)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveParameters {
    pub time: f32,
    pub scale: f32,
    pub offset_speed: f32,
    pub height: f32,
}

/// New position of one vertex; vertices whose normal does not face +Z are returned unchanged.
pub fn displace_vertex<N: CoherentNoise + ?Sized>(
    position: Vec3,
    normal: Vec3,
    params: &WaveParameters,
    noise: &N,
) -> Vec3 {
    if normal.z <= 0.0 {
        return position;
    }

    let offset = params.offset_speed * params.time;
    let sample_point = Vec2::new(
        position.x * params.scale + offset,
        position.y * params.scale + offset,
    );
    let value = noise.sample(sample_point);

    Vec3::new(position.x, position.y, value * params.height + WAVE_BASE_OFFSET)
}

pub struct WaveJob<N: CoherentNoise> {
    pub params: WaveParameters,
    pub normals: Arc<[Vec3]>,
    pub noise: Arc<N>,
}

impl<N: CoherentNoise> ParallelForJob for WaveJob<N> {
    type Item = Vec3;

    fn execute(&self, index: usize, position: &mut Vec3) {
        let normal = self.normals[index];
        *position = displace_vertex(*position, normal, &self.params, self.noise.as_ref());
    }
}

/// Water surface whose vertex heights follow the wave noise every tick.
///
/// The normals sampled by the job are the ones the mesh had at creation;
/// the mesh's own normals are recomputed after every applied tick.
pub struct WaveSurface<N: CoherentNoise = PerlinNoise> {
    mesh: WaterMesh,
    normals: ReadOnlyArray<Vec3>,
    noise: Arc<N>,
    scale: f32,
    offset_speed: f32,
    height: f32,
}

impl WaveSurface<PerlinNoise> {
    pub fn from_config(config: &WaveConfig) -> Result<Self, BufferError> {
        let mesh = WaterMesh::plane(config.size, config.subdivisions, config.double_sided);
        Self::new(mesh, config, PerlinNoise::new(config.noise_seed))
    }
}

impl<N: CoherentNoise> WaveSurface<N> {
    pub fn new(mesh: WaterMesh, config: &WaveConfig, noise: N) -> Result<Self, BufferError> {
        if mesh.normals.len() != mesh.vertices.len() {
            return Err(BufferError::LengthMismatch {
                label: "wave normals",
                expected: mesh.vertices.len(),
                actual: mesh.normals.len(),
            });
        }
        let normals = ReadOnlyArray::from_vec("wave normals", mesh.normals.clone());

        Ok(Self {
            mesh,
            normals,
            noise: Arc::new(noise),
            scale: config.wave_scale,
            offset_speed: config.wave_offset_speed,
            height: config.wave_height,
        })
    }

    pub fn mesh(&self) -> &WaterMesh {
        &self.mesh
    }

    /// Vertex positions to seed the driver's state store with.
    pub fn initial_vertices(&self) -> Vec<Vec3> {
        self.mesh.vertices.clone()
    }

    pub fn parameters(&self, time: f32) -> WaveParameters {
        WaveParameters {
            time,
            scale: self.scale,
            offset_speed: self.offset_speed,
            height: self.height,
        }
    }

    /// Runs the same per-vertex update on the calling thread, without the job system.
    pub fn update_sequential(&mut self, time: f32) -> Result<(), BufferError> {
        let params = self.parameters(time);
        let normals = self.normals.as_slice()?;
        for (position, &normal) in self.mesh.vertices.iter_mut().zip(normals) {
            *position = displace_vertex(*position, normal, &params, self.noise.as_ref());
        }
        self.mesh.recalculate_normals();
        Ok(())
    }
}

impl<N: CoherentNoise> BatchSimulation for WaveSurface<N> {
    type Job = WaveJob<N>;

    fn label(&self) -> &'static str {
        "water"
    }

    fn entity_count(&self) -> usize {
        self.mesh.vertex_count()
    }

    fn build_job(&mut self, time: FrameTime) -> Result<WaveJob<N>, DriverError> {
        Ok(WaveJob {
            params: self.parameters(time.elapsed),
            normals: self.normals.share()?,
            noise: Arc::clone(&self.noise),
        })
    }

    fn apply(&mut self, positions: &[Vec3]) {
        self.mesh.vertices.copy_from_slice(positions);
        self.mesh.recalculate_normals();
    }

    fn release(&mut self) -> Result<(), BufferError> {
        debug!("releasing {} wave normals", self.normals.len());
        self.normals.dispose()
    }
}

impl<N: CoherentNoise> std::fmt::Debug for WaveSurface<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveSurface")
            .field("vertices", &self.mesh.vertex_count())
            .field("scale", &self.scale)
            .field("offset_speed", &self.offset_speed)
            .field("height", &self.height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::FrameDriver;
    use crate::jobs::JobScheduler;

    /// `x - 2y`, so expected heights are easy to compute by hand.
    struct LinearNoise;

    impl CoherentNoise for LinearNoise {
        fn sample(&self, point: Vec2) -> f32 {
            point.x - 2.0 * point.y
        }
    }

    fn params() -> WaveParameters {
        WaveParameters {
            time: 2.0,
            scale: 0.5,
            offset_speed: 0.25,
            height: 3.0,
        }
    }

    fn config() -> WaveConfig {
        WaveConfig {
            wave_scale: 0.5,
            wave_offset_speed: 0.25,
            wave_height: 3.0,
            ..WaveConfig::default()
        }
    }

    #[test]
    fn test_downward_normals_are_skipped() {
        let position = Vec3::new(1.0, 2.0, 7.0);
        for normal in [Vec3::NEG_Z, Vec3::X, Vec3::new(0.0, 1.0, -0.1)] {
            assert_eq!(displace_vertex(position, normal, &params(), &LinearNoise), position);
        }
    }

    #[test]
    fn test_height_from_noise() {
        let position = Vec3::new(1.0, 2.0, 7.0);
        let displaced = displace_vertex(position, Vec3::Z, &params(), &LinearNoise);

        // offset = 0.5; sample at (1.0, 1.5) -> 1.0 - 3.0 = -2.0
        let expected = -2.0 * 3.0 + WAVE_BASE_OFFSET;
        assert_eq!(displaced, Vec3::new(1.0, 2.0, expected));
    }

    #[test]
    fn test_job_reads_normal_at_its_index() {
        let job = WaveJob {
            params: params(),
            normals: Arc::from(vec![Vec3::Z, Vec3::NEG_Z, Vec3::Z]),
            noise: Arc::new(LinearNoise),
        };
        let start = Vec3::new(1.0, 2.0, 7.0);
        let mut positions = [start; 3];
        for (index, position) in positions.iter_mut().enumerate() {
            job.execute(index, position);
        }

        let lifted = displace_vertex(start, Vec3::Z, &params(), &LinearNoise);
        assert_eq!(positions, [lifted, start, lifted]);
    }

    #[test]
    fn test_perlin_is_deterministic_and_bounded() {
        let a = PerlinNoise::new(4);
        let b = PerlinNoise::new(4);
        for i in 0..50 {
            let point = Vec2::new(i as f32 * 0.37, i as f32 * -0.21);
            let value = a.sample(point);
            assert_eq!(value, b.sample(point));
            assert!(value.abs() <= 1.5, "{value}");
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let scheduler = JobScheduler::new(Some(3));
        let mesh = WaterMesh::plane(6.0, 12, true);

        let parallel = WaveSurface::new(mesh.clone(), &config(), LinearNoise).unwrap();
        let vertices = parallel.initial_vertices();
        let mut driver = FrameDriver::init(parallel, vertices, 7).unwrap();
        driver.tick(&scheduler, FrameTime::new(1.5, 0.1)).unwrap();
        driver.complete().unwrap();

        let mut sequential = WaveSurface::new(mesh, &config(), LinearNoise).unwrap();
        sequential.update_sequential(1.5).unwrap();

        assert_eq!(driver.simulation().mesh(), sequential.mesh());
    }

    #[test]
    fn test_bottom_face_untouched_after_tick() {
        let scheduler = JobScheduler::new(Some(2));
        let mesh = WaterMesh::plane(2.0, 2, true);
        let top = mesh.vertex_count() / 2;

        let surface = WaveSurface::new(mesh.clone(), &config(), LinearNoise).unwrap();
        let vertices = surface.initial_vertices();
        let mut driver = FrameDriver::init(surface, vertices, 4).unwrap();
        driver.tick(&scheduler, FrameTime::new(0.0, 0.0)).unwrap();
        driver.complete().unwrap();

        let updated = driver.items().unwrap();
        assert_eq!(&updated[top..], &mesh.vertices[top..]);
        assert!(updated[..top].iter().all(|v| v.z != 0.0));
    }

    #[test]
    fn test_surface_release_disposes_normals() {
        let mut surface = WaveSurface::new(WaterMesh::plane(1.0, 1, false), &config(), LinearNoise).unwrap();
        surface.release().unwrap();
        assert!(surface.build_job(FrameTime::default()).is_err());
        assert_eq!(
            surface.update_sequential(0.0),
            Err(BufferError::Disposed("wave normals"))
        );
    }
}
