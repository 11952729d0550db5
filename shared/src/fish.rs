//! Fish school movement.
//!
//! Every fish swims forward with a jittered speed, eases its heading toward
//! its velocity, and wanders by occasionally picking a new horizontal
//! direction. A fish that leaves the swim box is steered back toward a random
//! point inside a slightly smaller box.

use bevy::math::{Mat3, Quat, Vec3};
use bevy::transform::components::Transform;
use log::debug;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::buffer::BufferError;
use crate::config::{FishConfig, SeedSource};
use crate::constants::{
    BOUNDARY_INSET, BOUNDARY_TURN_MULTIPLIER, DIRECTION_CHANGE_THRESHOLD, FISH_FORWARD,
    SWIM_SPEED_JITTER_MAX, SWIM_SPEED_JITTER_MIN,
};
use crate::driver::{BatchSimulation, DriverError, FrameTime};
use crate::jobs::ParallelForJob;

/// Per-fish state owned by the school's state store.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FishAgent {
    pub velocity: Vec3,
    pub pose: Transform,
}

impl FishAgent {
    pub fn at(position: Vec3) -> Self {
        Self {
            velocity: Vec3::ZERO,
            pose: Transform::from_translation(position),
        }
    }
}

/// Read-only parameters shared by every fish during one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwimParameters {
    pub center: Vec3,
    pub bounds: Vec3,
    pub delta: f32,
    pub time: f32,
    pub swim_speed: f32,
    pub turn_speed: f32,
    pub swim_change_frequency: u32,
    pub seed: u64,
}

/// What a single swim step decided about the fish's velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwimDecision {
    /// Left the box; velocity now points back inside.
    Corrected,
    /// Picked a new random heading.
    Wandered,
    /// Kept its previous velocity.
    Kept,
}

/// Rotation whose local +Z axis points along `forward`, keeping +Y up.
pub fn look_rotation(forward: Vec3) -> Quat {
    let forward = forward.normalize_or_zero();
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }

    let right = Vec3::Y.cross(forward);
    if right.length_squared() < 1e-12 {
        // Looking straight up or down, any roll will do.
        return Quat::from_rotation_arc(FISH_FORWARD, forward);
    }

    let right = right.normalize();
    let up = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize()
}

/// Whether `position` lies strictly outside the box on the X or Z axis.
///
/// A point exactly on an edge counts as inside.
pub fn outside_bounds(position: Vec3, center: Vec3, bounds: Vec3) -> bool {
    let half = bounds / 2.0;
    position.x > center.x + half.x
        || position.x < center.x - half.x
        || position.z > center.z + half.z
        || position.z < center.z - half.z
}

fn turn_toward(pose: &mut Transform, direction: Vec3, amount: f32) {
    let target = look_rotation(direction);
    pose.rotation = pose.rotation.slerp(target, amount.clamp(0.0, 1.0));
}

/// Advances one fish by one tick.
///
/// Random draws happen in a fixed order (speed jitter, then either the
/// boundary target or the direction roll), so a seeded `rng` reproduces the
/// same step.
pub fn swim_step<R: Rng + ?Sized>(
    velocity: &mut Vec3,
    pose: &mut Transform,
    params: &SwimParameters,
    rng: &mut R,
) -> SwimDecision {
    let jitter = rng.gen_range(SWIM_SPEED_JITTER_MIN..SWIM_SPEED_JITTER_MAX);
    let forward = pose.compute_matrix().transform_vector3(FISH_FORWARD);
    pose.translation += forward * params.swim_speed * params.delta * jitter;

    if *velocity != Vec3::ZERO {
        turn_toward(pose, *velocity, params.turn_speed * params.delta);
    }

    let position = pose.translation;
    if outside_bounds(position, params.center, params.bounds) {
        let half = params.bounds / 2.0;
        let target = Vec3::new(
            params.center.x + rng.gen_range(-half.x..=half.x) / BOUNDARY_INSET,
            0.0,
            params.center.z + rng.gen_range(-half.z..=half.z) / BOUNDARY_INSET,
        );

        *velocity = (target - position).normalize_or_zero();
        turn_toward(
            pose,
            *velocity,
            params.turn_speed * params.delta * BOUNDARY_TURN_MULTIPLIER,
        );
        return SwimDecision::Corrected;
    }

    let roll = rng.gen_range(0..params.swim_change_frequency.max(1));
    if roll <= DIRECTION_CHANGE_THRESHOLD {
        *velocity = Vec3::new(rng.gen_range(-1.0..1.0), 0.0, rng.gen_range(-1.0..1.0));
        SwimDecision::Wandered
    } else {
        SwimDecision::Kept
    }
}

/// Mixes the entity index, tick time and tick seed into one RNG seed.
pub fn entity_seed(index: usize, time: f32, tick_seed: u64) -> u64 {
    let index = (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let time = u64::from(time.to_bits()).rotate_left(32);
    index ^ time ^ tick_seed.wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

/// Swim step for every fish of the school.
#[derive(Debug, Clone)]
pub struct SwimJob {
    pub params: SwimParameters,
}

impl ParallelForJob for SwimJob {
    type Item = FishAgent;

    fn execute(&self, index: usize, agent: &mut FishAgent) {
        let mut rng = SmallRng::seed_from_u64(entity_seed(index, self.params.time, self.params.seed));
        swim_step(&mut agent.velocity, &mut agent.pose, &self.params, &mut rng);
    }
}

/// Places `amount_of_fish` agents at random points of the spawn box.
pub fn spawn_school<R: Rng + ?Sized>(config: &FishConfig, rng: &mut R) -> Vec<FishAgent> {
    let half = config.spawn_bounds / 2.0;
    let base = config.origin + Vec3::Y * config.spawn_height;

    (0..config.amount_of_fish)
        .map(|_| {
            let offset = Vec3::new(
                rng.gen_range(-half.x..=half.x),
                0.0,
                rng.gen_range(-half.z..=half.z),
            );
            FishAgent::at(base + offset)
        })
        .collect()
}

/// A school of fish driven by [`SwimJob`]. Its poses are what a renderer reads.
#[derive(Debug)]
pub struct FishSchool {
    config: FishConfig,
    poses: Vec<Transform>,
    released: bool,
}

impl FishSchool {
    pub fn new(config: FishConfig) -> Self {
        let poses = vec![Transform::IDENTITY; config.amount_of_fish];
        Self {
            config,
            poses,
            released: false,
        }
    }

    pub fn config(&self) -> &FishConfig {
        &self.config
    }

    /// Poses as of the last applied tick.
    pub fn poses(&self) -> &[Transform] {
        &self.poses
    }

    pub fn mean_position(&self) -> Option<Vec3> {
        if self.poses.is_empty() {
            return None;
        }
        let sum: Vec3 = self.poses.iter().map(|pose| pose.translation).sum();
        Some(sum / self.poses.len() as f32)
    }

    fn parameters(&self, time: FrameTime, seed: u64) -> SwimParameters {
        SwimParameters {
            center: self.config.center,
            bounds: self.config.spawn_bounds,
            delta: time.delta,
            time: time.elapsed,
            swim_speed: self.config.swim_speed,
            turn_speed: self.config.turn_speed,
            swim_change_frequency: self.config.swim_change_frequency,
            seed,
        }
    }
}

impl BatchSimulation for FishSchool {
    type Job = SwimJob;

    fn label(&self) -> &'static str {
        "fish"
    }

    fn entity_count(&self) -> usize {
        self.config.amount_of_fish
    }

    fn build_job(&mut self, time: FrameTime) -> Result<SwimJob, DriverError> {
        if self.released {
            return Err(BufferError::Disposed("fish poses").into());
        }
        let seed = match self.config.seed {
            SeedSource::WallClockMillis => SeedSource::wall_clock_millis(),
            SeedSource::Fixed(seed) => seed,
        };
        Ok(SwimJob {
            params: self.parameters(time, seed),
        })
    }

    fn apply(&mut self, agents: &[FishAgent]) {
        for (pose, agent) in self.poses.iter_mut().zip(agents) {
            *pose = agent.pose;
        }
    }

    fn release(&mut self) -> Result<(), BufferError> {
        if self.released {
            return Err(BufferError::AlreadyDisposed("fish poses"));
        }
        debug!("releasing {} fish poses", self.poses.len());
        self.poses = Vec::new();
        self.released = true;
        Ok(())
    }
}
