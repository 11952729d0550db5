use bevy::prelude::*;

pub const DEFAULT_TICKS_PER_SECOND: u64 = 60;
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Range of the per-step random factor applied to swim speed.
pub const SWIM_SPEED_JITTER_MIN: f32 = 0.3;
pub const SWIM_SPEED_JITTER_MAX: f32 = 1.0;
/// A fish picks a new heading when `uniform_int(0, swim_change_frequency)` is at most this.
pub const DIRECTION_CHANGE_THRESHOLD: u32 = 2;
/// Divisor shrinking the box in which a fish that left the bounds picks its new target.
pub const BOUNDARY_INSET: f32 = 1.3;
pub const BOUNDARY_TURN_MULTIPLIER: f32 = 2.0;

/// Constant lift added to every displaced water vertex.
pub const WAVE_BASE_OFFSET: f32 = 0.3;

/// Local axis a fish swims along.
pub const FISH_FORWARD: Vec3 = Vec3::Z;

pub const STARTUP_ERROR: &str = "Failed to start the simulation";
