use bevy::prelude::*;
use log::{debug, error, info};
use shoal::samples::{run_dependent_jobs, run_parallel_for, run_single_job};
use shoal::{FishSchool, FrameDriver, FramePhase, FrameTime, JobScheduler, WaveSurface};

/// How often, in completed ticks, a summary line is logged.
const SUMMARY_INTERVAL_TICKS: u64 = 120;

const SAMPLE_PARALLEL_COUNT: usize = 10_000;
const SAMPLE_PARALLEL_BATCH: usize = 10;

#[derive(Resource, Clone, Debug)]
pub struct Scheduler(pub JobScheduler);

#[derive(Resource, Debug)]
pub struct School(pub FrameDriver<FishSchool>);

#[derive(Resource, Debug)]
pub struct Water(pub FrameDriver<WaveSurface>);

/// Stop after this many completed ticks; 0 runs until the process is killed.
#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct TickLimit(pub u64);

#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct CompletedTicks(pub u64);

#[derive(Resource, Clone, Copy, Debug)]
pub struct RunSamples(pub bool);

pub fn run_job_samples_system(scheduler: Res<Scheduler>, run: Res<RunSamples>) {
    if !run.0 {
        return;
    }

    if let Err(err) = run_single_job(&scheduler.0, 1, 2) {
        error!("Single job sample failed: {err}");
    }
    if let Err(err) = run_dependent_jobs(&scheduler.0, 1, 2) {
        error!("Dependent job sample failed: {err}");
    }
    if let Err(err) =
        run_parallel_for(&scheduler.0, SAMPLE_PARALLEL_COUNT, SAMPLE_PARALLEL_BATCH)
    {
        error!("Parallel-for sample failed: {err}");
    }
}

/// Start of the tick: snapshot parameters and dispatch both batches.
pub fn dispatch_batches_system(
    scheduler: Res<Scheduler>,
    time: Res<Time>,
    mut school: ResMut<School>,
    mut water: ResMut<Water>,
) {
    let frame = FrameTime::new(time.elapsed_secs(), time.delta_secs());

    if school.0.phase() != FramePhase::TornDown {
        if let Err(err) = school.0.tick(&scheduler.0, frame) {
            error!("Fish batch not dispatched: {err}");
        }
    }
    if water.0.phase() != FramePhase::TornDown {
        if let Err(err) = water.0.tick(&scheduler.0, frame) {
            error!("Water batch not dispatched: {err}");
        }
    }
}

/// Late in the tick, after every other update: wait for the batches and apply them.
pub fn complete_batches_system(
    mut school: ResMut<School>,
    mut water: ResMut<Water>,
    mut completed: ResMut<CompletedTicks>,
) {
    if !school.0.has_pending_batch() && !water.0.has_pending_batch() {
        return;
    }

    let mut applied = true;
    if let Err(err) = school.0.complete() {
        error!("Fish batch not completed: {err}");
        applied = false;
    }
    if let Err(err) = water.0.complete() {
        error!("Water batch not completed: {err}");
        applied = false;
    }
    if !applied {
        return;
    }
    completed.0 += 1;

    if completed.0.is_multiple_of(SUMMARY_INTERVAL_TICKS) {
        log_summary(&school.0, &water.0, completed.0);
    } else {
        debug!("Tick {} applied", completed.0);
    }
}

fn log_summary(school: &FrameDriver<FishSchool>, water: &FrameDriver<WaveSurface>, tick: u64) {
    let mean = school.simulation().mean_position().unwrap_or(Vec3::ZERO);
    let (low, high) = water.simulation().mesh().height_range().unwrap_or_default();
    info!(
        "Tick {tick}: fish mean position ({:.2}, {:.2}, {:.2}), water height {low:.3}..{high:.3}",
        mean.x, mean.y, mean.z
    );
}

pub fn tick_limit_system(
    limit: Res<TickLimit>,
    completed: Res<CompletedTicks>,
    mut school: ResMut<School>,
    mut water: ResMut<Water>,
    mut exit: EventWriter<AppExit>,
) {
    if limit.0 == 0 || completed.0 < limit.0 {
        return;
    }

    if school.0.phase() != FramePhase::TornDown {
        if let Err(err) = school.0.teardown() {
            error!("Fish teardown failed: {err}");
        }
    }
    if water.0.phase() != FramePhase::TornDown {
        if let Err(err) = water.0.teardown() {
            error!("Water teardown failed: {err}");
        }
    }

    info!("Reached {} ticks, stopping", completed.0);
    exit.write(AppExit::Success);
}

pub fn register_systems(app: &mut App) {
    app.add_systems(Startup, run_job_samples_system);

    app.add_systems(Update, dispatch_batches_system);

    // Batches dispatched in Update are only waited on here.
    app.add_systems(PostUpdate, complete_batches_system);

    app.add_systems(Last, tick_limit_system);
}
