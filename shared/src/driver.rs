//! Per-tick driver for a batched simulation.
//!
//! One tick goes through
//! `Idle → ParametersBuilt → BatchDispatched → BatchComplete → ResultsApplied → Idle`.
//! [`FrameDriver::tick`] covers the first half and returns while the batch
//! runs; [`FrameDriver::complete`] is the single blocking point of the tick and
//! writes the results back. Ticks never overlap.

use log::{debug, info};
use thiserror::Error;

use crate::buffer::{BufferError, NativeArray};
use crate::jobs::{JobError, JobHandle, JobScheduler, ParallelForJob};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("the previous batch has not been completed")]
    BatchAlreadyPending,
    #[error("no batch is waiting to be completed")]
    NoPendingBatch,
    #[error("the simulation has been torn down")]
    TornDown,
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Host timing for one tick, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    pub elapsed: f32,
    pub delta: f32,
}

impl FrameTime {
    pub fn new(elapsed: f32, delta: f32) -> Self {
        Self { elapsed, delta }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    ParametersBuilt,
    BatchDispatched,
    BatchComplete,
    ResultsApplied,
    TornDown,
}

pub type ItemOf<S> = <<S as BatchSimulation>::Job as ParallelForJob>::Item;

/// A simulation whose entities are updated by one parallel-for job per tick.
pub trait BatchSimulation {
    type Job: ParallelForJob;

    fn label(&self) -> &'static str;

    fn entity_count(&self) -> usize;

    /// Snapshots the shared parameters of this tick into a job.
    fn build_job(&mut self, time: FrameTime) -> Result<Self::Job, DriverError>;

    /// Writes completed entity state into the externally visible representation.
    fn apply(&mut self, items: &[<Self::Job as ParallelForJob>::Item]);

    /// Releases buffers owned by the simulation itself.
    fn release(&mut self) -> Result<(), BufferError>;
}

pub struct FrameDriver<S: BatchSimulation> {
    simulation: S,
    state: NativeArray<ItemOf<S>>,
    batch_size: usize,
    phase: FramePhase,
    pending: Option<JobHandle<Vec<ItemOf<S>>>>,
    ticks: u64,
}

impl<S: BatchSimulation> FrameDriver<S> {
    /// Allocates the state store from `items` and publishes them once through `apply`.
    pub fn init(
        mut simulation: S,
        items: Vec<ItemOf<S>>,
        batch_size: usize,
    ) -> Result<Self, DriverError> {
        let label = simulation.label();
        if items.len() != simulation.entity_count() {
            return Err(BufferError::LengthMismatch {
                label,
                expected: simulation.entity_count(),
                actual: items.len(),
            }
            .into());
        }
        if batch_size == 0 {
            return Err(JobError::InvalidBatchSize.into());
        }

        simulation.apply(&items);
        info!(
            "{label}: initialized {} entities, batch size {batch_size}",
            items.len()
        );

        Ok(Self {
            simulation,
            state: NativeArray::from_vec(label, items),
            batch_size,
            phase: FramePhase::Idle,
            pending: None,
            ticks: 0,
        })
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn has_pending_batch(&self) -> bool {
        self.pending.is_some()
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    /// Entity state as of the last completed tick.
    pub fn items(&self) -> Result<&[ItemOf<S>], DriverError> {
        if self.phase == FramePhase::TornDown {
            return Err(DriverError::TornDown);
        }
        Ok(self.state.as_slice()?)
    }

    /// Builds this tick's parameters and dispatches the batch without waiting for it.
    pub fn tick(&mut self, scheduler: &JobScheduler, time: FrameTime) -> Result<(), DriverError> {
        match self.phase {
            FramePhase::TornDown => return Err(DriverError::TornDown),
            _ if self.pending.is_some() => return Err(DriverError::BatchAlreadyPending),
            _ => {}
        }

        let job = self.simulation.build_job(time)?;
        self.phase = FramePhase::ParametersBuilt;

        let items = self.state.lend()?;
        let handle = scheduler.schedule_parallel_for(job, items, self.batch_size)?;
        self.pending = Some(handle);
        self.phase = FramePhase::BatchDispatched;
        self.ticks += 1;

        debug!(
            "{}: tick {} dispatched at t={:.3}",
            self.simulation.label(),
            self.ticks,
            time.elapsed
        );
        Ok(())
    }

    /// Waits for the dispatched batch and applies its results.
    pub fn complete(&mut self) -> Result<(), DriverError> {
        if self.phase == FramePhase::TornDown {
            return Err(DriverError::TornDown);
        }
        let handle = self.pending.take().ok_or(DriverError::NoPendingBatch)?;

        let items = handle.complete();
        self.phase = FramePhase::BatchComplete;

        self.state.restore(items)?;
        self.simulation.apply(self.state.as_slice()?);
        self.phase = FramePhase::ResultsApplied;

        debug!("{}: tick {} applied", self.simulation.label(), self.ticks);
        self.phase = FramePhase::Idle;
        Ok(())
    }

    /// Finishes any in-flight batch, then releases every buffer exactly once.
    pub fn teardown(&mut self) -> Result<(), DriverError> {
        if self.phase == FramePhase::TornDown {
            return Err(DriverError::TornDown);
        }
        if self.pending.is_some() {
            self.complete()?;
        }

        self.state.dispose()?;
        self.simulation.release()?;
        self.phase = FramePhase::TornDown;
        info!(
            "{}: torn down after {} ticks",
            self.simulation.label(),
            self.ticks
        );
        Ok(())
    }
}

impl<S: BatchSimulation + std::fmt::Debug> std::fmt::Debug for FrameDriver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDriver")
            .field("simulation", &self.simulation)
            .field("phase", &self.phase)
            .field("ticks", &self.ticks)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AddElapsed {
        elapsed: f32,
    }

    impl ParallelForJob for AddElapsed {
        type Item = f32;

        fn execute(&self, index: usize, item: &mut f32) {
            *item += self.elapsed + index as f32;
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        count: usize,
        published: Vec<f32>,
        applied: usize,
        released: bool,
    }

    impl BatchSimulation for Counter {
        type Job = AddElapsed;

        fn label(&self) -> &'static str {
            "counter"
        }

        fn entity_count(&self) -> usize {
            self.count
        }

        fn build_job(&mut self, time: FrameTime) -> Result<AddElapsed, DriverError> {
            Ok(AddElapsed {
                elapsed: time.elapsed,
            })
        }

        fn apply(&mut self, items: &[f32]) {
            self.published = items.to_vec();
            self.applied += 1;
        }

        fn release(&mut self) -> Result<(), BufferError> {
            self.released = true;
            Ok(())
        }
    }

    fn driver(count: usize) -> FrameDriver<Counter> {
        let counter = Counter {
            count,
            ..Counter::default()
        };
        FrameDriver::init(counter, vec![0.0; count], 3).unwrap()
    }

    #[test]
    fn test_tick_then_complete_applies_results() {
        let scheduler = JobScheduler::new(Some(2));
        let mut driver = driver(5);
        assert_eq!(driver.simulation().applied, 1);

        driver.tick(&scheduler, FrameTime::new(1.0, 0.1)).unwrap();
        assert_eq!(driver.phase(), FramePhase::BatchDispatched);
        assert!(driver.items().is_err(), "state is owned by the batch");

        driver.complete().unwrap();
        assert_eq!(driver.phase(), FramePhase::Idle);
        assert_eq!(driver.simulation().published, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(driver.items().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(driver.simulation().applied, 2);
    }

    #[test]
    fn test_ticks_accumulate() {
        let scheduler = JobScheduler::new(Some(2));
        let mut driver = driver(2);
        for tick in 1..=3 {
            driver
                .tick(&scheduler, FrameTime::new(tick as f32, 1.0))
                .unwrap();
            driver.complete().unwrap();
        }
        assert_eq!(driver.ticks(), 3);
        assert_eq!(driver.items().unwrap(), &[6.0, 9.0]);
    }

    #[test]
    fn test_second_complete_fails() {
        let scheduler = JobScheduler::new(Some(1));
        let mut driver = driver(2);
        driver.tick(&scheduler, FrameTime::default()).unwrap();
        driver.complete().unwrap();
        assert_eq!(driver.complete(), Err(DriverError::NoPendingBatch));
    }

    #[test]
    fn test_tick_while_pending_fails() {
        let scheduler = JobScheduler::new(Some(1));
        let mut driver = driver(2);
        driver.tick(&scheduler, FrameTime::default()).unwrap();
        assert_eq!(
            driver.tick(&scheduler, FrameTime::default()),
            Err(DriverError::BatchAlreadyPending)
        );
        driver.complete().unwrap();
        assert_eq!(driver.ticks(), 1);
    }

    #[test]
    fn test_init_rejects_mismatched_sizes() {
        let counter = Counter {
            count: 4,
            ..Counter::default()
        };
        let err = FrameDriver::init(counter, vec![0.0; 3], 1).unwrap_err();
        assert_eq!(
            err,
            DriverError::Buffer(BufferError::LengthMismatch {
                label: "counter",
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_init_rejects_zero_batch() {
        let err = FrameDriver::init(Counter::default(), Vec::new(), 0).unwrap_err();
        assert_eq!(err, DriverError::Job(JobError::InvalidBatchSize));
    }

    #[test]
    fn test_teardown_completes_pending_and_blocks_access() {
        let scheduler = JobScheduler::new(Some(2));
        let mut driver = driver(3);
        driver.tick(&scheduler, FrameTime::new(2.0, 0.5)).unwrap();

        driver.teardown().unwrap();
        assert_eq!(driver.phase(), FramePhase::TornDown);
        assert!(driver.simulation().released);
        assert_eq!(driver.simulation().published, vec![2.0, 3.0, 4.0]);

        assert_eq!(driver.items(), Err(DriverError::TornDown));
        assert_eq!(
            driver.tick(&scheduler, FrameTime::default()),
            Err(DriverError::TornDown)
        );
        assert_eq!(driver.complete(), Err(DriverError::TornDown));
        assert_eq!(driver.teardown(), Err(DriverError::TornDown));
    }
}
