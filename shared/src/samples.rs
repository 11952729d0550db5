//! Smallest possible uses of the job system: one job, two chained jobs, and a
//! parallel-for. Each sample allocates its buffer, lends it to the job,
//! waits, reads the result and disposes the buffer.

use log::{info, warn};
use thiserror::Error;

use crate::buffer::{BufferError, NativeArray};
use crate::jobs::{Job, JobError, JobScheduler, ParallelForJob};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Writes `a + b` into the first slot of its result buffer.
pub struct JobSingle {
    pub a: i32,
    pub b: i32,
    pub result: Vec<i32>,
}

impl Job for JobSingle {
    fn execute(&mut self) {
        if let Some(slot) = self.result.first_mut() {
            *slot = self.a.wrapping_add(self.b);
        }
    }
}

/// Adds one to the first slot of its result buffer.
pub struct JobAdd {
    pub result: Vec<i32>,
}

impl Job for JobAdd {
    fn execute(&mut self) {
        if let Some(slot) = self.result.first_mut() {
            *slot = slot.wrapping_add(1);
        }
    }
}

/// Stores every index into its own slot.
pub struct JobParallel;

impl ParallelForJob for JobParallel {
    type Item = i32;

    fn execute(&self, index: usize, item: &mut i32) {
        *item = index as i32;
    }
}

pub fn run_single_job(scheduler: &JobScheduler, a: i32, b: i32) -> Result<i32, SampleError> {
    let mut result = NativeArray::<i32>::new("single result", 1);

    let handle = scheduler.schedule(JobSingle {
        a,
        b,
        result: result.lend()?,
    });
    let job = handle.complete();

    result.restore(job.result)?;
    let value = *result.get(0)?;
    result.dispose()?;

    warn!("result : {value}");
    Ok(value)
}

/// Runs [`JobSingle`] and then [`JobAdd`] on the same buffer; the add waits for the sum.
pub fn run_dependent_jobs(scheduler: &JobScheduler, a: i32, b: i32) -> Result<i32, SampleError> {
    let mut result = NativeArray::<i32>::new("chained result", 1);

    let single = scheduler.schedule(JobSingle {
        a,
        b,
        result: result.lend()?,
    });
    let add = scheduler.schedule_after(single, |single: JobSingle| JobAdd {
        result: single.result,
    });
    let job = add.complete();

    result.restore(job.result)?;
    let value = *result.get(0)?;
    result.dispose()?;

    warn!("result : {value}");
    Ok(value)
}

pub fn run_parallel_for(
    scheduler: &JobScheduler,
    count: usize,
    batch_size: usize,
) -> Result<Vec<i32>, SampleError> {
    let mut result = NativeArray::<i32>::new("parallel result", count);

    let handle = scheduler.schedule_parallel_for(JobParallel, result.lend()?, batch_size)?;
    result.restore(handle.complete())?;
    let values = result.as_slice()?.to_vec();
    result.dispose()?;

    info!(
        "parallel-for wrote {count} indices in {} batches",
        count.div_ceil(batch_size)
    );
    Ok(values)
}
