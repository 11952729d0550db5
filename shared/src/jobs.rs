//! Job scheduling over a fixed-size worker pool.
//!
//! Jobs are dispatched onto a [`TaskPool`] and report completion through a
//! [`JobHandle`]. A parallel-for job splits its items into contiguous batches;
//! each batch is moved into exactly one worker task, so no two workers can
//! ever write the same slot. The batches are stitched back together in index
//! order when the coordinator task finishes.
//!
//! ```text
//!  schedule_parallel_for(items, B)
//!        │
//!        ▼
//!  coordinator task ── awaits predecessor (optional)
//!        │
//!        ├── batch 0: [0, B)        ── worker
//!        ├── batch 1: [B, 2B)       ── worker
//!        └── batch k: [kB, N)       ── worker
//!        │
//!        ▼
//!  Vec<Item> in index order  ──►  JobHandle::complete()
//! ```

use std::sync::Arc;

use bevy::tasks::{available_parallelism, block_on, Task, TaskPool, TaskPoolBuilder};
use futures_lite::future;
use log::debug;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,
}

/// A unit of work that runs once on a worker thread.
///
/// The job owns everything it writes; the scheduler hands the job back once
/// it has executed so the caller can read its output buffers.
pub trait Job: Send + 'static {
    fn execute(&mut self);
}

/// A job executed once per entity index, possibly on many workers at once.
///
/// `execute` only receives `&self`, so the job's fields act as the read-only
/// parameters shared by every batch of a tick.
pub trait ParallelForJob: Send + Sync + 'static {
    type Item: Send + 'static;

    fn execute(&self, index: usize, item: &mut Self::Item);
}

/// Completion handle for a dispatched job.
///
/// Completing consumes the handle, so the same job can never be awaited twice.
#[must_use = "a job handle must be completed to read the job's output"]
pub struct JobHandle<T> {
    task: Task<T>,
}

impl<T> JobHandle<T> {
    pub fn is_completed(&self) -> bool {
        self.task.is_finished()
    }

    /// Blocks the calling thread until the job and all of its predecessors finish.
    pub fn complete(self) -> T {
        block_on(self.task)
    }
}

impl<T> std::fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Splits `items` into owned, contiguous batches of at most `batch_size`.
///
/// Returns `(first_index, batch)` pairs in index order.
fn partition<T>(mut items: Vec<T>, batch_size: usize) -> Vec<(usize, Vec<T>)> {
    let mut batches = Vec::with_capacity(items.len().div_ceil(batch_size));
    while !items.is_empty() {
        let start = (items.len() - 1) / batch_size * batch_size;
        let tail = items.split_off(start);
        batches.push((start, tail));
    }
    batches.reverse();
    batches
}

async fn run_batches<J: ParallelForJob>(
    pool: Arc<TaskPool>,
    job: Arc<J>,
    items: Vec<J::Item>,
    batch_size: usize,
) -> Vec<J::Item> {
    let len = items.len();
    let batches = partition(items, batch_size);
    let batch_count = batches.len();

    let tasks: Vec<Task<Vec<J::Item>>> = batches
        .into_iter()
        .map(|(start, mut batch)| {
            let job = Arc::clone(&job);
            pool.spawn(async move {
                for (offset, item) in batch.iter_mut().enumerate() {
                    job.execute(start + offset, item);
                }
                batch
            })
        })
        .collect();

    let mut output = Vec::with_capacity(len);
    for task in tasks {
        output.extend(task.await);
    }

    debug!("parallel-for finished: {len} items in {batch_count} batches of {batch_size}");
    output
}

/// Dispatches jobs onto a dedicated worker pool.
#[derive(Clone)]
pub struct JobScheduler {
    pool: Arc<TaskPool>,
}

impl JobScheduler {
    /// Builds a pool with `worker_threads` threads, or one per available core.
    pub fn new(worker_threads: Option<usize>) -> Self {
        let threads = worker_threads.unwrap_or_else(available_parallelism).max(1);
        let pool = TaskPoolBuilder::new()
            .num_threads(threads)
            .thread_name("shoal-worker".to_string())
            .build();
        debug!("job scheduler started with {threads} worker threads");

        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.thread_num()
    }

    pub fn schedule<J: Job>(&self, mut job: J) -> JobHandle<J> {
        let task = self.pool.spawn(async move {
            job.execute();
            job
        });
        JobHandle { task }
    }

    /// Schedules a job that starts only after `dependency` has fully completed.
    ///
    /// `build` receives the predecessor's output and produces the next job.
    pub fn schedule_after<P, J, F>(&self, dependency: JobHandle<P>, build: F) -> JobHandle<J>
    where
        P: Send + 'static,
        J: Job,
        F: FnOnce(P) -> J + Send + 'static,
    {
        let task = self.pool.spawn(async move {
            let previous = dependency.task.await;
            let mut job = build(previous);
            job.execute();
            job
        });
        JobHandle { task }
    }

    /// Runs `job` once for every index of `items`, `batch_size` indices per worker task.
    pub fn schedule_parallel_for<J: ParallelForJob>(
        &self,
        job: J,
        items: Vec<J::Item>,
        batch_size: usize,
    ) -> Result<JobHandle<Vec<J::Item>>, JobError> {
        if batch_size == 0 {
            return Err(JobError::InvalidBatchSize);
        }

        let pool = Arc::clone(&self.pool);
        let job = Arc::new(job);
        let task = self
            .pool
            .spawn(run_batches(pool, job, items, batch_size));
        Ok(JobHandle { task })
    }

    /// Runs a parallel-for over the items produced by `dependency` once it completes.
    pub fn schedule_parallel_for_after<J: ParallelForJob>(
        &self,
        dependency: JobHandle<Vec<J::Item>>,
        job: J,
        batch_size: usize,
    ) -> Result<JobHandle<Vec<J::Item>>, JobError> {
        if batch_size == 0 {
            return Err(JobError::InvalidBatchSize);
        }

        let pool = Arc::clone(&self.pool);
        let job = Arc::new(job);
        let task = self.pool.spawn(async move {
            let items = dependency.task.await;
            run_batches(pool, job, items, batch_size).await
        });
        Ok(JobHandle { task })
    }

    /// Returns a handle that completes once both `first` and `second` have.
    pub fn combine<A, B>(&self, first: JobHandle<A>, second: JobHandle<B>) -> JobHandle<(A, B)>
    where
        A: Send + 'static,
        B: Send + 'static,
    {
        let task = self
            .pool
            .spawn(future::zip(first.task, second.task));
        JobHandle { task }
    }
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("worker_count", &self.worker_count())
            .finish()
    }
}
