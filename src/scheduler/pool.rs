//! An elastic pool of worker threads reporting every finished job to a listener.
//!
//! Up to `core_threads` workers stay alive for the lifetime of the pool. When a job is queued
//! and no worker is idle, additional workers are spawned up to `max_threads`; those exit again
//! after being idle for `keep_alive`. Work generation is left to the [`CompletionListener`],
//! which receives a handle to the pool and may submit follow-up jobs.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::config::PoolConfig;
use crate::error::{Result, scheduling_failure};

/// A unit of work for the pool
pub trait Job: Send + 'static {
    type Output: Send + 'static;

    fn run(self) -> Self::Output;
}

/// A job which panicked instead of producing its output
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("worker {worker} panicked with: {message}")]
pub struct JobFailure {
    pub worker: String,
    pub message: String,
}

impl JobFailure {
    fn from_panic(panic: Box<dyn std::any::Any + Send>) -> Self {
        let worker = std::thread::current()
            .name()
            .unwrap_or("UNKNOWN")
            .to_string();

        let message = if let Some(message) = panic.downcast_ref::<&str>() {
            message.to_string()
        } else if let Some(message) = panic.downcast_ref::<String>() {
            message.clone()
        } else {
            "UNKNOWN".to_string()
        };

        JobFailure { worker, message }
    }
}

/// Receives the outcome of every job, on the worker thread that ran it
pub trait CompletionListener<J: Job>: Send + Sync + 'static {
    fn on_complete(
        &self,
        outcome: std::result::Result<J::Output, JobFailure>,
        pool: &WorkerPool<J>,
    );
}

/// Handle to a running pool. Cloning the handle does not create a new pool.
pub struct WorkerPool<J: Job> {
    shared: Arc<Shared<J>>,
}

impl<J: Job> Clone for WorkerPool<J> {
    fn clone(&self) -> Self {
        WorkerPool {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<J: Job> std::fmt::Debug for WorkerPool<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("WorkerPool")
            .field("config", &self.shared.config)
            .field("workers", &state.workers)
            .field("idle", &state.idle)
            .field("queued", &state.queue.len())
            .field("shutdown", &state.shutdown)
            .finish_non_exhaustive()
    }
}

struct Shared<J: Job> {
    config: PoolConfig,
    state: Mutex<PoolState<J>>,
    /// Signalled when a job is queued or the pool shuts down
    job_available: Condvar,
    /// Signalled when the last worker exits after shutdown
    terminated: Condvar,
    listener: Box<dyn CompletionListener<J>>,
}

struct PoolState<J> {
    queue: VecDeque<J>,
    /// Alive workers, busy or idle
    workers: usize,
    /// Workers waiting for a job
    idle: usize,
    /// The largest number of workers alive at the same time
    largest_workers: usize,
    next_worker_id: usize,
    shutdown: bool,
}

impl<J: Job> WorkerPool<J> {
    /// Build a pool, spawning the core workers if the config asks for it
    pub fn new(config: PoolConfig, listener: impl CompletionListener<J>) -> Result<Self> {
        config.validate()?;

        let prestart = if config.prestart_core_threads {
            config.core_threads
        } else {
            0
        };

        let pool = WorkerPool {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    workers: 0,
                    idle: 0,
                    largest_workers: 0,
                    next_worker_id: 0,
                    shutdown: false,
                }),
                job_available: Condvar::new(),
                terminated: Condvar::new(),
                listener: Box::new(listener),
            }),
        };

        let prestarted = {
            let mut state = pool.shared.state.lock();
            (0..prestart).try_for_each(|_| pool.spawn_worker(&mut state))
        };
        if let Err(error) = prestarted {
            pool.shutdown();
            return Err(error);
        }

        Ok(pool)
    }

    /// Queue a job, spawning a worker if none is free to take it
    pub fn execute(&self, job: J) -> Result<()> {
        let config = &self.shared.config;
        let mut state = self.shared.state.lock();

        if state.shutdown {
            return Err(scheduling_failure!("the worker pool is shut down"));
        }
        if let Some(capacity) = config.queue_capacity {
            if state.queue.len() >= capacity {
                return Err(scheduling_failure!("the job queue is full ({capacity} jobs)"));
            }
        }

        state.queue.push_back(job);

        let needs_worker = state.workers < config.core_threads
            || (state.queue.len() > state.idle && state.workers < config.max_threads);
        if needs_worker {
            if let Err(error) = self.spawn_worker(&mut state) {
                state.queue.pop_back();
                return Err(error);
            }
        }

        self.shared.job_available.notify_one();

        Ok(())
    }

    /// Stop accepting jobs. Queued jobs still run, then all workers exit.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        self.shared.job_available.notify_all();
        self.notify_if_terminated(&state);
    }

    /// Stop accepting jobs and drop everything still queued, returning how many jobs were
    /// dropped. Running jobs are not interrupted.
    pub fn shutdown_now(&self) -> usize {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        let discarded = state.queue.len();
        state.queue.clear();
        self.shared.job_available.notify_all();
        self.notify_if_terminated(&state);

        if discarded > 0 {
            tracing::debug!(discarded, "discarded queued jobs");
        }

        discarded
    }

    /// Wait until every worker has exited after a shutdown. Returns `false` on timeout.
    pub fn await_termination(&self, timeout: std::time::Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.shared.state.lock();

        while !(state.shutdown && state.workers == 0) {
            if self
                .shared
                .terminated
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.shutdown && state.workers == 0;
            }
        }

        true
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// The number of alive workers
    pub fn workers(&self) -> usize {
        self.shared.state.lock().workers
    }

    /// The largest number of workers that were alive at the same time
    pub fn largest_workers(&self) -> usize {
        self.shared.state.lock().largest_workers
    }

    /// The number of jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    fn spawn_worker(&self, state: &mut PoolState<J>) -> Result<()> {
        let id = state.next_worker_id;
        let pool = self.clone();

        std::thread::Builder::new()
            .name(format!("merge-worker-{id}"))
            .spawn(move || pool.work())
            .map_err(|error| scheduling_failure!("failed to spawn worker {id}: {error}"))?;

        state.next_worker_id += 1;
        state.workers += 1;
        state.largest_workers = std::cmp::max(state.largest_workers, state.workers);

        tracing::trace!(id, workers = state.workers, "spawned worker");

        Ok(())
    }

    /// The worker loop
    fn work(self) {
        while let Some(job) = self.next_job() {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job.run()))
                .map_err(JobFailure::from_panic);

            if let Err(failure) = &outcome {
                tracing::error!(%failure, "job panicked");
            }

            self.shared.listener.on_complete(outcome, &self);
        }
    }

    /// Block until a job is available. Returns `None` when this worker should exit.
    fn next_job(&self) -> Option<J> {
        let config = &self.shared.config;
        let mut state = self.shared.state.lock();

        loop {
            if let Some(job) = state.queue.pop_front() {
                return Some(job);
            }

            if state.shutdown {
                state.workers -= 1;
                self.notify_if_terminated(&state);
                return None;
            }

            state.idle += 1;
            let timed_out = if state.workers > config.core_threads {
                self.shared
                    .job_available
                    .wait_for(&mut state, config.keep_alive)
                    .timed_out()
            } else {
                self.shared.job_available.wait(&mut state);
                false
            };
            state.idle -= 1;

            if timed_out && state.queue.is_empty() && state.workers > config.core_threads {
                state.workers -= 1;
                self.notify_if_terminated(&state);
                tracing::trace!(workers = state.workers, "idle worker exiting");
                return None;
            }
        }
    }

    fn notify_if_terminated(&self, state: &PoolState<J>) {
        if state.shutdown && state.workers == 0 {
            self.shared.terminated.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    /// A job running a closure
    struct FnJob<F>(F);

    impl<F: FnOnce() -> u32 + Send + 'static> Job for FnJob<F> {
        type Output = u32;

        fn run(self) -> u32 {
            (self.0)()
        }
    }

    type Outcome = std::result::Result<u32, JobFailure>;

    /// Collects all outcomes
    #[derive(Clone, Default)]
    struct Collector(Arc<(Mutex<Vec<Outcome>>, Condvar)>);

    impl Collector {
        fn wait_for(&self, count: usize) -> Vec<Outcome> {
            let (outcomes, condvar) = &*self.0;
            let mut outcomes = outcomes.lock();
            while outcomes.len() < count {
                let timed_out = condvar
                    .wait_for(&mut outcomes, Duration::from_secs(10))
                    .timed_out();
                assert!(!timed_out, "Jobs did not finish in time");
            }
            outcomes.clone()
        }
    }

    impl<F: FnOnce() -> u32 + Send + 'static> CompletionListener<FnJob<F>> for Collector {
        fn on_complete(&self, outcome: Outcome, _pool: &WorkerPool<FnJob<F>>) {
            let (outcomes, condvar) = &*self.0;
            outcomes.lock().push(outcome);
            condvar.notify_all();
        }
    }

    type BoxedJob = FnJob<Box<dyn FnOnce() -> u32 + Send>>;

    fn job(f: impl FnOnce() -> u32 + Send + 'static) -> BoxedJob {
        FnJob(Box::new(f))
    }

    #[test]
    fn runs_all_jobs() {
        let collector = Collector::default();
        let pool = WorkerPool::new(PoolConfig::fixed(3), collector.clone()).unwrap();

        for value in 0..20 {
            pool.execute(job(move || value * 2)).unwrap();
        }

        let mut outputs: Vec<u32> = collector
            .wait_for(20)
            .into_iter()
            .map(|outcome| outcome.unwrap())
            .collect();
        outputs.sort();
        assert_eq!(outputs, (0..20).map(|value| value * 2).collect::<Vec<_>>());

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(10)));
        assert_eq!(pool.workers(), 0);
        assert!(pool.largest_workers() <= 3);
    }

    #[test]
    fn panics_are_reported() {
        let collector = Collector::default();
        let pool = WorkerPool::new(PoolConfig::fixed(1), collector.clone()).unwrap();

        pool.execute(job(|| panic!("bad comparison"))).unwrap();
        pool.execute(job(|| 7)).unwrap();

        let outcomes = collector.wait_for(2);
        let failure = outcomes[0].clone().unwrap_err();
        assert_eq!(failure.message, "bad comparison");
        assert!(failure.worker.starts_with("merge-worker-"));
        // The worker survives the panic
        assert_eq!(outcomes[1], Ok(7));

        pool.shutdown();
    }

    #[test]
    fn rejects_jobs_after_shutdown() {
        let pool: WorkerPool<BoxedJob> =
            WorkerPool::new(PoolConfig::fixed(1), Collector::default()).unwrap();
        pool.shutdown();

        assert!(pool.is_shutdown());
        assert!(matches!(
            pool.execute(job(|| 1)),
            Err(crate::error::SortError::SchedulingFailure(_))
        ));
        assert!(pool.await_termination(Duration::from_secs(10)));
    }

    #[test]
    fn bounded_queue_rejects_overflow() {
        let config = PoolConfig {
            core_threads: 0,
            max_threads: 1,
            queue_capacity: Some(1),
            prestart_core_threads: false,
            ..Default::default()
        };
        let collector = Collector::default();
        let pool = WorkerPool::new(config, collector.clone()).unwrap();

        let (release, gate) = std::sync::mpsc::channel::<()>();
        pool.execute(job(move || {
            gate.recv().unwrap();
            1
        }))
        .unwrap();

        // Wait for the only worker to pick up the blocking job
        while pool.queued() > 0 {
            std::thread::sleep(Duration::from_millis(1));
        }

        pool.execute(job(|| 2)).unwrap();
        assert!(matches!(
            pool.execute(job(|| 3)),
            Err(crate::error::SortError::SchedulingFailure(_))
        ));

        release.send(()).unwrap();
        assert_eq!(collector.wait_for(2).len(), 2);
        pool.shutdown();
    }

    #[test]
    fn shutdown_now_discards_queued_jobs() {
        let config = PoolConfig {
            core_threads: 1,
            max_threads: 1,
            ..Default::default()
        };
        let collector = Collector::default();
        let pool = WorkerPool::new(config, collector.clone()).unwrap();

        let (release, gate) = std::sync::mpsc::channel::<()>();
        pool.execute(job(move || {
            gate.recv().unwrap();
            1
        }))
        .unwrap();
        while pool.queued() > 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        pool.execute(job(|| 2)).unwrap();
        pool.execute(job(|| 3)).unwrap();

        assert_eq!(pool.shutdown_now(), 2);
        release.send(()).unwrap();

        // The running job still completes
        assert_eq!(collector.wait_for(1), vec![Ok(1)]);
        assert!(pool.await_termination(Duration::from_secs(10)));
    }

    #[test]
    fn extra_workers_exit_after_keep_alive() {
        let config = PoolConfig {
            core_threads: 1,
            max_threads: 4,
            keep_alive: Duration::from_millis(20),
            ..Default::default()
        };
        let collector = Collector::default();
        let pool = WorkerPool::new(config, collector.clone()).unwrap();

        for value in 0..8 {
            pool.execute(job(move || {
                std::thread::sleep(Duration::from_millis(10));
                value
            }))
            .unwrap();
        }
        collector.wait_for(8);
        assert!(pool.largest_workers() <= 4);

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while pool.workers() > 1 {
            assert!(
                std::time::Instant::now() < deadline,
                "Extra workers were not reaped"
            );
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pool.workers(), 1);

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(10)));
    }
}
