//! Concurrent reduction of partition lists.
//!
//! Every input partition starts as its own sorted list. The scheduler pairs up pending lists,
//! merges each pair as a [`MergeJob`] on a [`pool::WorkerPool`] and puts the result back into
//! the pending lists. New jobs are only created when a job completes, inside the completion
//! listener and under the scheduler lock, so two workers can never take the same lists and the
//! final list is detected exactly once.
//!
//! One work path for five single-value partitions and two workers:
//!
//! ```text
//! worker 0: (3) + (1)       => (1, 3)
//! worker 1: (5) + (2)       => (2, 5)
//! worker 0: (4) + (1, 3)    => (1, 3, 4)
//! worker 0: (2, 5) + (1, 3, 4) => (1, 2, 3, 4, 5)
//! ```

pub mod pool;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use crate::config::SortConfig;
use crate::container::{Container as _, Partition};
use crate::error::{Result, SortError, scheduling_failure};
use crate::merging::{chunking::ChunkSizing, containers};

use self::pool::{CompletionListener, Job, JobFailure, WorkerPool};

/// A sorted list of partitions
pub type PartitionList<T> = Vec<Partition<T>>;

/// Merges two sorted partition lists into one
#[derive(Debug)]
pub struct MergeJob<T> {
    left: PartitionList<T>,
    right: PartitionList<T>,
    sizing: ChunkSizing,
}

impl<T> MergeJob<T> {
    pub fn new(left: PartitionList<T>, right: PartitionList<T>, sizing: ChunkSizing) -> Self {
        MergeJob {
            left,
            right,
            sizing,
        }
    }
}

impl<T: Ord + Send + 'static> Job for MergeJob<T> {
    type Output = PartitionList<T>;

    fn run(self) -> PartitionList<T> {
        containers::merge(self.left, self.right, self.sizing)
    }
}

/// Lets another thread interrupt a waiting [`MergeScheduler::run`]
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<InterruptInner>,
}

#[derive(Default)]
struct InterruptInner {
    interrupted: AtomicBool,
    waiters: Mutex<Vec<Weak<dyn Wake>>>,
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupt")
            .field("interrupted", &self.is_interrupted())
            .finish_non_exhaustive()
    }
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt every run waiting on this handle, now and in the future
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        self.inner
            .waiters
            .lock()
            .retain(|waiter| match waiter.upgrade() {
                Some(waiter) => {
                    waiter.wake();
                    true
                }
                None => false,
            });
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    fn register(&self, waiter: Weak<dyn Wake>) {
        let mut waiters = self.inner.waiters.lock();
        // Runs that already returned
        waiters.retain(|waiter| waiter.strong_count() > 0);
        waiters.push(waiter);
    }
}

/// Something blocked that has to re-check its state
trait Wake: Send + Sync {
    fn wake(&self);
}

/// State shared between the waiting caller and the completion listener
struct Progress<T> {
    state: Mutex<SchedulerState<T>>,
    /// Signalled when an outcome is available
    changed: Condvar,
}

struct SchedulerState<T> {
    /// Lists waiting to be merged, in no particular order
    pending: VecDeque<PartitionList<T>>,
    /// The number of values in all input partitions
    total_values: usize,
    /// Jobs submitted to the pool that did not complete yet
    in_flight: usize,
    /// Set once the run is decided; later completions are discarded
    finished: bool,
    outcome: Option<Result<PartitionList<T>>>,
}

impl<T> SchedulerState<T> {
    /// Remove two pending lists, if there are at least two
    fn take_pair(&mut self) -> Option<(PartitionList<T>, PartitionList<T>)> {
        take_pair(&mut self.pending)
    }

    fn finish(&mut self, outcome: Result<PartitionList<T>>) {
        self.finished = true;
        self.outcome = Some(outcome);
    }
}

impl<T: Send> Wake for Progress<T> {
    fn wake(&self) {
        // Taking the lock orders this wakeup after the caller's last check
        let _state = self.state.lock();
        self.changed.notify_all();
    }
}

fn take_pair<L>(pending: &mut VecDeque<L>) -> Option<(L, L)> {
    if pending.len() < 2 {
        return None;
    }

    let left = pending.pop_front()?;
    let right = pending.pop_front()?;
    Some((left, right))
}

fn value_count<T: Ord>(list: &[Partition<T>]) -> usize {
    list.iter().map(|partition| partition.value_count()).sum()
}

/// Folds finished jobs back into the scheduler state and generates new jobs
struct MergeListener<T> {
    progress: Arc<Progress<T>>,
    sizing: ChunkSizing,
}

impl<T: Ord + Send + 'static> CompletionListener<MergeJob<T>> for MergeListener<T> {
    fn on_complete(
        &self,
        outcome: std::result::Result<PartitionList<T>, JobFailure>,
        pool: &WorkerPool<MergeJob<T>>,
    ) {
        let mut state = self.progress.state.lock();
        state.in_flight -= 1;

        if state.finished {
            tracing::trace!("discarding merge result of a finished run");
            return;
        }

        let output = match outcome {
            Ok(output) => output,
            Err(failure) => {
                let discarded = pool.shutdown_now();
                tracing::error!(%failure, discarded, "merge job failed, aborting");
                state.finish(Err(SortError::Fatal(failure.to_string())));
                self.progress.changed.notify_all();
                return;
            }
        };

        let values = value_count(&output);
        state.pending.push_back(output);

        if values == state.total_values && state.in_flight == 0 && state.pending.len() == 1 {
            let merged = state.pending.pop_front().unwrap_or_default();
            tracing::debug!(partitions = merged.len(), values, "merge converged");

            state.finish(Ok(merged));
            pool.shutdown();
            self.progress.changed.notify_all();
            return;
        }

        if let Some((left, right)) = state.take_pair() {
            tracing::trace!(
                left = left.len(),
                right = right.len(),
                pending = state.pending.len(),
                "submitting merge job"
            );

            match pool.execute(MergeJob::new(left, right, self.sizing)) {
                Ok(()) => state.in_flight += 1,
                Err(error) => {
                    pool.shutdown_now();
                    tracing::error!(%error, "could not submit merge job");
                    state.finish(Err(error));
                    self.progress.changed.notify_all();
                }
            }
        }
    }
}

/// Sorts partitions by repeatedly merging pairs of sorted lists on a worker pool
#[derive(Debug, Clone, Default)]
pub struct MergeScheduler {
    config: SortConfig,
    interrupt: Option<Interrupt>,
}

impl MergeScheduler {
    pub fn new(config: SortConfig) -> Self {
        MergeScheduler {
            config,
            interrupt: None,
        }
    }

    /// Allow the run to be interrupted through `interrupt`
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Merge all partitions into one sorted list of partitions.
    ///
    /// Blocks until the merge converged, a job failed, the run was interrupted or the
    /// configured timeout elapsed.
    pub fn run<T: Ord + Send + 'static>(
        &self,
        partitions: Vec<Partition<T>>,
    ) -> Result<PartitionList<T>> {
        self.config.validate()?;
        if self.config.validate_input {
            validate_partitions(&partitions)?;
        }

        if partitions.len() < 2 {
            return Ok(partitions);
        }

        let total_values = value_count(&partitions);
        let mut pending: VecDeque<PartitionList<T>> =
            partitions.into_iter().map(|partition| vec![partition]).collect();

        let mut jobs = Vec::with_capacity(pending.len() / 2);
        while let Some((left, right)) = take_pair(&mut pending) {
            jobs.push(MergeJob::new(left, right, self.config.sizing));
        }

        tracing::debug!(
            lists = jobs.len() * 2 + pending.len(),
            jobs = jobs.len(),
            total_values,
            "starting merge"
        );

        let progress = Arc::new(Progress {
            state: Mutex::new(SchedulerState {
                pending,
                total_values,
                in_flight: jobs.len(),
                finished: false,
                outcome: None,
            }),
            changed: Condvar::new(),
        });

        if let Some(interrupt) = &self.interrupt {
            let waiter: Weak<dyn Wake> = Arc::<Progress<T>>::downgrade(&progress);
            interrupt.register(waiter);
        }

        let listener = MergeListener {
            progress: Arc::clone(&progress),
            sizing: self.config.sizing,
        };
        let pool = WorkerPool::new(self.config.pool.clone(), listener)?;

        let job_count = jobs.len();
        for (submitted, job) in jobs.into_iter().enumerate() {
            if let Err(error) = pool.execute(job) {
                let mut state = progress.state.lock();
                state.in_flight -= job_count - submitted;
                state.finished = true;
                pool.shutdown_now();
                return Err(error);
            }
        }

        self.await_outcome(&progress, &pool)
    }

    /// Block until the listener decided the outcome
    fn await_outcome<T: Ord + Send + 'static>(
        &self,
        progress: &Progress<T>,
        pool: &WorkerPool<MergeJob<T>>,
    ) -> Result<PartitionList<T>> {
        let deadline = self
            .config
            .await_timeout
            .map(|timeout| std::time::Instant::now() + timeout);
        let mut state = progress.state.lock();

        loop {
            if let Some(outcome) = state.outcome.take() {
                return outcome;
            }

            if self
                .interrupt
                .as_ref()
                .is_some_and(Interrupt::is_interrupted)
            {
                state.finished = true;
                let discarded = pool.shutdown_now();
                tracing::warn!(
                    in_flight = state.in_flight,
                    discarded,
                    "interrupted while waiting for the merge"
                );
                return Err(SortError::Cancelled);
            }

            match deadline {
                Some(deadline) => {
                    let timed_out = progress
                        .changed
                        .wait_until(&mut state, deadline)
                        .timed_out();
                    if timed_out && state.outcome.is_none() {
                        state.finished = true;
                        pool.shutdown_now();
                        tracing::warn!(
                            in_flight = state.in_flight,
                            "timed out waiting for the merge"
                        );
                        return Err(scheduling_failure!(
                            "merge did not finish within {:?}",
                            self.config.await_timeout.unwrap_or_default()
                        ));
                    }
                }
                None => progress.changed.wait(&mut state),
            }
        }
    }
}

/// Check that every block is non-decreasing. Sibling blocks may overlap each other.
fn validate_partitions<T: Ord>(partitions: &[Partition<T>]) -> Result<()> {
    for (index, partition) in partitions.iter().enumerate() {
        if let Some(block) = partition.blocks().iter().position(|block| !block.is_sorted()) {
            return Err(SortError::InvalidInput(format!(
                "block {block} of partition {index} is not sorted"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::config::PoolConfig;
    use crate::container::Container as _;

    fn partitions(input: &[&[&[u32]]]) -> Vec<Partition<u32>> {
        input
            .iter()
            .map(|blocks| Partition::from(blocks.iter().map(|b| b.to_vec()).collect::<Vec<_>>()))
            .collect()
    }

    fn flatten<T>(list: PartitionList<T>) -> Vec<T> {
        list.into_iter().flat_map(Partition::into_values).collect()
    }

    #[test]
    fn degenerate_inputs_skip_the_pool() {
        let scheduler = MergeScheduler::default();
        assert!(scheduler.run(Vec::<Partition<u32>>::new()).unwrap().is_empty());

        let single = partitions(&[&[&[1], &[2, 3]]]);
        assert_eq!(scheduler.run(single.clone()).unwrap(), single);
    }

    #[test]
    fn merges_into_one_list() {
        let scheduler = MergeScheduler::new(SortConfig::default().with_threads(2));
        let merged = scheduler
            .run(partitions(&[&[&[5], &[6]], &[&[3], &[4]], &[&[1], &[2]]]))
            .unwrap();

        // Disjoint partitions are never decomposed
        assert_eq!(merged.len(), 3);
        assert_eq!(flatten(merged), [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn only_empty_partitions() {
        let scheduler = MergeScheduler::new(SortConfig::default().with_threads(3));
        let merged = scheduler
            .run(partitions(&[&[&[]], &[&[], &[]], &[], &[&[]]]))
            .unwrap();
        assert!(flatten(merged).is_empty());
    }

    #[test]
    fn take_pair_is_fifo() {
        let mut pending: VecDeque<u32> = [1, 2, 3].into_iter().collect();
        assert_eq!(take_pair(&mut pending), Some((1, 2)));
        assert_eq!(take_pair(&mut pending), None);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn many_partitions_with_growing_pool() {
        let config = SortConfig {
            pool: PoolConfig {
                core_threads: 1,
                max_threads: 6,
                keep_alive: Duration::from_millis(1),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut rng = crate::test::test_rng();
        let input = crate::test::random_partitions(&mut rng, 257, 3, 40, 10_000);
        let expected = crate::test::sorted_values(&input);

        let merged = MergeScheduler::new(config).run(input).unwrap();
        assert_eq!(flatten(merged), expected);
    }

    /// Values whose comparison panics for one poisoned value
    #[derive(Debug, PartialEq, Eq)]
    struct Poisoned(u32);

    impl PartialOrd for Poisoned {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for Poisoned {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            if self.0 == 13 || other.0 == 13 {
                panic!("compared the poisoned value");
            }
            self.0.cmp(&other.0)
        }
    }

    #[test]
    fn job_panic_is_fatal() {
        let input = vec![
            Partition::from(vec![vec![Poisoned(1), Poisoned(20)]]),
            Partition::from(vec![vec![Poisoned(13)]]),
            Partition::from(vec![vec![Poisoned(2), Poisoned(3)]]),
            Partition::from(vec![vec![Poisoned(4), Poisoned(5)]]),
        ];

        let result = MergeScheduler::new(SortConfig::default().with_threads(2)).run(input);
        assert!(matches!(result, Err(SortError::Fatal(message)) if message.contains("poisoned")));
    }

    /// Values whose comparison blocks until the given flag is set
    #[derive(Debug)]
    struct Stalled(u32, &'static AtomicBool);

    impl PartialEq for Stalled {
        fn eq(&self, other: &Self) -> bool {
            self.cmp(other) == std::cmp::Ordering::Equal
        }
    }

    impl Eq for Stalled {}

    impl PartialOrd for Stalled {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for Stalled {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            while !self.1.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            self.0.cmp(&other.0)
        }
    }

    fn stalled_input(release: &'static AtomicBool, count: u32) -> Vec<Partition<Stalled>> {
        (0..count)
            .map(|value| Partition::from(vec![vec![Stalled(value, release)]]))
            .collect()
    }

    #[test]
    fn interrupt_cancels_the_wait() {
        static RELEASE: AtomicBool = AtomicBool::new(false);

        let interrupt = Interrupt::new();
        let scheduler =
            MergeScheduler::new(SortConfig::default()).with_interrupt(interrupt.clone());

        let interrupter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            interrupt.interrupt();
        });

        let result = scheduler.run(stalled_input(&RELEASE, 6));
        assert_eq!(result.unwrap_err(), SortError::Cancelled);

        RELEASE.store(true, Ordering::SeqCst);
        interrupter.join().unwrap();
    }

    #[test]
    fn timeout_is_a_scheduling_failure() {
        static RELEASE: AtomicBool = AtomicBool::new(false);

        let config = SortConfig {
            await_timeout: Some(Duration::from_millis(30)),
            ..Default::default()
        };
        let result = MergeScheduler::new(config).run(stalled_input(&RELEASE, 4));
        assert!(matches!(result, Err(SortError::SchedulingFailure(_))));

        RELEASE.store(true, Ordering::SeqCst);
    }

    #[test]
    fn queue_overflow_is_a_scheduling_failure() {
        static RELEASE: AtomicBool = AtomicBool::new(false);

        let config = SortConfig {
            pool: PoolConfig {
                core_threads: 1,
                max_threads: 1,
                queue_capacity: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };
        // Three initial jobs, at most one running and one queued
        let result = MergeScheduler::new(config).run(stalled_input(&RELEASE, 6));
        assert!(matches!(result, Err(SortError::SchedulingFailure(_))));

        RELEASE.store(true, Ordering::SeqCst);
    }

    #[test]
    fn validation_is_opt_in() {
        let unsorted = partitions(&[&[&[3, 1]], &[&[2]]]);

        let config = SortConfig {
            validate_input: true,
            ..Default::default()
        };
        assert!(matches!(
            MergeScheduler::new(config.clone()).run(unsorted.clone()),
            Err(SortError::InvalidInput(_))
        ));
        // Without validation the input is merged as is
        assert!(MergeScheduler::default().run(unsorted).is_ok());

        // Overlapping sibling blocks are accepted
        let interleaved = partitions(&[&[&[1, 5], &[2, 3]], &[&[7]]]);
        let merged = MergeScheduler::new(config.clone()).run(interleaved).unwrap();
        assert_eq!(merged.iter().map(|p| p.value_count()).sum::<usize>(), 5);

        // So are touching and empty ones
        let touching = partitions(&[&[&[1], &[], &[1, 3], &[3, 4]], &[&[2]]]);
        let merged = MergeScheduler::new(config).run(touching).unwrap();
        assert_eq!(flatten(merged), [1, 1, 2, 3, 3, 4]);
    }

    fn idle_progress() -> Arc<Progress<u32>> {
        Arc::new(Progress {
            state: Mutex::new(SchedulerState {
                pending: VecDeque::new(),
                total_values: 0,
                in_flight: 0,
                finished: false,
                outcome: None,
            }),
            changed: Condvar::new(),
        })
    }

    #[test]
    fn interrupt_forgets_finished_runs() {
        let interrupt = Interrupt::new();

        for _ in 0..10 {
            let progress = idle_progress();
            interrupt.register(Arc::<Progress<u32>>::downgrade(&progress));
        }
        let alive = idle_progress();
        interrupt.register(Arc::<Progress<u32>>::downgrade(&alive));

        assert_eq!(interrupt.inner.waiters.lock().len(), 1);
        assert!(!interrupt.is_interrupted());
    }

    #[test]
    fn invalid_config_is_rejected_before_work() {
        let config = SortConfig::default().with_threads(0);
        assert!(matches!(
            MergeScheduler::new(config).run(partitions(&[&[&[1]], &[&[2]]])),
            Err(SortError::InvalidConfig(_))
        ));
    }
}
