//! Configuration for the worker pool and the sorting run

use std::time::Duration;

use crate::error::{Result, SortError};
use crate::merging::chunking::ChunkSizing;

/// The default number of always alive workers
pub const DEFAULT_CORE_THREADS: usize = 2;
/// The default upper bound of workers
pub const DEFAULT_MAX_THREADS: usize = 2;
/// The default idle time after which workers above the core count exit
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_millis(5000);

/// Worker pool sizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Workers that are kept alive while the pool is running
    pub core_threads: usize,
    /// Upper bound of concurrently alive workers
    pub max_threads: usize,
    /// How long a worker above `core_threads` may stay idle before exiting
    pub keep_alive: Duration,
    /// Maximum number of queued jobs, `None` for an unbounded queue
    pub queue_capacity: Option<usize>,
    /// Whether all core workers are spawned when the pool is built
    pub prestart_core_threads: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            core_threads: DEFAULT_CORE_THREADS,
            max_threads: DEFAULT_MAX_THREADS,
            keep_alive: DEFAULT_KEEP_ALIVE,
            queue_capacity: None,
            prestart_core_threads: true,
        }
    }
}

impl PoolConfig {
    /// A pool with exactly `threads` workers
    pub fn fixed(threads: usize) -> Self {
        PoolConfig {
            core_threads: threads,
            max_threads: threads,
            ..Default::default()
        }
    }

    /// Check that a pool can be built from this configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_threads == 0 {
            return Err(SortError::InvalidConfig(
                "max_threads must be at least 1".to_string(),
            ));
        }
        if self.max_threads < self.core_threads {
            return Err(SortError::InvalidConfig(format!(
                "max_threads ({}) is smaller than core_threads ({})",
                self.max_threads, self.core_threads
            )));
        }
        if self.queue_capacity == Some(0) {
            return Err(SortError::InvalidConfig(
                "queue_capacity must be positive when bounded".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration of a complete sorting run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortConfig {
    /// The worker pool running the merge jobs
    pub pool: PoolConfig,
    /// How merged runs are split back into containers
    pub sizing: ChunkSizing,
    /// Reject blocks that are not non-decreasing before scheduling anything
    pub validate_input: bool,
    /// Give up waiting for the merge after this long
    pub await_timeout: Option<Duration>,
}

impl SortConfig {
    /// Use a fixed size pool with `threads` workers
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.pool = PoolConfig {
            core_threads: threads,
            max_threads: threads,
            ..self.pool
        };
        self
    }

    pub fn with_sizing(mut self, sizing: ChunkSizing) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate()
    }
}
