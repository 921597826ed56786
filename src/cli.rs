//! Command line input handling

use partition_mergesort::{ChunkSizing, PoolConfig, SortConfig, config};

/// Command line arguments
#[derive(Debug, clap::Parser)]
#[command(author, version, about)]
pub struct Args {
    /// The number of random runs to do
    #[arg(short, long, default_value_t = 100)]
    pub runs: usize,
    /// The number of partitions per run
    #[arg(short, long, default_value_t = 1_000)]
    pub partitions: usize,
    /// The number of blocks per partition
    #[arg(short, long, default_value_t = 4)]
    pub blocks: usize,
    /// The (mean) number of values per block
    #[arg(long, default_value_t = 250)]
    pub block_size: usize,
    /// The data type to generate partitions with
    #[arg(short, long, default_value_t = DataType::Uniform)]
    pub data: DataType,
    /// Workers kept alive for the whole run
    #[arg(short, long, default_value_t = config::DEFAULT_CORE_THREADS)]
    pub threads: usize,
    /// Upper bound of workers, defaults to `threads`
    #[arg(long)]
    pub max_threads: Option<usize>,
    /// Idle time in milliseconds after which extra workers exit
    #[arg(long, default_value_t = config::DEFAULT_KEEP_ALIVE.as_millis() as u64)]
    pub keep_alive_ms: u64,
    /// How merged runs are split back into containers
    #[arg(long, default_value_t = Sizing::Balanced)]
    pub sizing: Sizing,
    /// Check that every partition is sorted before merging
    #[arg(long)]
    pub validate: bool,
    /// Give up on a single run after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// Seed for the rng
    #[arg(long)]
    pub seed: Option<u64>,
    /// Do not run the built-in corner cases before the random runs
    #[arg(long)]
    pub skip_corner_cases: bool,
}

impl Args {
    /// The sorting configuration described by the arguments
    pub fn sort_config(&self) -> SortConfig {
        SortConfig {
            pool: PoolConfig {
                core_threads: self.threads,
                max_threads: self.max_threads.unwrap_or(self.threads),
                keep_alive: std::time::Duration::from_millis(self.keep_alive_ms),
                ..Default::default()
            },
            sizing: self.sizing.into(),
            validate_input: self.validate,
            await_timeout: self.timeout_ms.map(std::time::Duration::from_millis),
        }
    }
}

/// Available data types for generating partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DataType {
    /// Uniformly distributed values, every partition spanning the whole range
    Uniform,
    /// Partitions covering narrow, randomly placed windows
    Runs,
    /// Disjoint partitions in shuffled order
    Disjoint,
    /// Uniform values in blocks of geometrically distributed size
    Skewed,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DataType::Uniform => "uniform",
            DataType::Runs => "runs",
            DataType::Disjoint => "disjoint",
            DataType::Skewed => "skewed",
        })
    }
}

/// Command line version of [`ChunkSizing`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Sizing {
    /// Split merged runs into groups of equal size
    Balanced,
    /// Put (nearly) everything into the last group
    Legacy,
}

impl std::fmt::Display for Sizing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Sizing::Balanced => "balanced",
            Sizing::Legacy => "legacy",
        })
    }
}

impl From<Sizing> for ChunkSizing {
    fn from(sizing: Sizing) -> Self {
        match sizing {
            Sizing::Balanced => ChunkSizing::Balanced,
            Sizing::Legacy => ChunkSizing::Legacy,
        }
    }
}
