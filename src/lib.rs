//! Sorting pre-chunked data by concurrent pairwise merges.
//!
//! Input is a list of [`Partition`]s, each a sequence of [`Block`]s of values. Every partition
//! yields its values in non-decreasing order, the partitions relative to each other are
//! arbitrary. [`sort_partitions`] merges pairs of partitions lists on a worker pool until a
//! single sorted list remains, comparing only container bounds wherever two containers do not
//! overlap.
//!
//! ```
//! use partition_mergesort::{Partition, sort_partitions};
//!
//! let partitions = vec![
//!     Partition::from(vec![vec![5], vec![6]]),
//!     Partition::from(vec![vec![3], vec![4]]),
//!     Partition::from(vec![vec![1], vec![2]]),
//! ];
//! assert_eq!(sort_partitions(partitions).unwrap(), [1, 2, 3, 4, 5, 6]);
//! ```

pub mod config;
pub mod container;
pub mod corner_cases;
pub mod error;
pub mod merging;
pub mod scheduler;


pub use config::{PoolConfig, SortConfig};
pub use container::{Block, Container, Partition, RangeOrdering};
pub use error::{Result, SortError};
pub use merging::chunking::ChunkSizing;
pub use scheduler::{Interrupt, MergeScheduler};

/// Sort all values of `partitions` with the default configuration
pub fn sort_partitions<T: Ord + Send + 'static>(partitions: Vec<Partition<T>>) -> Result<Vec<T>> {
    sort_partitions_with(partitions, &SortConfig::default())
}

/// Sort all values of `partitions` as configured by `config`
pub fn sort_partitions_with<T: Ord + Send + 'static>(
    partitions: Vec<Partition<T>>,
    config: &SortConfig,
) -> Result<Vec<T>> {
    let merged = MergeScheduler::new(config.clone()).run(partitions)?;

    let mut values = Vec::with_capacity(merged.iter().map(Container::value_count).sum());
    for partition in merged {
        values.extend(partition.into_values());
    }

    Ok(values)
}
