//! Errors returned by the sorting entry points

/// Everything that can go wrong while sorting partitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SortError {
    /// The input violated an expectation that was asked to be checked
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The configuration can not be used to build a worker pool
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The waiting caller was interrupted before the merge converged
    #[error("sorting was interrupted before completion")]
    Cancelled,

    /// A merge job failed, all remaining work was discarded
    #[error("merge job failed: {0}")]
    Fatal(String),

    /// The worker pool could not accept or run work
    #[error("scheduling failure: {0}")]
    SchedulingFailure(String),
}

pub type Result<T, E = SortError> = std::result::Result<T, E>;

macro_rules! scheduling_failure {
    ($($arg:tt)*) => {
        crate::error::SortError::SchedulingFailure(std::format!($($arg)*))
    };
}
pub(crate) use scheduling_failure;
