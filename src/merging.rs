//! The merge engine: merging two sorted lists of values, blocks or partitions.
//!
//! [`values`] is the plain two-pointer merge at the bottom of the hierarchy. [`containers`]
//! merges lists of containers, emitting provably disjoint containers untouched and only
//! descending into runs of overlapping ones. [`chunking`] splits merged runs back into
//! containers.

pub mod chunking;
pub mod containers;
pub mod values;

/// A global counter which can be increased from any thread
#[derive(Debug)]
pub struct GlobalCounter(std::sync::atomic::AtomicU64);

impl GlobalCounter {
    pub const fn new() -> Self {
        GlobalCounter(std::sync::atomic::AtomicU64::new(0))
    }

    pub fn increase(&self, amount: u64) {
        self.0.fetch_add(amount, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn read(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Reset the counter, returning the previous value
    pub fn take(&self) -> u64 {
        self.0.swap(0, std::sync::atomic::Ordering::Relaxed)
    }
}

impl Default for GlobalCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Containers emitted without looking at their contents
#[allow(dead_code)]
pub static EMITTED_COUNTER: GlobalCounter = GlobalCounter::new();
/// Containers that overlapped and had to be decomposed
#[allow(dead_code)]
pub static DECOMPOSED_COUNTER: GlobalCounter = GlobalCounter::new();
/// Values passing through the value level merge
#[allow(dead_code)]
pub static MERGED_VALUES_COUNTER: GlobalCounter = GlobalCounter::new();
