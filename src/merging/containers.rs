//! Merging sorted lists of containers.
//!
//! The merge walks both lists with the [`Container::range_cmp`] of their heads. As long as the
//! heads are disjoint, the earlier one is moved to the output as a whole. Once the heads
//! overlap, both are staged and the largest bound seen so far becomes the frontier: every
//! following container starting below the frontier (on either side) joins the staged run.
//! When neither side adds anything, the staged runs are merged one level down and re-chunked
//! into as many containers as were staged.

use std::iter::Peekable;

use super::chunking::{self, ChunkSizing};
use crate::container::{Container, RangeOrdering};

const LEFT: usize = 0;
const RIGHT: usize = 1;

/// Merge two sorted lists of containers into one sorted list
pub fn merge<C: Container>(left: Vec<C>, right: Vec<C>, sizing: ChunkSizing) -> Vec<C> {
    ContainerMerge::new(left, right, sizing).run()
}

/// Merge two runs of mutually overlapping containers one level down.
///
/// The result holds `left.len() + right.len()` containers.
pub fn merge_intersecting<C: Container>(
    left: Vec<C>,
    right: Vec<C>,
    sizing: ChunkSizing,
) -> Vec<C> {
    let count = left.len() + right.len();

    #[cfg(feature = "counters")]
    super::DECOMPOSED_COUNTER.increase(count as u64);

    tracing::trace!(
        left = left.len(),
        right = right.len(),
        "merging overlapping containers"
    );

    let flatten = |containers: Vec<C>| -> Vec<C::Child> {
        containers.into_iter().flat_map(C::into_children).collect()
    };
    let merged = C::merge_children(flatten(left), flatten(right), sizing);

    chunking::rechunk(merged, count, sizing)
        .into_iter()
        .map(C::from_children)
        .collect()
}

/// Position of the staged container whose last value is the current frontier
#[derive(Debug, Clone, Copy)]
struct Frontier {
    side: usize,
    index: usize,
}

/// What the scan found at the front of the inputs
enum Heads {
    /// Only this side has containers left
    Only(usize),
    /// Both sides have a head, ordered by range
    Both(RangeOrdering),
}

/// State of a single container merge
struct ContainerMerge<C> {
    inputs: [Peekable<std::vec::IntoIter<C>>; 2],
    staged: [Vec<C>; 2],
    frontier: Option<Frontier>,
    output: Vec<C>,
    sizing: ChunkSizing,
}

impl<C: Container> ContainerMerge<C> {
    fn new(left: Vec<C>, right: Vec<C>, sizing: ChunkSizing) -> Self {
        ContainerMerge {
            output: Vec::with_capacity(left.len() + right.len()),
            inputs: [left.into_iter().peekable(), right.into_iter().peekable()],
            staged: [Vec::new(), Vec::new()],
            frontier: None,
            sizing,
        }
    }

    fn run(mut self) -> Vec<C> {
        loop {
            if self.frontier.is_some() {
                if !self.extend_staged() {
                    self.flush();
                }
            } else if !self.scan() {
                break;
            }
        }

        // Staged empty containers never set a frontier
        if self.staged.iter().any(|staged| !staged.is_empty()) {
            self.flush();
        }

        self.output
    }

    /// Handle the heads while no overlap is pending. Returns `false` once both sides are done.
    fn scan(&mut self) -> bool {
        let heads = {
            let [left, right] = &mut self.inputs;
            match (left.peek(), right.peek()) {
                (None, None) => return false,
                (Some(_), None) => Heads::Only(LEFT),
                (None, Some(_)) => Heads::Only(RIGHT),
                (Some(left), Some(right)) => Heads::Both(left.range_cmp(right)),
            }
        };

        match heads {
            Heads::Only(side) => self.drain(side),
            Heads::Both(RangeOrdering::Less) => self.emit(LEFT),
            Heads::Both(RangeOrdering::Greater) => self.emit(RIGHT),
            Heads::Both(RangeOrdering::Overlap) => {
                for side in [LEFT, RIGHT] {
                    if let Some(container) = self.inputs[side].next() {
                        stage(&mut self.staged, &mut self.frontier, side, container);
                    }
                }
            }
        }

        true
    }

    /// Stage every container starting below the frontier. Returns whether anything was staged.
    fn extend_staged(&mut self) -> bool {
        let Self {
            inputs,
            staged,
            frontier,
            ..
        } = self;

        let mut extended = false;
        for side in [LEFT, RIGHT] {
            loop {
                let bound = match *frontier {
                    Some(current) => frontier_bound(staged, current),
                    None => None,
                };
                let Some(container) =
                    inputs[side].next_if(|next| starts_below(next.first(), bound))
                else {
                    break;
                };

                stage(staged, frontier, side, container);
                extended = true;
            }
        }

        extended
    }

    /// Merge the staged runs into the output and go back to scanning
    fn flush(&mut self) {
        let left = std::mem::take(&mut self.staged[LEFT]);
        let right = std::mem::take(&mut self.staged[RIGHT]);
        self.frontier = None;

        self.output.extend(merge_intersecting(left, right, self.sizing));
    }

    fn emit(&mut self, side: usize) {
        if let Some(container) = self.inputs[side].next() {
            #[cfg(feature = "counters")]
            super::EMITTED_COUNTER.increase(1);

            self.output.push(container);
        }
    }

    fn drain(&mut self, side: usize) {
        #[cfg(feature = "counters")]
        super::EMITTED_COUNTER.increase(self.inputs[side].len() as u64);

        self.output.extend(self.inputs[side].by_ref());
    }
}

/// The last value of the staged container the frontier points at
fn frontier_bound<C: Container>(staged: &[Vec<C>; 2], frontier: Frontier) -> Option<&C::Value> {
    staged[frontier.side].get(frontier.index).and_then(C::last)
}

/// Whether a container with the given first value belongs to the staged run.
/// Empty containers are always taken along.
fn starts_below<T: Ord>(first: Option<&T>, bound: Option<&T>) -> bool {
    match (first, bound) {
        (None, _) => true,
        (Some(first), Some(bound)) => first < bound,
        (Some(_), None) => false,
    }
}

/// Push `container` to the staged run of `side`, raising the frontier if its last value is
/// larger than the current one
fn stage<C: Container>(
    staged: &mut [Vec<C>; 2],
    frontier: &mut Option<Frontier>,
    side: usize,
    container: C,
) {
    let raises = match (container.last(), *frontier) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(last), Some(current)) => {
            frontier_bound(staged, current).is_none_or(|bound| last > bound)
        }
    };

    if raises {
        *frontier = Some(Frontier {
            side,
            index: staged[side].len(),
        });
    }

    staged[side].push(container);
}
