//! The container hierarchy: values are grouped into [`Block`]s, blocks into [`Partition`]s.
//!
//! Both container kinds implement [`Container`], which gives them a cheap range comparison
//! and the flatten/rebuild operations the merge engine needs to descend one level.

use crate::merging::{self, chunking::ChunkSizing};

/// Result of comparing two containers only by their bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOrdering {
    /// Every value of the left container sorts before every value of the right one
    Less,
    /// Every value of the left container sorts after every value of the right one
    Greater,
    /// The ranges interleave, the contents have to be inspected
    Overlap,
}

/// A sorted container of values, which is built from a list of children
pub trait Container: Sized {
    /// The element type everything is ordered by
    type Value: Ord;
    /// What the container holds one level down
    type Child;

    /// The smallest value, `None` if the container holds no values
    fn first(&self) -> Option<&Self::Value>;

    /// The largest value, `None` if the container holds no values
    fn last(&self) -> Option<&Self::Value>;

    /// The total number of values in this container
    fn value_count(&self) -> usize;

    /// Consume the container, returning its children
    fn into_children(self) -> Vec<Self::Child>;

    /// Build a container from children
    fn from_children(children: Vec<Self::Child>) -> Self;

    /// Merge two sorted lists of children into one sorted list
    fn merge_children(
        left: Vec<Self::Child>,
        right: Vec<Self::Child>,
        sizing: ChunkSizing,
    ) -> Vec<Self::Child>;

    /// Compare two containers by their bounds only.
    ///
    /// An empty container is `Less` than any non-empty one, two empty containers `Overlap`.
    fn range_cmp(&self, other: &Self) -> RangeOrdering {
        match (self.first(), other.first()) {
            (None, None) => RangeOrdering::Overlap,
            (None, Some(_)) => RangeOrdering::Less,
            (Some(_), None) => RangeOrdering::Greater,
            (Some(first), Some(other_first)) => {
                // A defined first implies a defined last
                let (Some(last), Some(other_last)) = (self.last(), other.last()) else {
                    return RangeOrdering::Overlap;
                };

                if first >= other_last {
                    RangeOrdering::Greater
                } else if last <= other_first {
                    RangeOrdering::Less
                } else {
                    RangeOrdering::Overlap
                }
            }
        }
    }
}

/// A run of values, expected (but not checked) to be non-decreasing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block<T> {
    values: Vec<T>,
}

impl<T> Block<T> {
    pub fn new(values: Vec<T>) -> Self {
        Block { values }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T: Ord> Block<T> {
    /// Whether the values are in non-decreasing order
    pub fn is_sorted(&self) -> bool {
        self.values.is_sorted()
    }
}

impl<T> From<Vec<T>> for Block<T> {
    fn from(values: Vec<T>) -> Self {
        Block::new(values)
    }
}

impl<T: Ord> Container for Block<T> {
    type Value = T;
    type Child = T;

    fn first(&self) -> Option<&T> {
        self.values.first()
    }

    fn last(&self) -> Option<&T> {
        self.values.last()
    }

    fn value_count(&self) -> usize {
        self.values.len()
    }

    fn into_children(self) -> Vec<T> {
        self.values
    }

    fn from_children(children: Vec<T>) -> Self {
        Block::new(children)
    }

    fn merge_children(left: Vec<T>, right: Vec<T>, _sizing: ChunkSizing) -> Vec<T> {
        merging::values::merge(left, right)
    }
}

/// A sequence of blocks. Sibling blocks may overlap each other.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition<T> {
    blocks: Vec<Block<T>>,
}

impl<T> Partition<T> {
    pub fn new(blocks: Vec<Block<T>>) -> Self {
        Partition { blocks }
    }

    pub fn blocks(&self) -> &[Block<T>] {
        &self.blocks
    }

    /// Concatenate the values of all blocks
    pub fn into_values(self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.blocks.iter().map(Block::len).sum());
        for block in self.blocks {
            values.extend(block.into_values());
        }
        values
    }
}

impl<T> From<Vec<Block<T>>> for Partition<T> {
    fn from(blocks: Vec<Block<T>>) -> Self {
        Partition::new(blocks)
    }
}

impl<T> From<Vec<Vec<T>>> for Partition<T> {
    fn from(blocks: Vec<Vec<T>>) -> Self {
        Partition::new(blocks.into_iter().map(Block::new).collect())
    }
}

impl<T: Ord> Container for Partition<T> {
    type Value = T;
    type Child = Block<T>;

    fn first(&self) -> Option<&T> {
        self.blocks.iter().find_map(Block::first)
    }

    fn last(&self) -> Option<&T> {
        self.blocks.iter().rev().find_map(Block::last)
    }

    fn value_count(&self) -> usize {
        self.blocks.iter().map(Block::len).sum()
    }

    fn into_children(self) -> Vec<Block<T>> {
        self.blocks
    }

    fn from_children(children: Vec<Block<T>>) -> Self {
        Partition::new(children)
    }

    fn merge_children(
        left: Vec<Block<T>>,
        right: Vec<Block<T>>,
        sizing: ChunkSizing,
    ) -> Vec<Block<T>> {
        merging::containers::merge(left, right, sizing)
    }
}
