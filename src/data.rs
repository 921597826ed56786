use rand::{Rng as _, distr::Distribution as _, rngs::StdRng, seq::SliceRandom as _};

use partition_mergesort::{Block, Partition};

/// The requested dimensions of generated input
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub partitions: usize,
    pub blocks: usize,
    pub block_size: usize,
}

impl Shape {
    /// The number of values a partition holds on average
    fn partition_len(&self) -> usize {
        self.blocks * self.block_size
    }

    /// Check that all generated values can be told apart as `u32`
    pub fn validate(&self) -> anyhow::Result<()> {
        let total = self
            .blocks
            .checked_mul(self.block_size)
            .and_then(|len| len.checked_mul(self.partitions))
            .and_then(|total| u32::try_from(total).ok());

        anyhow::ensure!(
            total.is_some(),
            "{partitions} partitions of {blocks} blocks with {block_size} values exceed the u32 range",
            partitions = self.partitions,
            blocks = self.blocks,
            block_size = self.block_size,
        );

        Ok(())
    }
}

/// A trait for generalizing partition creation
pub trait PartitionData {
    /// Generate partitions of the given shape, every one of them internally sorted
    fn initialize(shape: Shape, rng: &mut StdRng) -> Vec<Partition<u32>>;
}

/// Uniformly distributed values
#[derive(Debug)]
pub struct UniformData;

/// Narrow runs at random offsets, partitions overlap only with a few others
#[derive(Debug)]
pub struct RunsData;

/// A sorted sequence split into partitions, then shuffled
#[derive(Debug)]
pub struct DisjointData;

/// Uniform values in blocks of geometrically distributed length
#[derive(Debug)]
pub struct SkewedData;

/// Split sorted `values` into blocks of `block_size` values each
fn into_partition(values: Vec<u32>, block_size: usize) -> Partition<u32> {
    Partition::new(
        values
            .chunks(block_size.max(1))
            .map(|chunk| Block::new(chunk.to_vec()))
            .collect(),
    )
}

impl PartitionData for UniformData {
    fn initialize(shape: Shape, rng: &mut StdRng) -> Vec<Partition<u32>> {
        (0..shape.partitions)
            .map(|_| {
                let mut values: Vec<u32> = (0..shape.partition_len())
                    .map(|_| rng.random())
                    .collect();
                values.sort_unstable();
                into_partition(values, shape.block_size)
            })
            .collect()
    }
}

impl PartitionData for RunsData {
    fn initialize(shape: Shape, rng: &mut StdRng) -> Vec<Partition<u32>> {
        let span = (shape.partitions * shape.partition_len()).clamp(1, u32::MAX as usize / 2);

        (0..shape.partitions)
            .map(|_| {
                let mut value = rng.random_range(0..span as u32);
                let values = (0..shape.partition_len())
                    .map(|_| {
                        value = value.saturating_add(rng.random_range(0..3));
                        value
                    })
                    .collect();
                into_partition(values, shape.block_size)
            })
            .collect()
    }
}

impl PartitionData for DisjointData {
    fn initialize(shape: Shape, rng: &mut StdRng) -> Vec<Partition<u32>> {
        // Values stop at `u32::MAX` for shapes rejected by `Shape::validate`
        let len = u32::try_from(shape.partition_len()).unwrap_or(u32::MAX);
        let mut partitions: Vec<Partition<u32>> = (0..shape.partitions)
            .map(|index| {
                let start = u32::try_from(index)
                    .unwrap_or(u32::MAX)
                    .saturating_mul(len);
                into_partition(
                    (start..start.saturating_add(len)).collect(),
                    shape.block_size,
                )
            })
            .collect();

        partitions.shuffle(rng);
        partitions
    }
}

impl PartitionData for SkewedData {
    fn initialize(shape: Shape, rng: &mut StdRng) -> Vec<Partition<u32>> {
        // Block lengths with mean `block_size`, including empty blocks
        let probability = 1.0 / (shape.block_size as f64 + 1.0);
        let Ok(lengths) = rand_distr::Geometric::new(probability) else {
            return UniformData::initialize(shape, rng);
        };

        (0..shape.partitions)
            .map(|_| {
                let block_lengths: Vec<usize> = (0..shape.blocks)
                    .map(|_| lengths.sample(rng) as usize)
                    .collect();

                let mut values: Vec<u32> = (0..block_lengths.iter().sum::<usize>())
                    .map(|_| rng.random())
                    .collect();
                values.sort_unstable();

                let mut values = values.into_iter();
                Partition::new(
                    block_lengths
                        .into_iter()
                        .map(|len| Block::new(values.by_ref().take(len).collect()))
                        .collect(),
                )
            })
            .collect()
    }
}
