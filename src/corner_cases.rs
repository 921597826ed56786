//! Hand picked inputs covering the edge cases of the merge

use crate::container::Partition;

/// Partitions given as nested slices: partitions of blocks of values
pub type RawPartitions = &'static [&'static [&'static [u32]]];

/// The corner cases, from degenerate inputs to reversed disjoint partitions
pub const CORNER_CASES: &[RawPartitions] = &[
    &[],
    &[&[]],
    &[&[&[]]],
    &[&[&[], &[]]],
    &[&[&[1]]],
    &[&[&[1, 2, 3], &[4, 5, 6]]],
    &[&[&[1], &[2]], &[&[3], &[3]]],
    &[&[&[2, 3]], &[&[1, 4]]],
    &[&[&[1], &[2, 3], &[3, 4]], &[&[1], &[2, 3], &[3, 4]]],
    &[&[&[1], &[2, 3]], &[&[3, 4]], &[&[1], &[2, 3]]],
    &[&[&[5], &[6]], &[&[3], &[4]], &[&[1], &[2]]],
    &[&[&[5], &[6]], &[&[3], &[4]], &[&[1], &[2]], &[&[7], &[8]]],
    &[
        &[&[5], &[6]],
        &[&[3], &[4]],
        &[&[1], &[2]],
        &[&[7], &[8]],
        &[&[9], &[10]],
    ],
];

/// Build owned partitions from their nested slice form
pub fn to_partitions(raw: RawPartitions) -> Vec<Partition<u32>> {
    raw.iter()
        .map(|blocks| {
            Partition::from(
                blocks
                    .iter()
                    .map(|values| values.to_vec())
                    .collect::<Vec<_>>(),
            )
        })
        .collect()
}

/// The total number of values in `raw`
pub fn value_count(raw: RawPartitions) -> usize {
    raw.iter().flat_map(|blocks| blocks.iter()).map(|values| values.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_keeps_structure() {
        let partitions = to_partitions(CORNER_CASES[9]);
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions[0].blocks().len(), 2);
        assert_eq!(value_count(CORNER_CASES[9]), 8);
        assert!(to_partitions(CORNER_CASES[0]).is_empty());
    }
}
