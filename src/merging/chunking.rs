//! Splitting a merged run back into a fixed number of containers

/// How the size of the groups is derived when re-chunking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChunkSizing {
    /// Every group gets `len / count` elements, the remainder is spread over the leading groups
    #[default]
    Balanced,
    /// Groups get `count / len` elements and the last group takes the rest.
    ///
    /// This degenerates into empty leading groups and one oversized trailing group whenever
    /// there are more elements than groups. Only useful to reproduce old container layouts.
    Legacy,
}

impl ChunkSizing {
    /// The sizes of `count` contiguous groups covering `len` elements
    pub fn group_sizes(self, len: usize, count: usize) -> Vec<usize> {
        if count == 0 {
            return Vec::new();
        }

        match self {
            ChunkSizing::Balanced => {
                let (base, remainder) = (len / count, len % count);
                (0..count)
                    .map(|index| base + usize::from(index < remainder))
                    .collect()
            }
            ChunkSizing::Legacy => {
                let each = if len > 0 { count / len } else { 0 };
                let mut remaining = len;
                let mut sizes: Vec<usize> = (0..count - 1)
                    .map(|_| {
                        let size = std::cmp::min(each, remaining);
                        remaining -= size;
                        size
                    })
                    .collect();
                sizes.push(remaining);
                sizes
            }
        }
    }
}

/// Split `elements` into `count` contiguous groups without reordering them.
///
/// If `count` is zero, no group can hold the elements, so they are returned as a single group
/// unless there are none.
pub fn rechunk<E>(elements: Vec<E>, count: usize, sizing: ChunkSizing) -> Vec<Vec<E>> {
    if count == 0 {
        return if elements.is_empty() {
            Vec::new()
        } else {
            vec![elements]
        };
    }

    let sizes = sizing.group_sizes(elements.len(), count);
    debug_assert_eq!(sizes.iter().sum::<usize>(), elements.len());

    let mut elements = elements.into_iter();
    sizes
        .into_iter()
        .map(|size| elements.by_ref().take(size).collect())
        .collect()
}
