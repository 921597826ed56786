//! Merging at the value level

/// Merge two sorted lists of values into a new sorted list.
///
/// Equal values are all kept, with the value from `left` placed first.
pub fn merge<T: Ord>(left: Vec<T>, right: Vec<T>) -> Vec<T> {
    #[cfg(feature = "counters")]
    super::MERGED_VALUES_COUNTER.increase((left.len() + right.len()) as u64);

    let mut output = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    // Repeatedly move the smaller head into the output
    loop {
        let ordering = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.cmp(r),
            _ => break,
        };

        match ordering {
            std::cmp::Ordering::Less => output.extend(left.next()),
            std::cmp::Ordering::Greater => output.extend(right.next()),
            std::cmp::Ordering::Equal => {
                output.extend(left.next());
                output.extend(right.next());
            }
        }
    }

    // At most one of them has elements left
    output.extend(left);
    output.extend(right);

    output
}
