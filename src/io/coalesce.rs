//! Merges nearby byte ranges to reduce the number of parts in a request.

use super::range::RangeKey;

/// A merged byte range and the requested ranges it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescedRange {
    pub range: RangeKey,
    /// Indices into the original request list
    pub members: Vec<usize>,
}

/// Coalesce ranges separated by at most `max_gap` bytes.
///
/// Overlapping and duplicate ranges always merge. The output is sorted by
/// start offset; `members` lets callers map results back to request order.
pub fn coalesce_ranges(ranges: &[RangeKey], max_gap: u64) -> Vec<CoalescedRange> {
    let mut order: Vec<usize> = (0..ranges.len()).collect();
    order.sort_by_key(|&i| (ranges[i].start, ranges[i].end));

    let mut coalesced: Vec<CoalescedRange> = Vec::new();
    for index in order {
        let range = ranges[index];
        match coalesced.last_mut() {
            Some(current) if range.start <= current.range.end.saturating_add(max_gap) => {
                current.range.end = current.range.end.max(range.end);
                current.members.push(index);
            }
            _ => coalesced.push(CoalescedRange {
                range,
                members: vec![index],
            }),
        }
    }
    coalesced
}
