//! Hunk extension detection
//!
//! Hunk ids are positional, so almost every edit near existing changes
//! produces hunks with ids never seen before. A matcher decides whether such
//! a hunk continues one from the previous refresh, in which case it keeps
//! that hunk's changelist.
//!
//! This is a heuristic. Two unrelated edits close together in the same
//! refresh window can be attributed to the same previous hunk.

use super::Hunk;

/// Default line distance for boundary proximity
pub const DEFAULT_PROXIMITY_THRESHOLD: u32 = 3;

/// Decides whether a new hunk continues one of the previous hunks
pub trait ContinuationMatcher: Send + Sync {
    /// Return the previous hunk that `new` continues, if any
    fn match_continuation<'a>(&self, new: &Hunk, candidates: &'a [Hunk]) -> Option<&'a Hunk>;
}

/// Overlap and boundary-proximity matching.
///
/// A new hunk continues a previous one when their old ranges overlap, their
/// new ranges overlap, or any corresponding boundary lies within `threshold`
/// lines. Candidates are scanned in order and the first match wins.
#[derive(Debug, Clone, Copy)]
pub struct ProximityMatcher {
    threshold: u32,
}

impl ProximityMatcher {
    /// Create a matcher with the given proximity threshold
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    /// The proximity threshold in lines
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    fn is_continuation(&self, new: &Hunk, prev: &Hunk) -> bool {
        if ranges_overlap(new.old_start, new.old_end(), prev.old_start, prev.old_end()) {
            return true;
        }
        if ranges_overlap(new.new_start, new.new_end(), prev.new_start, prev.new_end()) {
            return true;
        }

        let near = |a: u32, b: u32| a.abs_diff(b) <= self.threshold;
        near(new.old_start, prev.old_start)
            || near(new.old_end(), prev.old_end())
            || near(new.new_start, prev.new_start)
            || near(new.new_end(), prev.new_end())
    }
}

impl Default for ProximityMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PROXIMITY_THRESHOLD)
    }
}

impl ContinuationMatcher for ProximityMatcher {
    fn match_continuation<'a>(&self, new: &Hunk, candidates: &'a [Hunk]) -> Option<&'a Hunk> {
        candidates
            .iter()
            .filter(|prev| prev.file_path == new.file_path)
            .find(|prev| self.is_continuation(new, prev))
    }
}

/// Closed-range overlap of `[a_start, a_end]` and `[b_start, b_end]`
fn ranges_overlap(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start <= b_end && b_start <= a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hunk(old_start: u32, old_lines: u32, new_start: u32, new_lines: u32) -> Hunk {
        Hunk::new("a.txt", old_start, old_lines, new_start, new_lines, String::new(), false)
    }

    #[test]
    fn test_shifted_hunk_matches() {
        let matcher = ProximityMatcher::default();
        let prev = vec![hunk(5, 3, 5, 4)];

        let shifted = hunk(6, 3, 6, 4);
        assert_eq!(matcher.match_continuation(&shifted, &prev), Some(&prev[0]));
    }

    #[test]
    fn test_new_range_overlap_alone_matches() {
        let matcher = ProximityMatcher::new(0);
        let prev = vec![hunk(40, 2, 10, 5)];

        // old ranges are far apart, new ranges share line 15
        let grown = hunk(80, 2, 15, 6);
        assert_eq!(matcher.match_continuation(&grown, &prev), Some(&prev[0]));
    }

    #[test]
    fn test_proximity_boundary() {
        let matcher = ProximityMatcher::default();
        let prev = vec![hunk(10, 0, 10, 0)];

        assert!(matcher.match_continuation(&hunk(13, 0, 13, 0), &prev).is_some());
        assert!(matcher.match_continuation(&hunk(14, 0, 14, 0), &prev).is_none());
    }

    #[test]
    fn test_distant_hunk_is_new() {
        let matcher = ProximityMatcher::default();
        let prev = vec![hunk(5, 3, 5, 4)];
        assert!(matcher.match_continuation(&hunk(20, 2, 21, 3), &prev).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let matcher = ProximityMatcher::default();
        let mut first = hunk(10, 2, 10, 2);
        first.changelist_id = Some("first".to_string());
        let mut second = hunk(12, 2, 12, 2);
        second.changelist_id = Some("second".to_string());
        let prev = vec![first, second];

        let matched = matcher.match_continuation(&hunk(11, 2, 11, 2), &prev).unwrap();
        assert_eq!(matched.changelist_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_other_files_are_ignored() {
        let matcher = ProximityMatcher::default();
        let mut other = hunk(5, 3, 5, 4);
        other.file_path = "b.txt".to_string();
        assert!(matcher.match_continuation(&hunk(5, 3, 5, 4), &[other]).is_none());
    }

    #[test]
    fn test_close_unrelated_edit_is_attributed() {
        // Known false positive: an independent edit two lines below an
        // existing hunk is treated as its continuation.
        let matcher = ProximityMatcher::default();
        let prev = vec![hunk(5, 3, 5, 3)];
        assert!(matcher.match_continuation(&hunk(10, 1, 10, 2), &prev).is_some());
    }
}
