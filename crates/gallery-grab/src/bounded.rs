//! Bound the candidate list to the requested count.

use crate::types::CandidateImage;

/// Keep the first `count` candidates, preserving order.
///
/// `count` comes from a validated [`SearchRequest`](crate::SearchRequest),
/// so it is always positive by the time it reaches here.
pub fn bound(mut candidates: Vec<CandidateImage>, count: usize) -> Vec<CandidateImage> {
    candidates.truncate(count);
    candidates
}
