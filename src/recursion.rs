//! Priority formula and the shared "should this neighbor be crawled"
//! predicate (§4.5), called from both the Crawl Worker's fan-out (§4.6) and
//! the Generate Worker's follow-up crawl (§4.8) — one function, two call
//! sites, per the Open Question decision in DESIGN.md.

use crate::models::citation_score;

/// Priority floor below which a crawl enqueue is rejected outright (§4.5,
/// §9 Open Questions: adopted consistently as `10`).
pub const PRIORITY_FLOOR: i32 = 10;

/// `priority = round(100 * max(0, 1 - hop/MAX_HOPS) * (0.5 + 0.5 * citation_score))`.
pub fn priority(hop: u32, max_hops: u32, citation_count: i64) -> i32 {
    let depth_term = if max_hops == 0 {
        0.0
    } else {
        (1.0 - hop as f64 / max_hops as f64).max(0.0)
    };
    let score = 0.5 + 0.5 * citation_score(citation_count);
    (100.0 * depth_term * score).round() as i32
}

/// `should_recurse`: true when the neighbor's computed priority clears the
/// floor and the hop budget isn't exhausted.
pub fn should_recurse(hop: u32, max_hops: u32, citation_count: i64) -> bool {
    hop < max_hops && priority(hop, max_hops, citation_count) >= PRIORITY_FLOOR
}

/// A neighbor discovered while crawling or while generating a follow-up.
pub struct Candidate {
    pub paper_id: String,
    pub title: String,
    pub citation_count: i64,
}

/// Outcome of evaluating one candidate.
pub enum Qualification {
    /// Enqueue a `crawl` job for this paper at the given priority.
    Enqueue { paper_id: String, priority: i32, hop: u32 },
    /// Priority fell below the floor, or the hop budget is exhausted.
    Rejected,
}

/// Evaluate one neighbor against the recursion predicate. Pure function —
/// callers perform the actual `InsertEdge`/`Enqueue` against the store;
/// this only decides whether to.
pub fn qualify(candidate: &Candidate, hop: u32, max_hops: u32) -> Qualification {
    if !should_recurse(hop, max_hops, candidate.citation_count) {
        return Qualification::Rejected;
    }
    Qualification::Enqueue {
        paper_id: candidate.paper_id.clone(),
        priority: priority(hop, max_hops, candidate.citation_count),
        hop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_at_hop_zero_with_no_citations_is_fifty() {
        // depth_term = 1, score = 0.5 -> 100 * 1 * 0.5 = 50
        assert_eq!(priority(0, 2, 0), 50);
    }

    #[test]
    fn priority_at_max_hops_is_zero() {
        assert_eq!(priority(2, 2, 500), 0);
    }

    #[test]
    fn priority_scales_with_citation_count() {
        let low = priority(1, 2, 2);
        let high = priority(1, 2, 500);
        assert!(high > low);
    }

    #[test]
    fn should_recurse_rejects_at_hop_budget_exhausted() {
        assert!(!should_recurse(2, 2, 500)); // hop == max_hops: no recursion regardless of score
    }

    #[test]
    fn should_recurse_rejects_below_priority_floor() {
        // hop=9, max_hops=10, citation_count=0: depth_term=0.1, score=0.5 -> priority=5 < 10
        assert_eq!(priority(9, 10, 0), 5);
        assert!(!should_recurse(9, 10, 0));
    }

    #[test]
    fn should_recurse_accepts_high_priority_within_budget() {
        assert!(should_recurse(0, 2, 500));
    }
}
