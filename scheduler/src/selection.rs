//! Candidate ordering for the auto-reservation batch.
//!
//! The engine may observe the preference snapshot in any order; the batch
//! must still book the same members on every run. Sorting by member id
//! gives a stable, reproducible order to truncate from.

use booking::model::MemberId;

/// Order eligible members deterministically and drop duplicates.
pub fn order_candidates(mut members: Vec<MemberId>) -> Vec<MemberId> {
    members.sort_unstable();
    members.dedup();
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn ordering_is_deterministic_across_shuffles() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let first = order_candidates(vec![c, a, b]);
        let second = order_candidates(vec![b, c, a]);

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn duplicates_are_dropped() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let out = order_candidates(vec![a, b, a, a]);
        assert_eq!(out.len(), 2);
    }
}
