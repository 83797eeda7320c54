use crate::library::{Track, TrackId};
use std::collections::HashSet;

/// Tracks of `b` whose identity also appears in `a`, in `b`'s order.
///
/// Content is commutative, order is not: the second operand decides the output order.
pub fn track_intersection(a: &[Track], b: &[Track]) -> Vec<Track> {
    let ids: HashSet<TrackId> = a.iter().map(|t| t.id).collect();

    b.iter().filter(|t| ids.contains(&t.id)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::testing::{ids, track};

    #[test]
    fn test_order_follows_second_operand() {
        let a = vec![track(3, "Rock", "A", "X"), track(1, "Rock", "A", "X")];
        let b = vec![
            track(1, "Rock", "A", "X"),
            track(2, "Jazz", "B", "Y"),
            track(3, "Rock", "A", "X"),
        ];

        assert_eq!(ids(&track_intersection(&a, &b)), vec![1, 3]);
        assert_eq!(ids(&track_intersection(&b, &a)), vec![3, 1]);
    }

    #[test]
    fn test_empty_operand_gives_empty() {
        let a = vec![track(1, "Rock", "A", "X")];
        assert!(track_intersection(&a, &[]).is_empty());
        assert!(track_intersection(&[], &a).is_empty());
    }

    #[test]
    fn test_self_intersection_is_idempotent() {
        let a = vec![track(2, "Rock", "A", "X"), track(5, "Jazz", "B", "Y")];
        let once = track_intersection(&a, &a);
        assert_eq!(once, a);
        assert_eq!(track_intersection(&once, &once), a);
    }
}
