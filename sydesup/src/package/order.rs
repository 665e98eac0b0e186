//! Deterministic node update order.
//!
//! Update positions come from view data and are not guaranteed to be unique,
//! dense or even within the node count (deleting a node does not renumber the
//! remaining positions). The planner therefore orders by position and keeps
//! system-definition order between nodes that share a position.

/// Derive the node processing order from raw update positions.
///
/// Every index `i` with `active[i]` set appears exactly once; inactive nodes
/// never appear. Nodes are sorted by `positions[i]`, ties keep node-array
/// order. Duplicate positions are accepted as they are.
///
/// # Panics
///
/// Panics if `active` and `positions` differ in length. Both come from the
/// same node list, so a mismatch is a caller bug.
pub fn plan_update_order(active: &[bool], positions: &[u32]) -> Vec<usize> {
    assert_eq!(
        active.len(),
        positions.len(),
        "active flags and update positions must cover the same nodes"
    );

    let mut order: Vec<usize> = active
        .iter()
        .enumerate()
        .filter_map(|(index, &is_active)| is_active.then_some(index))
        .collect();

    // Stable sort: equal positions keep ascending node index.
    order.sort_by_key(|&index| positions[index]);
    order
}

/// Rank of each node within `order`, `None` for nodes not in the order.
///
/// These dense, unique ranks are what the package stores.
pub fn normalized_positions(order: &[usize], node_count: usize) -> Vec<Option<u32>> {
    let mut positions = vec![None; node_count];
    for (rank, &node_index) in order.iter().enumerate() {
        if let Some(slot) = positions.get_mut(node_index) {
            *slot = Some(rank as u32);
        }
    }
    positions
}

/// Rebuild the update order from stored positions.
///
/// Nodes without a position are left out. The rest are ordered exactly like
/// [`plan_update_order`] does, so dense ranks written by this crate and raw,
/// sparse or shared positions written by other producers are both accepted.
pub fn order_from_positions(positions: &[Option<u32>]) -> Vec<usize> {
    let mut order: Vec<(usize, u32)> = positions
        .iter()
        .enumerate()
        .filter_map(|(index, position)| position.map(|p| (index, p)))
        .collect();
    order.sort_by_key(|&(_, position)| position);
    order.into_iter().map(|(index, _)| index).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_positions_with_inactive_node() {
        let order = plan_update_order(&[true, true, false], &[2, 0, 0]);
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn test_shared_position_keeps_node_order() {
        let order = plan_update_order(&[true, true, true, true], &[1, 0, 1, 0]);
        assert_eq!(order, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_stale_position_beyond_node_count() {
        let order = plan_update_order(&[true, true], &[u32::MAX, 7]);
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn test_no_active_nodes() {
        assert!(plan_update_order(&[false, false], &[0, 1]).is_empty());
        assert!(plan_update_order(&[], &[]).is_empty());
    }

    #[test]
    #[should_panic(expected = "same nodes")]
    fn test_length_mismatch_panics() {
        plan_update_order(&[true], &[0, 1]);
    }

    #[test]
    fn test_normalized_positions_roundtrip() {
        let order = plan_update_order(&[true, false, true, true], &[5, 0, 5, 1]);
        assert_eq!(order, vec![3, 0, 2]);

        let positions = normalized_positions(&order, 4);
        assert_eq!(positions, vec![Some(1), None, Some(2), Some(0)]);
        assert_eq!(order_from_positions(&positions), order);
    }

    #[test]
    fn test_order_from_sparse_and_shared_positions() {
        assert_eq!(order_from_positions(&[Some(2), Some(0), Some(0)]), vec![1, 2, 0]);
        assert_eq!(order_from_positions(&[Some(0), None, Some(9)]), vec![0, 2]);
        assert!(order_from_positions(&[None, None]).is_empty());
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn nodes() -> impl Strategy<Value = (Vec<bool>, Vec<u32>)> {
            (0usize..24).prop_flat_map(|count| {
                (
                    proptest::collection::vec(any::<bool>(), count),
                    proptest::collection::vec(0u32..8, count),
                )
            })
        }

        proptest! {
            #[test]
            fn test_order_is_deterministic((active, positions) in nodes()) {
                prop_assert_eq!(
                    plan_update_order(&active, &positions),
                    plan_update_order(&active, &positions)
                );
            }

            #[test]
            fn test_order_covers_active_nodes_once((active, positions) in nodes()) {
                let order = plan_update_order(&active, &positions);
                for (index, &is_active) in active.iter().enumerate() {
                    let occurrences = order.iter().filter(|&&i| i == index).count();
                    prop_assert_eq!(occurrences, usize::from(is_active));
                }
            }

            #[test]
            fn test_order_is_monotonic_and_tie_stable((active, positions) in nodes()) {
                let order = plan_update_order(&active, &positions);
                for pair in order.windows(2) {
                    let (a, b) = (pair[0], pair[1]);
                    prop_assert!(positions[a] <= positions[b]);
                    if positions[a] == positions[b] {
                        prop_assert!(a < b, "tie between {} and {} not in node order", a, b);
                    }
                }
            }

            #[test]
            fn test_raw_positions_rebuild_planned_order((active, positions) in nodes()) {
                let stored: Vec<Option<u32>> = active
                    .iter()
                    .zip(&positions)
                    .map(|(&is_active, &p)| is_active.then_some(p))
                    .collect();
                prop_assert_eq!(
                    order_from_positions(&stored),
                    plan_update_order(&active, &positions)
                );
            }

            #[test]
            fn test_normalized_positions_rebuild_order((active, positions) in nodes()) {
                let order = plan_update_order(&active, &positions);
                let ranks = normalized_positions(&order, active.len());
                prop_assert_eq!(order_from_positions(&ranks), order);
            }
        }
    }
}
