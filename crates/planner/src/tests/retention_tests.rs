use super::*;
use std::collections::BTreeSet;

/// Two independent chains, three leaves:
///
/// ```text
/// v0 (base) <- v1 <- v2
///               ^--- v3
/// v4 (base) <- v5
/// ```
fn two_chains() -> VersionGraph {
    [
        DomainVersion::base(0, 100),
        DomainVersion::delta(1, 0, 101),
        DomainVersion::delta(2, 1, 102),
        DomainVersion::delta(3, 1, 103),
        DomainVersion::base(4, 104),
        DomainVersion::delta(5, 4, 105),
    ]
    .into_iter()
    .collect()
}

fn set(items: &[u32]) -> BTreeSet<u32> {
    items.iter().copied().collect()
}

#[test]
fn keep_zero_deletes_nothing() {
    assert!(versions_to_delete(&two_chains(), 0).is_empty());
}

#[test]
fn keep_one_retains_only_newest_chain() {
    assert_eq!(versions_to_delete(&two_chains(), 1), set(&[0, 1, 2, 3]));
}

#[test]
fn keep_two_drops_the_oldest_leaf() {
    assert_eq!(versions_to_delete(&two_chains(), 2), set(&[2]));
}

#[test]
fn keep_three_retains_every_leaf() {
    assert!(versions_to_delete(&two_chains(), 3).is_empty());
}

#[test]
fn open_versions_are_never_deleted() {
    let mut graph = two_chains();
    graph.insert(DomainVersion::delta(6, 5, 0).still_open());
    // v6 is open: it does not count as a leaf, but neither it nor the
    // chain under it is deleted. v3 is the retained leaf.
    let doomed = versions_to_delete(&graph, 1);
    assert_eq!(doomed, set(&[2]));
}

#[test]
fn defunct_leaf_hands_retention_to_its_parent() {
    let graph = with_defunct(two_chains(), 5);
    // v5 is defunct, so v4 is a leaf again and the newest one.
    assert_eq!(versions_to_delete(&graph, 1), set(&[0, 1, 2, 3, 5]));
    assert_eq!(versions_to_delete(&graph, 2), set(&[2, 5]));
}

#[test]
fn only_base_survives_a_defunct_delta() {
    let graph: VersionGraph = [
        DomainVersion::base(0, 100),
        DomainVersion::delta(1, 0, 101).marked_defunct(),
    ]
    .into_iter()
    .collect();
    assert_eq!(versions_to_delete(&graph, 1), set(&[1]));
}

#[test]
fn defunct_middle_version_is_dropped_from_chain() {
    let graph: VersionGraph = [
        DomainVersion::base(0, 100),
        DomainVersion::delta(1, 0, 101).marked_defunct(),
        DomainVersion::delta(2, 1, 102),
    ]
    .into_iter()
    .collect();
    assert_eq!(versions_to_delete(&graph, 1), set(&[1]));
}

#[test]
fn leaves_follow_close_time_not_number() {
    let mut graph = two_chains();
    // Re-close v2 last: it becomes the most recent leaf.
    graph.insert(DomainVersion::delta(2, 1, 999));
    assert_eq!(versions_to_delete(&graph, 1), set(&[3, 4, 5]));
}
