use super::*;
use config::VersionEntry;

#[test]
fn leaves_are_versions_without_children() {
    let graph = linear_chain();
    assert_eq!(graph.leaves(), vec![4]);
    assert_eq!(graph.len(), 5);
}

#[test]
fn defunct_versions_are_cut_out_before_finding_leaves() {
    // v0 <- v1 (defunct) <- v2, v0 <- v3 (defunct)
    let graph = with_defunct(
        with_defunct(
            [
                DomainVersion::base(0, 1),
                DomainVersion::delta(1, 0, 2),
                DomainVersion::delta(2, 1, 3),
                DomainVersion::delta(3, 0, 4),
            ]
            .into_iter()
            .collect(),
            1,
        ),
        3,
    );
    assert_eq!(graph.leaves(), vec![2]);

    let lone = with_defunct(
        [DomainVersion::base(0, 1), DomainVersion::delta(1, 0, 2)]
            .into_iter()
            .collect(),
        1,
    );
    assert_eq!(lone.leaves(), vec![0]);
}

#[test]
fn base_parent_links_are_ignored_for_leaves() {
    let mut rebased = DomainVersion::base(1, 10);
    rebased.parent = Some(0);
    let graph: VersionGraph = [DomainVersion::base(0, 5), rebased].into_iter().collect();
    assert_eq!(graph.leaves(), vec![0, 1]);
}

#[test]
fn graph_builds_from_config_entries() {
    let entries = vec![
        VersionEntry {
            number: 0,
            closed_at: Some(1),
            defunct: false,
            is_base: true,
            parent: None,
        },
        VersionEntry {
            number: 1,
            closed_at: None,
            defunct: false,
            is_base: false,
            parent: Some(0),
        },
    ];
    let graph: VersionGraph = entries.iter().collect();
    assert!(graph.get(0).map_or(false, |v| v.is_base && v.is_closed()));
    assert!(graph.get(1).map_or(false, |v| !v.is_closed()));
    assert_eq!(graph.get(1).and_then(|v| v.parent), Some(0));
}

#[test]
fn insert_replaces_existing_version() {
    let mut graph = linear_chain();
    graph.insert(DomainVersion::delta(3, 2, 50));
    assert!(graph.get(3).map_or(false, |v| v.is_closed()));
    assert_eq!(graph.len(), 5);
}
