mod graph_tests;
mod retention_tests;

use crate::*;

/// v0 (base) <- v1 <- v2 <- v3 (open) <- v4
pub(crate) fn linear_chain() -> VersionGraph {
    [
        DomainVersion::base(0, 1_000),
        DomainVersion::delta(1, 0, 1_001),
        DomainVersion::delta(2, 1, 1_002),
        DomainVersion::delta(3, 2, 1_003).still_open(),
        DomainVersion::delta(4, 3, 1_004),
    ]
    .into_iter()
    .collect()
}

pub(crate) fn with_defunct(mut graph: VersionGraph, number: u32) -> VersionGraph {
    if let Some(v) = graph.get(number).cloned() {
        graph.insert(v.marked_defunct());
    }
    graph
}
