use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::plan::resolve_chain;
use crate::version::VersionGraph;

/// Versions that may be deleted remotely when keeping `keep` leaves.
///
/// The `keep` most recently closed leaves of [`VersionGraph::leaves`] are
/// retained together with every version the planner would use to rebuild
/// them. Open versions, and the versions they build on, are never deleted.
/// `keep == 0` deletes nothing.
#[must_use]
pub fn versions_to_delete(graph: &VersionGraph, keep: usize) -> BTreeSet<u32> {
    if keep == 0 {
        return BTreeSet::new();
    }

    let mut leaves: Vec<(u64, u32)> = graph
        .leaves()
        .into_iter()
        .filter_map(|n| graph.get(n))
        .filter_map(|v| v.closed_at.map(|at| (at, v.number)))
        .collect();
    leaves.sort_unstable_by(|a, b| b.cmp(a));

    let mut retained = BTreeSet::new();
    for &(_, leaf) in leaves.iter().take(keep) {
        match resolve_chain(graph, leaf, |_| false) {
            Ok(chain) => retained.extend(chain.versions()),
            Err(e) => {
                // Keep the whole raw ancestry rather than guess.
                warn!(leaf, error = %e, "cannot resolve chain of retained leaf");
                retain_ancestry(graph, leaf, &mut retained);
            }
        }
    }

    // An open version may still be closed later; keep what it builds on.
    for open in graph.iter().filter(|v| !v.is_closed()) {
        retain_ancestry(graph, open.number, &mut retained);
    }

    let doomed: BTreeSet<u32> = graph
        .iter()
        .filter(|v| v.is_closed() && !retained.contains(&v.number))
        .map(|v| v.number)
        .collect();
    debug!(keep, retained = retained.len(), deleting = doomed.len(), "retention computed");
    doomed
}

fn retain_ancestry(graph: &VersionGraph, leaf: u32, retained: &mut BTreeSet<u32>) {
    let mut next = Some(leaf);
    let mut steps = 0;
    while let Some(n) = next {
        retained.insert(n);
        steps += 1;
        if steps > graph.len() {
            break;
        }
        next = graph.get(n).filter(|v| !v.is_base).and_then(|v| v.parent);
    }
}
