use std::collections::BTreeSet;
use tracing::debug;

use crate::version::VersionGraph;
use crate::PlanError;

/// Versions to apply, in order: the anchor `base`, then each delta.
///
/// `base` is not necessarily a base version: it can be the partition's
/// current version or a cached version that the deltas build on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub base: u32,
    /// Ascending version order.
    pub deltas: Vec<u32>,
}

impl UpdatePlan {
    /// Version the partition is at once the plan is applied.
    #[must_use]
    pub fn target(&self) -> u32 {
        self.deltas.last().copied().unwrap_or(self.base)
    }

    /// `base` followed by the deltas.
    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        std::iter::once(self.base).chain(self.deltas.iter().copied())
    }
}

impl std::fmt::Display for UpdatePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "base={} deltas={:?}", self.base, self.deltas)
    }
}

/// Walks parent links back from `start` until an anchor is found.
///
/// A version stops the walk if it is not defunct and either `is_anchor`
/// accepts it or it is a base. Defunct versions are stepped over: they are
/// neither anchor nor delta. Every visited version must be closed.
///
/// Returns the anchor and the deltas above it in ascending order.
pub fn resolve_chain<F>(
    graph: &VersionGraph,
    start: u32,
    is_anchor: F,
) -> Result<UpdatePlan, PlanError>
where
    F: Fn(u32) -> bool,
{
    let mut deltas = Vec::new();
    let mut seen = BTreeSet::new();
    let mut number = start;
    loop {
        if !seen.insert(number) {
            return Err(PlanError::Cycle(start));
        }
        let version = graph.get(number).ok_or(PlanError::UnknownVersion(number))?;
        if !version.is_closed() {
            return Err(PlanError::OpenVersion(number));
        }
        if !version.defunct {
            if version.is_base || is_anchor(number) {
                deltas.reverse();
                return Ok(UpdatePlan {
                    base: number,
                    deltas,
                });
            }
            deltas.push(number);
        }

        // Only a defunct base gets here; nothing lies behind it.
        if version.is_base {
            return Err(PlanError::NoAnchor(start));
        }
        number = match version.parent {
            Some(parent) if graph.contains(parent) => parent,
            Some(parent) => return Err(PlanError::MissingParent { version: number, parent }),
            None => return Err(PlanError::Orphan(number)),
        };
    }
}

/// Plans how to bring a partition from `current` to `target`.
///
/// Returns `Ok(None)` when there is nothing to do: no target, or the target
/// is already current. Otherwise the plan is anchored at the nearest of: a
/// base, the current version, or a cached version, skipping defunct versions.
///
/// # Errors
///
/// [`PlanError`] if the target is unknown or defunct, the chain crosses an
/// open version, or no non-defunct anchor can be reached.
pub fn plan_update(
    graph: &VersionGraph,
    current: Option<u32>,
    cached: &BTreeSet<u32>,
    target: Option<u32>,
) -> Result<Option<UpdatePlan>, PlanError> {
    let target = match target {
        Some(t) => t,
        None => return Ok(None),
    };
    if current == Some(target) {
        return Ok(None);
    }
    let version = graph.get(target).ok_or(PlanError::UnknownVersion(target))?;
    if version.defunct {
        return Err(PlanError::DefunctTarget(target));
    }

    let plan = resolve_chain(graph, target, |n| Some(n) == current || cached.contains(&n))?;
    debug!(?current, target, %plan, "update planned");
    Ok(Some(plan))
}
