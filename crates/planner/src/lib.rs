//! # Planner - version graph, update plans and retention
//!
//! Pure functions over an in-memory [`VersionGraph`]; nothing here touches
//! the filesystem.
//!
//! - [`plan_update`] finds the shortest `(base, deltas)` sequence that turns a
//!   partition's current state into a target version.
//! - [`versions_to_delete`] decides which remote versions are no longer
//!   needed by any retained leaf.
//!
//! Both walk parent links backward with the same routine,
//! [`resolve_chain`], so a version retention keeps is always one the updater
//! can rebuild.

mod plan;
mod retention;
mod version;

use thiserror::Error;

pub use plan::{plan_update, resolve_chain, UpdatePlan};
pub use retention::versions_to_delete;
pub use version::{DomainVersion, VersionGraph};

/// Why no plan could be produced. No partial plan is ever returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("version {0} is not known to the domain")]
    UnknownVersion(u32),

    #[error("version {0} is not closed and cannot be part of an update")]
    OpenVersion(u32),

    #[error("target version {0} is defunct")]
    DefunctTarget(u32),

    #[error("version {version} has parent {parent}, which is not known to the domain")]
    MissingParent { version: u32, parent: u32 },

    #[error("delta version {0} has no parent")]
    Orphan(u32),

    #[error("no non-defunct base reachable from version {0}")]
    NoAnchor(u32),

    #[error("parent links of version {0} form a cycle")]
    Cycle(u32),
}

#[cfg(test)]
mod tests;
