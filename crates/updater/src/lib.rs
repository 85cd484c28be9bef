//! # Updater - moving a partition between versions
//!
//! - [`PartitionUpdater`] brings one local partition to a target version:
//!   plan, fetch into the cache, merge into a private work directory, commit
//!   by moving files into the live directory, then clean up.
//! - [`RemoteDomainCleaner`] deletes remote versions no retained leaf needs.
//! - [`RemoteFileOps`] abstracts the remote store; [`LocalFileOps`] serves a
//!   remote that is reachable as a directory.
//! - [`PartitionReader`] opens whatever version the live directory holds.
//!
//! A partition's current version is never stored separately. It is read off
//! the live directory listing by [`naming::detect_current_version`]: the
//! highest version with a complete base.
//!
//! ## Crash safety
//!
//! Fetches land in `_fetch_<n>/` and merges in `_update_work_<n>/`; both are
//! deleted on failure and on the next attempt. Only the final move into the
//! live directory is visible to readers, and until the new base is complete
//! there the previous one is still the highest complete base.

mod cleaner;
mod fsops;
pub mod naming;
mod partition;
mod remote;
mod serving;

pub use cleaner::{CleanerReport, RemoteDomainCleaner};
pub use fsops::{commit_files, require_file, MissingFileError};
pub use partition::{PartitionUpdater, UpdateOutcome, UpdateState, UpdateStats};
pub use remote::{from_config as remote_from_config, remote_path, LocalFileOps, RemoteFileOps};
pub use serving::PartitionReader;

#[cfg(test)]
mod tests;
