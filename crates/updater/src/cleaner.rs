use anyhow::{Context, Result};
use config::DomainConfig;
use planner::{versions_to_delete, VersionGraph};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::naming::{FileExt, VersionedFile};
use crate::remote::{remote_path, RemoteFileOps};

/// What a cleaner run removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanerReport {
    pub deleted_versions: BTreeSet<u32>,
    /// Remote files that existed and were deleted.
    pub files_removed: usize,
}

/// Deletes remote versions no retained leaf depends on.
///
/// For every version chosen by [`planner::versions_to_delete`], both base
/// and delta names of both file kinds are deleted in every partition of the
/// domain, whatever the domain's engine: a file that is not there is simply
/// skipped.
pub struct RemoteDomainCleaner {
    domain: DomainConfig,
    remote: Arc<dyn RemoteFileOps>,
}

impl RemoteDomainCleaner {
    pub fn new(domain: DomainConfig, remote: Arc<dyn RemoteFileOps>) -> Self {
        Self { domain, remote }
    }

    /// Uses `num_remote_leaf_versions_to_keep` from the domain config.
    pub fn run(&self, graph: &VersionGraph) -> Result<CleanerReport> {
        self.run_keeping(graph, self.domain.storage.num_remote_leaf_versions_to_keep)
    }

    pub fn run_keeping(&self, graph: &VersionGraph, keep: usize) -> Result<CleanerReport> {
        let doomed = versions_to_delete(graph, keep);
        let mut report = CleanerReport::default();
        if doomed.is_empty() {
            debug!(domain = %self.domain.name, keep, "no remote versions to delete");
            return Ok(report);
        }

        for &version in &doomed {
            for partition in 0..self.domain.num_partitions {
                for is_base in [true, false] {
                    for ext in FileExt::ALL {
                        let name = VersionedFile::new(version, is_base, ext).file_name();
                        let path = remote_path(partition, &name);
                        let removed = self.remote.attempt_delete(&path).with_context(|| {
                            format!("failed to delete {}", self.remote.remote_absolute_path(&path))
                        })?;
                        if removed {
                            debug!(remote = %self.remote.remote_absolute_path(&path), "deleted");
                            report.files_removed += 1;
                        }
                    }
                }
            }
            report.deleted_versions.insert(version);
        }

        info!(
            domain = %self.domain.name,
            keep,
            versions = ?report.deleted_versions,
            files = report.files_removed,
            "remote versions deleted"
        );
        Ok(report)
    }
}
