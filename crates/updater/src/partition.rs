use anyhow::{Context, Result};
use blobstore::{BlobOptions, BlobReader};
use config::{DomainConfig, FleetConfig, StorageEngineKind};
use hashindex::{HashIndexOptions, HashIndexReader, ValueTransformer};
use parking_lot::Mutex;
use planner::{plan_update, UpdatePlan, VersionGraph};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::fsops::{commit_files, move_file, remove_dir_if_exists, require_file, sync_dir};
use crate::naming::{
    complete_versions, components, detect_current_version, list_files, FileExt, VersionedFile,
};
use crate::remote::{self, remote_path, RemoteFileOps};

const CACHE_DIR: &str = "cache";
const FETCH_PREFIX: &str = "_fetch_";
const WORK_PREFIX: &str = "_update_work_";

/// Where an update attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Fetching,
    Merging,
    Committing,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateState::Idle => "idle",
            UpdateState::Fetching => "fetching",
            UpdateState::Merging => "merging",
            UpdateState::Committing => "committing",
        };
        f.write_str(s)
    }
}

/// Timings and counts of one successful update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub fetched_files: usize,
    /// Records in the newly built base.
    pub merged_records: u64,
    pub fetch_time: Duration,
    pub merge_time: Duration,
    pub commit_time: Duration,
}

/// What [`PartitionUpdater::update_to`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Nothing to do; the partition is at `version`.
    UpToDate { version: Option<u32> },
    Updated {
        from: Option<u32>,
        to: u32,
        plan: UpdatePlan,
        stats: UpdateStats,
    },
}

/// Brings one local partition to a requested version.
///
/// Directory layout under the partition root:
///
/// ```text
/// <root>/00012.base.hidx       live files, served to readers
/// <root>/cache/                fetched versions not yet merged
/// <root>/_fetch_<n>/           files of an in-flight fetch
/// <root>/_update_work_<n>/     output of an in-flight merge
/// ```
///
/// Live files only change in [`commit_files`]; fetches and merges write to
/// private per-attempt directories that are discarded on failure. One
/// updater per partition at a time is the caller's responsibility.
pub struct PartitionUpdater {
    domain: DomainConfig,
    partition: u32,
    root: PathBuf,
    remote: Arc<dyn RemoteFileOps>,
    transformer: Option<Arc<dyn ValueTransformer + Send + Sync>>,
    state: Mutex<UpdateState>,
    attempts: AtomicU64,
}

impl fmt::Debug for PartitionUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionUpdater")
            .field("domain", &self.domain.name)
            .field("partition", &self.partition)
            .field("root", &self.root)
            .field("state", &self.state())
            .finish()
    }
}

impl PartitionUpdater {
    pub fn new<P: AsRef<Path>>(
        domain: DomainConfig,
        partition: u32,
        root: P,
        remote: Arc<dyn RemoteFileOps>,
    ) -> Self {
        Self {
            domain,
            partition,
            root: root.as_ref().to_path_buf(),
            remote,
            transformer: None,
            state: Mutex::new(UpdateState::Idle),
            attempts: AtomicU64::new(0),
        }
    }

    /// Updater for the partition named in `[updater]`.
    pub fn from_config(cfg: &FleetConfig) -> Result<Self> {
        cfg.domain.validate()?;
        if cfg.updater.partition >= cfg.domain.num_partitions {
            anyhow::bail!(
                "partition {} out of range for domain {} ({} partitions)",
                cfg.updater.partition,
                cfg.domain.name,
                cfg.domain.num_partitions
            );
        }
        Ok(Self::new(
            cfg.domain.clone(),
            cfg.updater.partition,
            cfg.updater.partition_root(&cfg.domain.name),
            remote::from_config(&cfg.updater.remote),
        ))
    }

    /// Hook applied to every value surviving a hash-indexed merge.
    #[must_use]
    pub fn with_value_transformer(mut self, t: Arc<dyn ValueTransformer + Send + Sync>) -> Self {
        self.transformer = Some(t);
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    #[must_use]
    pub fn domain(&self) -> &DomainConfig {
        &self.domain
    }

    #[must_use]
    pub fn partition(&self) -> u32 {
        self.partition
    }

    #[must_use]
    pub fn state(&self) -> UpdateState {
        *self.state.lock()
    }

    fn set_state(&self, next: UpdateState) {
        let mut state = self.state.lock();
        debug!(partition = self.partition, from = %*state, to = %next, "update state");
        *state = next;
    }

    /// Highest version with a complete base in the live directory.
    pub fn detect_current_version(&self) -> Result<Option<u32>> {
        let names = list_files(&self.root)?;
        Ok(detect_current_version(names, self.domain.engine))
    }

    /// Versions with a complete base file in the cache directory.
    pub fn detect_cached_bases(&self) -> Result<BTreeSet<u32>> {
        let names = list_files(&self.cache_dir())?;
        Ok(complete_versions(names, self.domain.engine, true))
    }

    /// Versions with a complete delta file in the cache directory.
    pub fn detect_cached_deltas(&self) -> Result<BTreeSet<u32>> {
        let names = list_files(&self.cache_dir())?;
        Ok(complete_versions(names, self.domain.engine, false))
    }

    /// The plan [`update_to`](Self::update_to) would run, without running it.
    pub fn plan(&self, graph: &VersionGraph, target: Option<u32>) -> Result<Option<UpdatePlan>> {
        let current = self.detect_current_version()?;
        let cached: BTreeSet<u32> = self
            .detect_cached_bases()?
            .into_iter()
            .filter(|v| graph.contains(*v))
            .collect();
        Ok(plan_update(graph, current, &cached, target)?)
    }

    /// Runs a full update to `target`.
    ///
    /// On failure the live directory is untouched, the attempt's private
    /// directories are removed and the state returns to `Idle`.
    pub fn update_to(&self, graph: &VersionGraph, target: Option<u32>) -> Result<UpdateOutcome> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
        self.remove_stale_attempts()?;

        let current = self.detect_current_version()?;
        let plan = match self.plan(graph, target)? {
            Some(p) => p,
            None => {
                debug!(partition = self.partition, ?current, "partition up to date");
                return Ok(UpdateOutcome::UpToDate { version: current });
            }
        };
        info!(partition = self.partition, ?current, %plan, "starting update");

        let result = self.run_attempt(attempt, current, &plan);
        self.set_state(UpdateState::Idle);
        let stats = match result {
            Ok(s) => s,
            Err(e) => {
                warn!(partition = self.partition, error = %e, "update failed");
                let _ = remove_dir_if_exists(&self.work_root(attempt));
                return Err(e);
            }
        };

        let to = plan.target();
        info!(
            partition = self.partition,
            ?current,
            to,
            fetched = stats.fetched_files,
            records = stats.merged_records,
            "update committed"
        );
        Ok(UpdateOutcome::Updated {
            from: current,
            to,
            plan,
            stats,
        })
    }

    fn run_attempt(
        &self,
        attempt: u64,
        current: Option<u32>,
        plan: &UpdatePlan,
    ) -> Result<UpdateStats> {
        let mut stats = UpdateStats::default();

        self.set_state(UpdateState::Fetching);
        let started = Instant::now();
        stats.fetched_files = self.fetch_into_cache(attempt, current, plan)?;
        stats.fetch_time = started.elapsed();

        self.set_state(UpdateState::Merging);
        let started = Instant::now();
        let work_root = self.work_root(attempt);
        stats.merged_records = self.build_target(&work_root, current, plan)?;
        stats.merge_time = started.elapsed();

        self.set_state(UpdateState::Committing);
        let started = Instant::now();
        commit_files(&work_root, &self.root)
            .with_context(|| format!("failed to commit {}", work_root.display()))?;
        self.delete_obsolete_files(plan.target())?;
        self.clean_cached_versions()?;
        remove_dir_if_exists(&work_root)?;
        stats.commit_time = started.elapsed();
        Ok(stats)
    }

    fn fetch_root(&self, attempt: u64) -> PathBuf {
        self.root.join(format!("{}{}", FETCH_PREFIX, attempt))
    }

    fn work_root(&self, attempt: u64) -> PathBuf {
        self.root.join(format!("{}{}", WORK_PREFIX, attempt))
    }

    /// Deletes fetch and work roots left behind by interrupted attempts.
    fn remove_stale_attempts(&self) -> Result<()> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if entry.file_type()?.is_dir()
                && (name.starts_with(FETCH_PREFIX) || name.starts_with(WORK_PREFIX))
            {
                warn!(path = %entry.path().display(), "removing leftover update directory");
                remove_dir_if_exists(&entry.path())?;
            }
        }
        Ok(())
    }

    /// Files the plan needs that are neither live nor cached.
    fn files_to_fetch(
        &self,
        current: Option<u32>,
        plan: &UpdatePlan,
    ) -> Result<Vec<VersionedFile>> {
        let cached_bases = self.detect_cached_bases()?;
        let cached_deltas = self.detect_cached_deltas()?;
        let mut needed = Vec::new();
        if Some(plan.base) != current && !cached_bases.contains(&plan.base) {
            needed.extend(self.version_files(plan.base, true));
        }
        for &delta in &plan.deltas {
            if !cached_deltas.contains(&delta) {
                needed.extend(self.version_files(delta, false));
            }
        }
        Ok(needed)
    }

    fn version_files(&self, version: u32, is_base: bool) -> impl Iterator<Item = VersionedFile> {
        components(self.domain.engine)
            .iter()
            .map(move |&ext| VersionedFile::new(version, is_base, ext))
    }

    /// Fetches every plan file that is neither live nor cached into a
    /// private fetch root, then moves them all into the cache. Any failure
    /// discards the fetch root, so the cache never receives a partial version.
    ///
    /// A failed copy is returned as the underlying [`std::io::Error`].
    /// Returns the number of files fetched.
    pub fn cache_versions_needed(&self, plan: &UpdatePlan) -> Result<usize> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
        let current = self.detect_current_version()?;
        self.fetch_into_cache(attempt, current, plan)
    }

    fn fetch_into_cache(
        &self,
        attempt: u64,
        current: Option<u32>,
        plan: &UpdatePlan,
    ) -> Result<usize> {
        let needed = self.files_to_fetch(current, plan)?;
        if needed.is_empty() {
            return Ok(0);
        }
        let fetch_root = self.fetch_root(attempt);
        std::fs::create_dir_all(&fetch_root)?;

        for file in &needed {
            let path = remote_path(self.partition, &file.file_name());
            debug!(remote = %self.remote.remote_absolute_path(&path), "fetching");
            if let Err(e) = self.remote.copy_to_local_root(&path, &fetch_root) {
                warn!(
                    remote = %self.remote.remote_absolute_path(&path),
                    error = %e,
                    "fetch failed, discarding attempt"
                );
                let _ = remove_dir_if_exists(&fetch_root);
                return Err(e.into());
            }
        }

        let cache = self.cache_dir();
        std::fs::create_dir_all(&cache)?;
        let promoted = commit_files(&fetch_root, &cache);
        let _ = remove_dir_if_exists(&fetch_root);
        promoted?;
        Ok(needed.len())
    }

    /// Builds `<target>.base.*` in `work_root` from the plan's base and
    /// deltas, taking the base from the live directory if it is the current
    /// version and from the cache otherwise. Deltas always come from the
    /// cache. With no deltas the base is moved, not rewritten.
    ///
    /// Returns the number of records in the result. A missing input fails
    /// with [`MissingFileError`](crate::MissingFileError) before anything is
    /// written.
    pub fn run_update_core(&self, work_root: &Path, plan: &UpdatePlan) -> Result<u64> {
        let current = self.detect_current_version()?;
        self.build_target(work_root, current, plan)
    }

    fn build_target(
        &self,
        work_root: &Path,
        current: Option<u32>,
        plan: &UpdatePlan,
    ) -> Result<u64> {
        std::fs::create_dir_all(work_root)?;
        let cache = self.cache_dir();
        let base_dir = if Some(plan.base) == current {
            self.root.as_path()
        } else {
            cache.as_path()
        };
        let path_of = |dir: &Path, version: u32, is_base: bool, ext: FileExt| {
            dir.join(VersionedFile::new(version, is_base, ext).file_name())
        };
        let target = plan.target();

        for &ext in components(self.domain.engine) {
            require_file(&path_of(base_dir, plan.base, true, ext))?;
            for &delta in &plan.deltas {
                require_file(&path_of(&cache, delta, false, ext))?;
            }
        }

        if plan.deltas.is_empty() {
            // Same version, nothing to rewrite.
            for &ext in components(self.domain.engine) {
                let src = path_of(base_dir, plan.base, true, ext);
                let dst = path_of(work_root, target, true, ext);
                if base_dir == cache.as_path() {
                    move_file(&src, &dst)?;
                } else {
                    std::fs::copy(&src, &dst)?;
                }
            }
            sync_dir(work_root);
            return self.count_records(work_root, target);
        }

        debug!(partition = self.partition, %plan, "merging");
        let records = match self.domain.engine {
            StorageEngineKind::HashIndexed => {
                let opts = HashIndexOptions::for_domain(&self.domain);
                let open = |dir: &Path, version: u32, is_base: bool| {
                    HashIndexReader::open(path_of(dir, version, is_base, FileExt::Index), opts.clone())
                };
                let base = open(base_dir, plan.base, true)?;
                let deltas = plan
                    .deltas
                    .iter()
                    .map(|&d| open(&cache, d, false))
                    .collect::<Result<Vec<_>>>()?;
                let delta_refs: Vec<&HashIndexReader> = deltas.iter().collect();
                let out = path_of(work_root, target, true, FileExt::Index);
                let transformer = self
                    .transformer
                    .as_deref()
                    .map(|t| t as &dyn ValueTransformer);
                hashindex::merge(&base, &delta_refs, &out, transformer)?.num_records
            }
            StorageEngineKind::Blob => {
                let opts = BlobOptions::for_domain(&self.domain);
                let open = |dir: &Path, version: u32, is_base: bool| {
                    BlobReader::open(
                        path_of(dir, version, is_base, FileExt::Index),
                        path_of(dir, version, is_base, FileExt::Records),
                        &opts,
                    )
                };
                let base = open(base_dir, plan.base, true)?;
                let deltas = plan
                    .deltas
                    .iter()
                    .map(|&d| open(&cache, d, false))
                    .collect::<Result<Vec<_>>>()?;
                let summary = blobstore::merge(
                    &base,
                    &deltas,
                    &path_of(work_root, target, true, FileExt::Index),
                    &path_of(work_root, target, true, FileExt::Records),
                    &opts,
                )?;
                summary.num_keys
            }
        };
        Ok(records)
    }

    fn count_records(&self, dir: &Path, version: u32) -> Result<u64> {
        let index = dir.join(VersionedFile::new(version, true, FileExt::Index).file_name());
        let opts = match self.domain.engine {
            StorageEngineKind::HashIndexed => HashIndexOptions::for_domain(&self.domain),
            StorageEngineKind::Blob => BlobOptions::for_domain(&self.domain).index_options(),
        };
        let reader = HashIndexReader::open(index, opts)?;
        reader.iter().try_fold(0u64, |n, entry| entry.map(|_| n + 1))
    }

    /// Deletes live version files of every version other than `keep`.
    fn delete_obsolete_files(&self, keep: u32) -> Result<usize> {
        let mut removed = 0;
        for name in list_files(&self.root)? {
            let obsolete = VersionedFile::parse(&name).map_or(false, |f| f.version != keep);
            if obsolete {
                std::fs::remove_file(self.root.join(&name))?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(partition = self.partition, removed, "obsolete files deleted");
        }
        Ok(removed)
    }

    /// Removes the cache directory and everything in it.
    pub fn clean_cached_versions(&self) -> Result<()> {
        if remove_dir_if_exists(&self.cache_dir())? {
            debug!(partition = self.partition, "cache cleaned");
        }
        Ok(())
    }
}
