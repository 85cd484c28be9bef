mod fsops_tests;

use crate::*;
use anyhow::Result;
use blobstore::{BlobOptions, BlobWriter};
use codec::sort_by_key_hash;
use config::{DomainConfig, StorageConfig, StorageEngineKind};
use hashindex::{HashIndexOptions, HashIndexWriter};
use planner::{DomainVersion, VersionGraph};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) fn hash_domain() -> DomainConfig {
    DomainConfig {
        name: "users".to_string(),
        num_partitions: 2,
        storage: StorageConfig {
            key_hash_size: 8,
            value_size: 4,
            hash_index_bits: 4,
            ..StorageConfig::default()
        },
        ..DomainConfig::default()
    }
}

pub(crate) fn blob_domain() -> DomainConfig {
    DomainConfig {
        engine: StorageEngineKind::Blob,
        ..hash_domain()
    }
}

/// v0 (base) <- v1 <- v2
pub(crate) fn chain() -> VersionGraph {
    [
        DomainVersion::base(0, 10),
        DomainVersion::delta(1, 0, 11),
        DomainVersion::delta(2, 1, 12),
    ]
    .into_iter()
    .collect()
}

pub(crate) fn val(n: u32) -> Vec<u8> {
    n.to_le_bytes().to_vec()
}

/// Writes a hash-indexed file for `domain` holding `entries`.
pub(crate) fn write_hidx(path: &Path, domain: &DomainConfig, entries: &[(&str, u32)]) -> Result<()> {
    let opts = HashIndexOptions::for_domain(domain);
    let mut sorted: Vec<(Vec<u8>, Vec<u8>)> = entries
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), val(*v)))
        .collect();
    sort_by_key_hash(opts.hasher, opts.key_hash_size, &mut sorted);
    let mut w = HashIndexWriter::create(path, opts)?;
    for (k, v) in &sorted {
        w.write(k, v)?;
    }
    w.finish()?;
    Ok(())
}

/// Writes both files of a blob version into `dir`.
pub(crate) fn write_blob(
    dir: &Path,
    version: u32,
    is_base: bool,
    domain: &DomainConfig,
    entries: &[(&str, &str)],
) -> Result<()> {
    let opts = BlobOptions::for_domain(domain);
    let mut sorted: Vec<(Vec<u8>, Vec<u8>)> = entries
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect();
    sort_by_key_hash(opts.hasher, opts.key_hash_size, &mut sorted);
    let name = |ext| dir.join(naming::VersionedFile::new(version, is_base, ext).file_name());
    let mut w = BlobWriter::create(
        name(naming::FileExt::Index),
        name(naming::FileExt::Records),
        opts,
    )?;
    for (k, v) in &sorted {
        w.write(k, v)?;
    }
    w.finish()?;
    Ok(())
}

/// Remote layout for `chain()` in partition 0 of a hash-indexed domain.
pub(crate) fn hash_remote(remote_root: &Path, domain: &DomainConfig) -> Result<PathBuf> {
    let dir = remote_root.join("0");
    std::fs::create_dir_all(&dir)?;
    write_hidx(&dir.join("00000.base.hidx"), domain, &[("a", 0), ("b", 0), ("c", 0)])?;
    write_hidx(&dir.join("00001.delta.hidx"), domain, &[("b", 1), ("d", 1)])?;
    write_hidx(&dir.join("00002.delta.hidx"), domain, &[("c", 2), ("e", 2)])?;
    Ok(dir)
}

pub(crate) fn updater(domain: DomainConfig, local: &Path, remote_root: &Path) -> PartitionUpdater {
    PartitionUpdater::new(domain, 0, local, Arc::new(LocalFileOps::new(remote_root)))
}

/// Names of everything directly inside `dir`, files and directories.
pub(crate) fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

/// File names of every component of one version.
pub(crate) fn version_file_names(version: u32, is_base: bool, engine: StorageEngineKind) -> Vec<String> {
    naming::components(engine)
        .iter()
        .map(|&ext| naming::VersionedFile::new(version, is_base, ext).file_name())
        .collect()
}
