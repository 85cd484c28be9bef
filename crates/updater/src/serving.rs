use anyhow::Result;
use blobstore::{BlobOptions, BlobReader, BlobReaderStats};
use config::{DomainConfig, StorageEngineKind};
use hashindex::{HashIndexOptions, HashIndexReader};
use std::path::Path;

use crate::naming::{detect_current_version, list_files, FileExt, VersionedFile};

enum Store {
    HashIndexed(HashIndexReader),
    Blob(BlobReader),
}

/// Read-only view of a partition's current version.
///
/// Keeps its files open, so it keeps answering from the version it was
/// opened at even after an update commits; reopen to pick up the new one.
pub struct PartitionReader {
    version: u32,
    store: Store,
}

impl PartitionReader {
    /// Opens the current version under `root`, or `None` if the partition
    /// holds no complete base.
    pub fn open(domain: &DomainConfig, root: &Path) -> Result<Option<Self>> {
        let version = match detect_current_version(list_files(root)?, domain.engine) {
            Some(v) => v,
            None => return Ok(None),
        };
        let path = |ext| root.join(VersionedFile::new(version, true, ext).file_name());
        let store = match domain.engine {
            StorageEngineKind::HashIndexed => Store::HashIndexed(HashIndexReader::open(
                path(FileExt::Index),
                HashIndexOptions::for_domain(domain),
            )?),
            StorageEngineKind::Blob => Store::Blob(BlobReader::open(
                path(FileExt::Index),
                path(FileExt::Records),
                &BlobOptions::for_domain(domain),
            )?),
        };
        Ok(Some(Self { version, store }))
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match &self.store {
            Store::HashIndexed(r) => r.get(key),
            Store::Blob(r) => Ok(r.get(key)?.value),
        }
    }

    /// Blob reader counters; `None` for hash-indexed domains.
    #[must_use]
    pub fn blob_stats(&self) -> Option<BlobReaderStats> {
        match &self.store {
            Store::HashIndexed(_) => None,
            Store::Blob(r) => Some(r.stats()),
        }
    }
}
