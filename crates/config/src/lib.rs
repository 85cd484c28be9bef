//! # Config - FleetKV configuration
//!
//! Typed configuration for a partition server's storage engine, loaded from
//! TOML. Every section and field has a default, so a config file only needs
//! to mention what differs.
//!
//! ```toml
//! [domain]
//! name = "users"
//! num_partitions = 32
//! hasher = "xxh64"
//! engine = "blob"
//!
//! [domain.storage]
//! key_hash_size = 10
//! hash_index_bits = 12
//! compression = "snappy"
//! num_remote_leaf_versions_to_keep = 2
//!
//! [domain.blob]
//! value_cache_capacity = 4096
//!
//! [updater]
//! data_dir = "/var/lib/fleetkv"
//! partition = 3
//! remote = { kind = "local", root = "/mnt/builds/users" }
//! ```
//!
//! Pluggable strategies (hasher, compression codec, engine kind, remote file
//! operations, blob merge strategy) are closed enums: an unknown name fails
//! at parse time.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use codec::{CompressionCodec, KeyHasher};

/// Largest supported `hash_index_bits` (a 2^30-entry footer is 8 GiB).
pub const MAX_HASH_INDEX_BITS: u32 = 30;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub domain: DomainConfig,
    #[serde(default)]
    pub updater: UpdaterConfig,
    /// Inline version metadata. Stands in for the coordination service when
    /// running the partition shell against a local build directory.
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

impl FleetConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: FleetConfig = toml::from_str(s).context("failed to parse config")?;
        cfg.domain.validate()?;
        Ok(cfg)
    }

    /// Reads and parses the TOML file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}

/// Which on-disk store a domain uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageEngineKind {
    /// Fixed-width values in a single hash-indexed file.
    #[default]
    HashIndexed,
    /// Variable-width values: a hash-indexed key file plus a record file.
    Blob,
}

/// Static description of a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    #[serde(default = "default_domain_name")]
    pub name: String,
    #[serde(default)]
    pub id: u32,
    #[serde(default = "default_num_partitions")]
    pub num_partitions: u32,
    #[serde(default)]
    pub hasher: KeyHasher,
    #[serde(default)]
    pub engine: StorageEngineKind,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub blob: BlobConfig,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            name: default_domain_name(),
            id: 0,
            num_partitions: default_num_partitions(),
            hasher: KeyHasher::default(),
            engine: StorageEngineKind::default(),
            storage: StorageConfig::default(),
            blob: BlobConfig::default(),
        }
    }
}

impl DomainConfig {
    /// Rejects configurations no file could be written or read with.
    pub fn validate(&self) -> Result<()> {
        if self.num_partitions == 0 {
            bail!("domain {}: num_partitions must be > 0", self.name);
        }
        self.storage.validate()?;
        if self.engine == StorageEngineKind::Blob {
            self.blob.validate(self.storage.compression)?;
        }
        Ok(())
    }

    /// Width of the values stored in the hash-indexed file of this domain.
    ///
    /// For a blob domain that is the location descriptor width, not the
    /// configured `value_size`.
    #[must_use]
    pub fn index_value_size(&self) -> usize {
        match self.engine {
            StorageEngineKind::HashIndexed => self.storage.value_size,
            StorageEngineKind::Blob => self.blob.location_size(self.storage.compression),
        }
    }
}

/// Storage parameters shared by both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bytes of key hash persisted per record.
    #[serde(default = "default_key_hash_size")]
    pub key_hash_size: usize,
    /// Fixed value width for hash-indexed domains.
    #[serde(default = "default_value_size")]
    pub value_size: usize,
    /// Number of leading key-hash bits used as bucket index.
    #[serde(default = "default_hash_index_bits")]
    pub hash_index_bits: u32,
    #[serde(default)]
    pub compression: CompressionCodec,
    /// Leaf versions whose chains are kept remotely. 0 keeps everything.
    #[serde(default)]
    pub num_remote_leaf_versions_to_keep: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_hash_size: default_key_hash_size(),
            value_size: default_value_size(),
            hash_index_bits: default_hash_index_bits(),
            compression: CompressionCodec::default(),
            num_remote_leaf_versions_to_keep: 0,
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key_hash_size == 0 {
            bail!("key_hash_size must be > 0");
        }
        if self.hash_index_bits > MAX_HASH_INDEX_BITS {
            bail!(
                "hash_index_bits {} exceeds maximum {}",
                self.hash_index_bits,
                MAX_HASH_INDEX_BITS
            );
        }
        if self.hash_index_bits as usize > self.key_hash_size * 8 {
            bail!(
                "hash_index_bits {} is wider than the {}-byte key hash",
                self.hash_index_bits,
                self.key_hash_size
            );
        }
        Ok(())
    }
}

/// How a blob domain merges a base with its deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobMergeStrategy {
    /// Append record files and shift the deltas' locations.
    #[default]
    Concatenate,
    /// Rewrite surviving values into a fresh record file.
    Compact,
}

/// Blob-store specific parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Width of a record-file (or block) offset in a location descriptor.
    #[serde(default = "default_offset_num_bytes")]
    pub offset_num_bytes: usize,
    /// Width of the intra-block offset, block mode only.
    #[serde(default = "default_offset_in_block_num_bytes")]
    pub offset_in_block_num_bytes: usize,
    /// Uncompressed size at which the writer closes a block.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Entries in the decoded-value (L2) cache. 0 disables it.
    #[serde(default)]
    pub value_cache_capacity: usize,
    /// Initial read size for uncompressed record lookups.
    #[serde(default = "default_read_buffer_bytes")]
    pub read_buffer_bytes: usize,
    /// Distinct values remembered for folding duplicates. 0 disables folding.
    #[serde(default)]
    pub value_folding_cache_capacity: usize,
    #[serde(default)]
    pub merge_strategy: BlobMergeStrategy,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            offset_num_bytes: default_offset_num_bytes(),
            offset_in_block_num_bytes: default_offset_in_block_num_bytes(),
            block_size: default_block_size(),
            value_cache_capacity: 0,
            read_buffer_bytes: default_read_buffer_bytes(),
            value_folding_cache_capacity: 0,
            merge_strategy: BlobMergeStrategy::default(),
        }
    }
}

impl BlobConfig {
    pub fn validate(&self, compression: CompressionCodec) -> Result<()> {
        if self.offset_num_bytes == 0 || self.offset_num_bytes > 8 {
            bail!("offset_num_bytes must be in 1..=8, got {}", self.offset_num_bytes);
        }
        if compression.is_block_mode() {
            if self.offset_in_block_num_bytes == 0 || self.offset_in_block_num_bytes > 4 {
                bail!(
                    "offset_in_block_num_bytes must be in 1..=4 with block compression, got {}",
                    self.offset_in_block_num_bytes
                );
            }
            if self.offset_num_bytes + self.offset_in_block_num_bytes > 8 {
                bail!(
                    "location descriptor of {} + {} bytes exceeds 8 bytes",
                    self.offset_num_bytes,
                    self.offset_in_block_num_bytes
                );
            }
            if (self.block_size as u64) >= (1u64 << (8 * self.offset_in_block_num_bytes)) {
                bail!(
                    "block_size {} does not fit in {} intra-block offset bytes",
                    self.block_size,
                    self.offset_in_block_num_bytes
                );
            }
            if self.block_size == 0 {
                bail!("block_size must be > 0");
            }
        }
        if self.read_buffer_bytes == 0 {
            bail!("read_buffer_bytes must be > 0");
        }
        Ok(())
    }

    /// Width of one location descriptor for the given compression mode.
    #[must_use]
    pub fn location_size(&self, compression: CompressionCodec) -> usize {
        if compression.is_block_mode() {
            self.offset_num_bytes + self.offset_in_block_num_bytes
        } else {
            self.offset_num_bytes
        }
    }
}

/// Remote file operations implementation, chosen by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteConfig {
    /// Remote versions live in a directory reachable through the local
    /// filesystem (NFS mount, fuse-mounted object store, test fixtures).
    Local { root: PathBuf },
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig::Local {
            root: PathBuf::from("remote"),
        }
    }
}

/// Where one partition lives locally and where its versions are fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub partition: u32,
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            partition: 0,
            remote: RemoteConfig::default(),
        }
    }
}

impl UpdaterConfig {
    /// Local root of the configured partition: `<data_dir>/<domain>/<partition>`.
    #[must_use]
    pub fn partition_root(&self, domain: &str) -> PathBuf {
        self.data_dir.join(domain).join(self.partition.to_string())
    }
}

/// One row of inline version metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub number: u32,
    /// Close time in milliseconds since the epoch; absent means still open.
    #[serde(default)]
    pub closed_at: Option<u64>,
    #[serde(default)]
    pub defunct: bool,
    #[serde(default)]
    pub is_base: bool,
    #[serde(default)]
    pub parent: Option<u32>,
}

fn default_domain_name() -> String {
    "default".to_string()
}

fn default_num_partitions() -> u32 {
    1
}

fn default_key_hash_size() -> usize {
    10
}

fn default_value_size() -> usize {
    8
}

fn default_hash_index_bits() -> u32 {
    10
}

fn default_offset_num_bytes() -> usize {
    5
}

fn default_offset_in_block_num_bytes() -> usize {
    3
}

fn default_block_size() -> usize {
    64 * 1024
}

fn default_read_buffer_bytes() -> usize {
    256
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
