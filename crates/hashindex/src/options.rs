use anyhow::{bail, Result};
use codec::{CompressionCodec, KeyHasher};
use config::{DomainConfig, MAX_HASH_INDEX_BITS};

use crate::format::footer_size;

/// Shape of a hash-indexed file. Not stored in the file: writer and reader
/// must be given the same options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashIndexOptions {
    pub key_hash_size: usize,
    pub value_size: usize,
    pub hash_index_bits: u32,
    pub compression: CompressionCodec,
    pub hasher: KeyHasher,
}

impl HashIndexOptions {
    /// Options with no compression and the default hasher.
    #[must_use]
    pub fn new(key_hash_size: usize, value_size: usize, hash_index_bits: u32) -> Self {
        Self {
            key_hash_size,
            value_size,
            hash_index_bits,
            compression: CompressionCodec::None,
            hasher: KeyHasher::default(),
        }
    }

    #[must_use]
    pub fn with_compression(mut self, compression: CompressionCodec) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: KeyHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Options for the hash-indexed file of `domain`.
    ///
    /// For blob domains the value is the location descriptor.
    #[must_use]
    pub fn for_domain(domain: &DomainConfig) -> Self {
        Self {
            key_hash_size: domain.storage.key_hash_size,
            value_size: domain.index_value_size(),
            hash_index_bits: domain.storage.hash_index_bits,
            compression: domain.storage.compression,
            hasher: domain.hasher,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_hash_size == 0 {
            bail!("key_hash_size must be > 0");
        }
        if self.hash_index_bits > MAX_HASH_INDEX_BITS {
            bail!("hash_index_bits {} exceeds {}", self.hash_index_bits, MAX_HASH_INDEX_BITS);
        }
        if self.hash_index_bits as usize > self.key_hash_size * 8 {
            bail!(
                "hash_index_bits {} wider than {}-byte key hash",
                self.hash_index_bits,
                self.key_hash_size
            );
        }
        Ok(())
    }

    /// Bytes per record: key hash plus value.
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.key_hash_size + self.value_size
    }

    #[must_use]
    pub fn num_buckets(&self) -> usize {
        1usize << self.hash_index_bits
    }

    #[must_use]
    pub fn footer_size(&self) -> u64 {
        footer_size(self.hash_index_bits)
    }

    /// Hashes `key` to its fixed-width key hash.
    #[must_use]
    pub fn hash_key(&self, key: &[u8]) -> Vec<u8> {
        self.hasher.hash(key, self.key_hash_size)
    }

    /// Bucket of a key hash: its leading `hash_index_bits` bits.
    #[must_use]
    pub fn bucket_of(&self, key_hash: &[u8]) -> usize {
        if self.hash_index_bits == 0 {
            return 0;
        }
        let mut prefix = [0u8; 8];
        let n = key_hash.len().min(8);
        prefix[..n].copy_from_slice(&key_hash[..n]);
        (u64::from_be_bytes(prefix) >> (64 - self.hash_index_bits)) as usize
    }
}
