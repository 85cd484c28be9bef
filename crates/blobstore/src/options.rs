use anyhow::Result;
use codec::{CompressionCodec, KeyHasher};
use config::{BlobConfig, DomainConfig};
use hashindex::HashIndexOptions;

use crate::location::LocationCodec;

/// Shape of a blob store's two files.
///
/// Like [`HashIndexOptions`], nothing here is stored in the files; writer,
/// reader and merger must agree on it.
#[derive(Debug, Clone)]
pub struct BlobOptions {
    pub key_hash_size: usize,
    pub hash_index_bits: u32,
    pub hasher: KeyHasher,
    /// `None` writes a flat record file; anything else groups records into
    /// framed blocks compressed with this codec.
    pub compression: CompressionCodec,
    pub blob: BlobConfig,
}

impl BlobOptions {
    /// Flat record file, default hasher and blob settings.
    #[must_use]
    pub fn new(key_hash_size: usize, hash_index_bits: u32) -> Self {
        Self {
            key_hash_size,
            hash_index_bits,
            hasher: KeyHasher::default(),
            compression: CompressionCodec::None,
            blob: BlobConfig::default(),
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

    #[must_use]
    pub fn with_blob(mut self, blob: BlobConfig) -> Self {
        self.blob = blob;
        self
    }

    #[must_use]
    pub fn for_domain(domain: &DomainConfig) -> Self {
        Self {
            key_hash_size: domain.storage.key_hash_size,
            hash_index_bits: domain.storage.hash_index_bits,
            hasher: domain.hasher,
            compression: domain.storage.compression,
            blob: domain.blob.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.blob.validate(self.compression)?;
        self.index_options().validate()
    }

    /// Options of the key index: the value is a location descriptor.
    ///
    /// The key index keeps the codec's chunk compression; in block mode that
    /// means both files are compressed.
    #[must_use]
    pub fn index_options(&self) -> HashIndexOptions {
        HashIndexOptions::new(
            self.key_hash_size,
            self.blob.location_size(self.compression),
            self.hash_index_bits,
        )
        .with_compression(self.compression)
        .with_hasher(self.hasher)
    }

    #[must_use]
    pub fn location_codec(&self) -> LocationCodec {
        if self.compression.is_block_mode() {
            LocationCodec::block(self.blob.offset_num_bytes, self.blob.offset_in_block_num_bytes)
        } else {
            LocationCodec::flat(self.blob.offset_num_bytes)
        }
    }
}
