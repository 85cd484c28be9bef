use anyhow::{bail, Context, Result};
use codec::{varint, CompressionCodec};
use hashindex::HashIndexReader;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::cache::ValueCache;
use crate::location::{Location, LocationCodec};
use crate::options::BlobOptions;

/// How the decoded-value (L2) cache took part in a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Cache disabled, or the key was not in the index.
    Bypassed,
    Hit,
    Miss,
}

/// Result of a blob lookup.
///
/// Carries the L2 cache outcome so a serving layer with its own cache can
/// account hits at both levels separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub value: Option<Vec<u8>>,
    pub cache: CacheOutcome,
}

impl ReadResult {
    fn not_found() -> Self {
        Self {
            value: None,
            cache: CacheOutcome::Bypassed,
        }
    }

    #[must_use]
    pub fn is_found(&self) -> bool {
        self.value.is_some()
    }

    #[must_use]
    pub fn is_l2_hit(&self) -> bool {
        self.cache == CacheOutcome::Hit
    }

    #[must_use]
    pub fn is_l2_miss(&self) -> bool {
        self.cache == CacheOutcome::Miss
    }
}

/// Snapshot of a reader's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobReaderStats {
    pub l2_hits: u64,
    pub l2_misses: u64,
    /// Block lookups served by the last decompressed block.
    pub block_cache_hits: u64,
    /// Blocks read from disk and decompressed.
    pub block_reads: u64,
}

#[derive(Default)]
struct Counters {
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    block_cache_hits: AtomicU64,
    block_reads: AtomicU64,
}

/// Reads values from a blob store's key index and record file.
///
/// Safe to share between threads. The record file handle, the last
/// decompressed block and the value cache each sit behind their own lock
/// owned by this instance.
pub struct BlobReader {
    index: HashIndexReader,
    records_path: PathBuf,
    records: Mutex<File>,
    records_len: u64,
    locations: LocationCodec,
    compression: CompressionCodec,
    read_buffer_bytes: usize,
    /// `(block offset, decompressed block)` of the most recent block read.
    last_block: Mutex<Option<(u64, Vec<u8>)>>,
    values: ValueCache,
    counters: Counters,
}

impl std::fmt::Debug for BlobReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReader")
            .field("index", &self.index)
            .field("records_path", &self.records_path)
            .field("records_len", &self.records_len)
            .field("compression", &self.compression)
            .finish()
    }
}

impl BlobReader {
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        index_path: P,
        records_path: Q,
        opts: &BlobOptions,
    ) -> Result<Self> {
        opts.validate()?;
        let index = HashIndexReader::open(index_path, opts.index_options())?;
        let records_path = records_path.as_ref().to_path_buf();
        let file = File::open(&records_path)
            .with_context(|| format!("failed to open record file {}", records_path.display()))?;
        let records_len = file.metadata()?.len();

        debug!(
            path = %records_path.display(),
            records_len,
            compression = opts.compression.name(),
            value_cache = opts.blob.value_cache_capacity,
            "blob store opened"
        );

        Ok(Self {
            index,
            records_path,
            records: Mutex::new(file),
            records_len,
            locations: opts.location_codec(),
            compression: opts.compression,
            read_buffer_bytes: opts.blob.read_buffer_bytes,
            last_block: Mutex::new(None),
            values: ValueCache::new(opts.blob.value_cache_capacity),
            counters: Counters::default(),
        })
    }

    pub fn get(&self, key: &[u8]) -> Result<ReadResult> {
        let hash = self.index.comparable_key(key);
        self.get_by_hash(&hash)
    }

    #[must_use]
    pub fn comparable_key(&self, key: &[u8]) -> Vec<u8> {
        self.index.comparable_key(key)
    }

    pub fn get_by_hash(&self, key_hash: &[u8]) -> Result<ReadResult> {
        let location = match self.index.get_by_hash(key_hash)? {
            Some(l) => l,
            None => return Ok(ReadResult::not_found()),
        };

        if !self.values.is_enabled() {
            return Ok(ReadResult {
                value: Some(self.value_at(&location)?),
                cache: CacheOutcome::Bypassed,
            });
        }
        if let Some(value) = self.values.get(&location) {
            self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(ReadResult {
                value: Some(value),
                cache: CacheOutcome::Hit,
            });
        }
        self.counters.l2_misses.fetch_add(1, Ordering::Relaxed);
        let value = self.value_at(&location)?;
        self.values.insert(&location, &value);
        Ok(ReadResult {
            value: Some(value),
            cache: CacheOutcome::Miss,
        })
    }

    /// Decodes the value stored at an encoded location descriptor.
    pub fn value_at(&self, location: &[u8]) -> Result<Vec<u8>> {
        match self.locations.decode(location)? {
            Location::Flat(offset) => self.read_flat(offset),
            Location::InBlock { block, offset } => self.read_in_block(block, offset as usize),
        }
    }

    /// Reads a length-prefixed record from a flat record file.
    ///
    /// The first read fetches `read_buffer_bytes`; if the declared length
    /// does not fit, the buffer grows by at least 10% (or to the declared
    /// size) and the read is repeated.
    fn read_flat(&self, offset: u64) -> Result<Vec<u8>> {
        if offset >= self.records_len {
            bail!(
                "record offset {} is outside {} ({} bytes)",
                offset,
                self.records_path.display(),
                self.records_len
            );
        }
        let available = (self.records_len - offset) as usize;
        let mut want = self.read_buffer_bytes.min(available);
        let mut buf = Vec::new();
        loop {
            self.read_at(offset, want, &mut buf)?;
            match varint::decode_u64(&buf)? {
                Some((len, header)) => {
                    let end = header as u64 + len;
                    if end <= buf.len() as u64 {
                        buf.truncate(end as usize);
                        buf.drain(..header);
                        return Ok(buf);
                    }
                    if end > available as u64 {
                        bail!(
                            "record at offset {} declares {} bytes but only {} remain",
                            offset,
                            len,
                            available - header
                        );
                    }
                    want = grow(want, end as usize).min(available);
                }
                None if want < available => want = grow(want, want + 1).min(available),
                None => bail!("truncated record length at offset {}", offset),
            }
        }
    }

    fn read_in_block(&self, block: u64, offset: usize) -> Result<Vec<u8>> {
        let mut last = self.last_block.lock();
        let cached = matches!(last.as_ref(), Some((at, _)) if *at == block);
        if cached {
            self.counters.block_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            let data = self.load_block(block)?;
            self.counters.block_reads.fetch_add(1, Ordering::Relaxed);
            *last = Some((block, data));
        }
        let data = match last.as_ref() {
            Some((_, data)) => data,
            None => bail!("block cache unexpectedly empty"),
        };

        if offset >= data.len() {
            bail!(
                "offset {} is outside the {}-byte block at {}",
                offset,
                data.len(),
                block
            );
        }
        let (len, header) = match varint::decode_u64(&data[offset..])? {
            Some(v) => v,
            None => bail!("truncated record length in block at {}", block),
        };
        let start = offset + header;
        let end = start as u64 + len;
        if end > data.len() as u64 {
            bail!(
                "record in block at {} declares {} bytes past the block end",
                block,
                len
            );
        }
        Ok(data[start..end as usize].to_vec())
    }

    /// Reads and decompresses the block framed at `block`.
    fn load_block(&self, block: u64) -> Result<Vec<u8>> {
        if block >= self.records_len {
            bail!(
                "block offset {} is outside {} ({} bytes)",
                block,
                self.records_path.display(),
                self.records_len
            );
        }
        let available = (self.records_len - block) as usize;
        let mut header = Vec::new();
        self.read_at(block, varint::MAX_VARINT_BYTES.min(available), &mut header)?;
        let (compressed_len, header_len) = match varint::decode_u64(&header)? {
            Some(v) => v,
            None => bail!("truncated block frame at {}", block),
        };
        if header_len as u64 + compressed_len > available as u64 {
            bail!(
                "block at {} declares {} bytes but only {} remain",
                block,
                compressed_len,
                available - header_len
            );
        }

        let mut compressed = Vec::new();
        self.read_at(block + header_len as u64, compressed_len as usize, &mut compressed)?;
        let mut data = Vec::new();
        self.compression
            .decompress_into(&compressed, &mut data)
            .with_context(|| format!("corrupt block at {} in {}", block, self.records_path.display()))?;
        Ok(data)
    }

    fn read_at(&self, offset: u64, len: usize, buf: &mut Vec<u8>) -> Result<()> {
        buf.clear();
        buf.resize(len, 0);
        let mut f = self.records.lock();
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(buf)
            .with_context(|| format!("short read at {} in {}", offset, self.records_path.display()))?;
        Ok(())
    }

    /// Every `(key_hash, value)` pair in key-hash order.
    pub fn iter(&self) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_ {
        self.index.iter().map(move |entry| {
            let (hash, location) = entry?;
            let value = self.value_at(&location)?;
            Ok((hash, value))
        })
    }

    #[must_use]
    pub fn stats(&self) -> BlobReaderStats {
        BlobReaderStats {
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            l2_misses: self.counters.l2_misses.load(Ordering::Relaxed),
            block_cache_hits: self.counters.block_cache_hits.load(Ordering::Relaxed),
            block_reads: self.counters.block_reads.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn value_cache(&self) -> &ValueCache {
        &self.values
    }

    /// The key index, for merging and diagnostics.
    #[must_use]
    pub fn index(&self) -> &HashIndexReader {
        &self.index
    }

    #[must_use]
    pub fn records_path(&self) -> &Path {
        &self.records_path
    }

    /// Size of the record file in bytes.
    #[must_use]
    pub fn records_len(&self) -> u64 {
        self.records_len
    }
}

/// Next read size: at least 10% larger than `current`, and at least `needed`.
fn grow(current: usize, needed: usize) -> usize {
    let step = (current / 10).max(1);
    needed.max(current + step)
}
