use anyhow::{bail, Context, Result};
use codec::varint;
use hashindex::{tmp_path_for, HashIndexWriter, WriteSummary};
use lru::LruCache;
use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::location::{Location, LocationCodec};
use crate::options::BlobOptions;

/// Counts reported once both files have been written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobWriteSummary {
    /// Keys written to the key index.
    pub num_keys: u64,
    /// Records physically stored in the record file.
    pub num_records: u64,
    /// Keys that reused an existing record through value folding.
    pub num_folded: u64,
    /// Size of the record file.
    pub record_bytes: u64,
    pub index: WriteSummary,
}

/// Streams key/value pairs into a key index and a record file.
///
/// Keys must arrive in strictly ascending key-hash order (the key index
/// rejects anything else). Values are appended to the record file as
/// `[varint length][bytes]`. In block mode records accumulate in an
/// uncompressed block that is compressed and framed as
/// `[varint compressed length][compressed bytes]` once it reaches
/// `block_size`.
///
/// With value folding enabled, a value equal to one written recently (within
/// the folding cache capacity) is not stored again: the new key points at the
/// existing record.
///
/// Both files are written under `.tmp` names and renamed into place by
/// [`finish`](BlobWriter::finish).
pub struct BlobWriter {
    index: Option<HashIndexWriter>,
    records_path: PathBuf,
    records_tmp: PathBuf,
    records: Option<BufWriter<File>>,
    locations: LocationCodec,
    opts: BlobOptions,
    position: u64,
    /// Pending uncompressed block (block mode only).
    block: Vec<u8>,
    folding: Option<LruCache<Vec<u8>, Vec<u8>>>,
    location_buf: Vec<u8>,
    num_keys: u64,
    num_records: u64,
    num_folded: u64,
}

impl BlobWriter {
    pub fn create<P: AsRef<Path>, Q: AsRef<Path>>(
        index_path: P,
        records_path: Q,
        opts: BlobOptions,
    ) -> Result<Self> {
        opts.validate()?;
        let records_path = records_path.as_ref().to_path_buf();
        let records_tmp = tmp_path_for(&records_path);
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&records_tmp)
            .with_context(|| format!("failed to create {}", records_tmp.display()))?;
        let index = HashIndexWriter::create(index_path, opts.index_options())?;
        let locations = opts.location_codec();

        Ok(Self {
            index: Some(index),
            records_path,
            records_tmp,
            records: Some(BufWriter::new(raw)),
            location_buf: vec![0u8; locations.size()],
            locations,
            folding: NonZeroUsize::new(opts.blob.value_folding_cache_capacity).map(LruCache::new),
            block: Vec::new(),
            opts,
            position: 0,
            num_keys: 0,
            num_records: 0,
            num_folded: 0,
        })
    }

    /// Hashes `key` and writes the pair.
    pub fn write(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let hash = self.opts.hasher.hash(key, self.opts.key_hash_size);
        self.write_hash(&hash, value)
    }

    /// Writes a value for an already computed key hash.
    pub fn write_hash(&mut self, key_hash: &[u8], value: &[u8]) -> Result<()> {
        let index = match self.index.as_mut() {
            Some(i) => i,
            None => bail!("writer already finished"),
        };
        if let Some(folded) = self.folding.as_mut().and_then(|f| f.get(value)) {
            self.location_buf.copy_from_slice(folded);
            index.write_hash(key_hash, &self.location_buf)?;
            self.num_keys += 1;
            self.num_folded += 1;
            return Ok(());
        }

        let location = if self.locations.is_block_mode() {
            Location::InBlock {
                block: self.position,
                offset: self.block.len() as u32,
            }
        } else {
            Location::Flat(self.position)
        };
        self.locations.encode(location, &mut self.location_buf)?;
        // Index first: an out-of-order key must not leave an orphan record.
        index.write_hash(key_hash, &self.location_buf)?;
        self.append_record(value)?;

        if let Some(folding) = self.folding.as_mut() {
            folding.put(value.to_vec(), self.location_buf.clone());
        }
        self.num_keys += 1;
        self.num_records += 1;
        Ok(())
    }

    fn append_record(&mut self, value: &[u8]) -> Result<()> {
        if self.locations.is_block_mode() {
            varint::encode_u64(value.len() as u64, &mut self.block);
            self.block.extend_from_slice(value);
            if self.block.len() >= self.opts.blob.block_size {
                self.flush_block()?;
            }
            return Ok(());
        }

        let records = match self.records.as_mut() {
            Some(r) => r,
            None => bail!("writer already finished"),
        };
        let n = varint::write_u64(records, value.len() as u64)?;
        records.write_all(value)?;
        self.position += (n + value.len()) as u64;
        Ok(())
    }

    /// Compresses and frames the pending block.
    fn flush_block(&mut self) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let records = match self.records.as_mut() {
            Some(r) => r,
            None => bail!("writer already finished"),
        };
        let packed = self.opts.compression.compress(&self.block)?;
        let n = varint::write_u64(records, packed.len() as u64)?;
        records.write_all(&packed)?;
        self.position += (n + packed.len()) as u64;
        self.block.clear();
        Ok(())
    }

    /// Keys written so far, folded ones included.
    #[must_use]
    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    #[must_use]
    pub fn options(&self) -> &BlobOptions {
        &self.opts
    }

    /// Flushes the last block, then moves the record file and the key index
    /// into place.
    pub fn finish(mut self) -> Result<BlobWriteSummary> {
        self.flush_block()?;
        let records = match self.records.take() {
            Some(r) => r,
            None => bail!("writer already finished"),
        };
        let file = records
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("failed to flush {}", self.records_tmp.display()))?;
        file.sync_all()?;
        drop(file);

        rename(&self.records_tmp, &self.records_path)
            .with_context(|| format!("failed to move {} into place", self.records_path.display()))?;

        let index = match self.index.take() {
            Some(i) => i,
            None => bail!("writer already finished"),
        };
        let index_summary = match index.finish() {
            Ok(s) => s,
            Err(e) => {
                let _ = std::fs::remove_file(&self.records_path);
                return Err(e);
            }
        };

        let summary = BlobWriteSummary {
            num_keys: self.num_keys,
            num_records: self.num_records,
            num_folded: self.num_folded,
            record_bytes: self.position,
            index: index_summary,
        };
        debug!(
            path = %self.records_path.display(),
            keys = summary.num_keys,
            records = summary.num_records,
            folded = summary.num_folded,
            bytes = summary.record_bytes,
            "blob store written"
        );
        Ok(summary)
    }
}

impl Drop for BlobWriter {
    fn drop(&mut self) {
        if self.records.take().is_some() {
            let _ = std::fs::remove_file(&self.records_tmp);
        }
    }
}
