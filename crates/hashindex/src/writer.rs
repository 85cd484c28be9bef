use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::format::{Footer, EMPTY_BUCKET};
use crate::options::HashIndexOptions;

/// Counts reported once a file has been written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub num_records: u64,
    /// Bytes in the data section (compressed chunks).
    pub data_bytes: u64,
    /// Total file size including the footer.
    pub file_bytes: u64,
}

/// Returns `<path>.tmp`, the name a file is written under before it is
/// renamed into place.
#[must_use]
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Streams records into a new hash-indexed file.
///
/// Records must arrive in strictly ascending key-hash order; an out-of-order
/// or repeated hash is rejected. Each time the writer enters a new bucket it
/// compresses and writes the previous bucket's records as one chunk, and
/// remembers where the new bucket starts.
///
/// # Crash Safety
///
/// Everything is written to `<path>.tmp`. [`finish`](HashIndexWriter::finish)
/// appends the footer, fsyncs and renames the file into place. A writer that
/// is dropped without finishing deletes its temp file.
pub struct HashIndexWriter {
    opts: HashIndexOptions,
    path: PathBuf,
    tmp_path: PathBuf,
    file: Option<BufWriter<File>>,
    bucket_offsets: Vec<i64>,
    current_bucket: Option<usize>,
    /// Uncompressed records of the current bucket.
    chunk: Vec<u8>,
    last_hash: Option<Vec<u8>>,
    position: u64,
    max_uncompressed: u32,
    max_compressed: u32,
    num_records: u64,
}

impl HashIndexWriter {
    /// Creates `<path>.tmp` and prepares to stream records into it.
    pub fn create<P: AsRef<Path>>(path: P, opts: HashIndexOptions) -> Result<Self> {
        opts.validate()?;
        let path = path.as_ref().to_path_buf();
        let tmp_path = tmp_path_for(&path);
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;

        Ok(Self {
            bucket_offsets: vec![EMPTY_BUCKET; opts.num_buckets()],
            opts,
            path,
            tmp_path,
            file: Some(BufWriter::new(raw)),
            current_bucket: None,
            chunk: Vec::new(),
            last_hash: None,
            position: 0,
            max_uncompressed: 0,
            max_compressed: 0,
            num_records: 0,
        })
    }

    /// Hashes `key` and writes the record.
    pub fn write(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let hash = self.opts.hash_key(key);
        self.write_hash(&hash, value)
    }

    /// Writes a record for an already computed key hash.
    pub fn write_hash(&mut self, key_hash: &[u8], value: &[u8]) -> Result<()> {
        if key_hash.len() != self.opts.key_hash_size {
            bail!(
                "key hash is {} bytes, expected {}",
                key_hash.len(),
                self.opts.key_hash_size
            );
        }
        if value.len() != self.opts.value_size {
            bail!("value is {} bytes, expected {}", value.len(), self.opts.value_size);
        }
        if let Some(last) = &self.last_hash {
            if key_hash <= last.as_slice() {
                bail!(
                    "records must be written in strictly ascending key-hash order \
                     (got {:02x?} after {:02x?})",
                    key_hash,
                    last
                );
            }
        }

        let bucket = self.opts.bucket_of(key_hash);
        if self.current_bucket != Some(bucket) {
            self.flush_chunk()?;
            self.bucket_offsets[bucket] = self.position as i64;
            self.current_bucket = Some(bucket);
        }

        self.chunk.extend_from_slice(key_hash);
        self.chunk.extend_from_slice(value);
        match &mut self.last_hash {
            Some(last) => last.copy_from_slice(key_hash),
            None => self.last_hash = Some(key_hash.to_vec()),
        }
        self.num_records += 1;
        Ok(())
    }

    /// Number of records written so far.
    #[must_use]
    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    #[must_use]
    pub fn options(&self) -> &HashIndexOptions {
        &self.opts
    }

    /// Compresses and writes the pending bucket, if any.
    fn flush_chunk(&mut self) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        let file = match self.file.as_mut() {
            Some(f) => f,
            None => bail!("writer already finished"),
        };

        let uncompressed_len = self.chunk.len();
        let compressed_len = if self.opts.compression.is_passthrough() {
            file.write_all(&self.chunk)?;
            uncompressed_len
        } else {
            let packed = self.opts.compression.compress(&self.chunk)?;
            file.write_all(&packed)?;
            packed.len()
        };

        self.max_uncompressed = self.max_uncompressed.max(chunk_size(uncompressed_len)?);
        self.max_compressed = self.max_compressed.max(chunk_size(compressed_len)?);
        self.position += compressed_len as u64;
        self.chunk.clear();
        Ok(())
    }

    /// Writes the last chunk and the footer, then atomically moves the file
    /// to its final path.
    pub fn finish(mut self) -> Result<WriteSummary> {
        self.flush_chunk()?;
        let mut file = match self.file.take() {
            Some(f) => f,
            None => bail!("writer already finished"),
        };

        let footer = Footer {
            bucket_offsets: std::mem::take(&mut self.bucket_offsets),
            max_uncompressed_chunk: self.max_uncompressed,
            max_compressed_chunk: self.max_compressed,
        };
        footer.write_to(&mut file)?;

        file.flush()?;
        file.into_inner()?.sync_all()?;
        rename(&self.tmp_path, &self.path)
            .with_context(|| format!("failed to move {} into place", self.path.display()))?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        let summary = WriteSummary {
            num_records: self.num_records,
            data_bytes: self.position,
            file_bytes: self.position + self.opts.footer_size(),
        };
        debug!(
            path = %self.path.display(),
            records = summary.num_records,
            bytes = summary.file_bytes,
            "hash index written"
        );
        Ok(summary)
    }
}

fn chunk_size(len: usize) -> Result<u32> {
    match u32::try_from(len) {
        Ok(n) if n <= i32::MAX as u32 => Ok(n),
        _ => bail!("chunk of {} bytes is too large for the footer", len),
    }
}

impl Drop for HashIndexWriter {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}
