use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::format::{read_footer, Footer, EMPTY_BUCKET};
use crate::options::HashIndexOptions;

/// Scratch space for reading one chunk.
///
/// Owned by the caller so that repeated lookups (or a full scan) reuse the
/// same allocations instead of growing a new buffer per chunk.
#[derive(Debug, Default)]
pub struct ChunkBuffers {
    compressed: Vec<u8>,
    chunk: Vec<u8>,
}

impl ChunkBuffers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers pre-sized for the largest chunk of `reader`.
    #[must_use]
    pub fn for_reader(reader: &HashIndexReader) -> Self {
        let footer = reader.footer();
        Self {
            compressed: Vec::with_capacity(footer.max_compressed_chunk as usize),
            chunk: Vec::with_capacity(footer.max_uncompressed_chunk as usize),
        }
    }
}

/// Reads a hash-indexed file for point lookups and full scans.
///
/// On [`open`](HashIndexReader::open) only the footer is loaded and
/// validated. Lookups cost one positioned read of a single chunk plus a
/// linear scan inside it. The file handle is shared behind a lock, so a
/// reader can be used from several threads through `&self`.
pub struct HashIndexReader {
    path: PathBuf,
    opts: HashIndexOptions,
    footer: Footer,
    /// Stored length of each bucket's chunk, 0 for empty buckets.
    chunk_lens: Vec<u32>,
    data_len: u64,
    file: Mutex<File>,
}

impl std::fmt::Debug for HashIndexReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashIndexReader")
            .field("path", &self.path)
            .field("buckets", &self.chunk_lens.len())
            .field("data_len", &self.data_len)
            .field("max_uncompressed_chunk", &self.footer.max_uncompressed_chunk)
            .field("max_compressed_chunk", &self.footer.max_compressed_chunk)
            .finish()
    }
}

impl HashIndexReader {
    /// Opens a hash-indexed file and loads its footer.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened, is smaller than the footer, or the
    /// footer is corrupt (offset inversion, offsets outside the data section,
    /// negative or inconsistent chunk sizes).
    pub fn open<P: AsRef<Path>>(path: P, opts: HashIndexOptions) -> Result<Self> {
        opts.validate()?;
        let path = path.as_ref().to_path_buf();
        let mut f = File::open(&path)
            .with_context(|| format!("failed to open hash index {}", path.display()))?;
        let (footer, data_len) = read_footer(&mut f, opts.hash_index_bits)
            .with_context(|| format!("failed to load hash index {}", path.display()))?;
        let chunk_lens = footer.chunk_lengths(data_len);

        debug!(
            path = %path.display(),
            buckets = chunk_lens.len(),
            data_len,
            max_uncompressed = footer.max_uncompressed_chunk,
            max_compressed = footer.max_compressed_chunk,
            "hash index opened"
        );

        Ok(Self {
            path,
            opts,
            footer,
            chunk_lens,
            data_len,
            file: Mutex::new(f),
        })
    }

    /// Point lookup for a raw key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let hash = self.comparable_key(key);
        self.get_by_hash(&hash)
    }

    /// The key hash this file compares against.
    ///
    /// Callers that look the same key up in several files can hash once and
    /// use [`get_by_hash`](HashIndexReader::get_by_hash).
    #[must_use]
    pub fn comparable_key(&self, key: &[u8]) -> Vec<u8> {
        self.opts.hash_key(key)
    }

    /// Point lookup for a precomputed key hash.
    pub fn get_by_hash(&self, key_hash: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut bufs = ChunkBuffers::new();
        self.get_with(key_hash, &mut bufs)
    }

    /// Point lookup reusing caller-owned scratch buffers.
    pub fn get_with(&self, key_hash: &[u8], bufs: &mut ChunkBuffers) -> Result<Option<Vec<u8>>> {
        if key_hash.len() != self.opts.key_hash_size {
            bail!(
                "key hash is {} bytes, expected {}",
                key_hash.len(),
                self.opts.key_hash_size
            );
        }
        let bucket = self.opts.bucket_of(key_hash);
        if self.footer.bucket_offsets[bucket] == EMPTY_BUCKET {
            return Ok(None);
        }

        self.read_chunk(bucket, bufs)?;

        let hash_len = self.opts.key_hash_size;
        for record in bufs.chunk.chunks_exact(self.opts.record_size()) {
            match record[..hash_len].cmp(key_hash) {
                Ordering::Less => continue,
                Ordering::Equal => return Ok(Some(record[hash_len..].to_vec())),
                Ordering::Greater => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Loads bucket `bucket`'s records into `bufs.chunk`.
    fn read_chunk(&self, bucket: usize, bufs: &mut ChunkBuffers) -> Result<()> {
        let offset = self.footer.bucket_offsets[bucket] as u64;
        let len = self.chunk_lens[bucket] as usize;
        let passthrough = self.opts.compression.is_passthrough();

        {
            let target = if passthrough {
                &mut bufs.chunk
            } else {
                &mut bufs.compressed
            };
            target.clear();
            target.resize(len, 0);
            let mut f = self.file.lock();
            f.seek(SeekFrom::Start(offset))?;
            f.read_exact(target).with_context(|| {
                format!("truncated chunk for bucket {} at offset {}", bucket, offset)
            })?;
        }

        if !passthrough {
            self.opts
                .compression
                .decompress_into(&bufs.compressed, &mut bufs.chunk)
                .with_context(|| format!("corrupt chunk for bucket {}", bucket))?;
        }

        if bufs.chunk.len() > self.footer.max_uncompressed_chunk as usize
            || bufs.chunk.len() % self.opts.record_size() != 0
        {
            bail!(
                "corrupt chunk for bucket {}: {} bytes is not a whole number of {}-byte records",
                bucket,
                bufs.chunk.len(),
                self.opts.record_size()
            );
        }
        Ok(())
    }

    /// Iterates over every record in key-hash order.
    #[must_use]
    pub fn iter(&self) -> HashIndexIter<'_> {
        HashIndexIter {
            reader: self,
            next_bucket: 0,
            bufs: ChunkBuffers::for_reader(self),
            pos: 0,
            done: false,
        }
    }

    /// Parsed bucket offsets, in bucket order.
    #[must_use]
    pub fn bucket_offsets(&self) -> &[i64] {
        &self.footer.bucket_offsets
    }

    #[must_use]
    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    #[must_use]
    pub fn options(&self) -> &HashIndexOptions {
        &self.opts
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the data section in bytes.
    #[must_use]
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Returns `true` if the file holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_len == 0
    }
}

/// Full scan over a [`HashIndexReader`], one chunk at a time.
///
/// Yields `(key_hash, value)` in ascending key-hash order. Stops after the
/// first error.
pub struct HashIndexIter<'a> {
    reader: &'a HashIndexReader,
    next_bucket: usize,
    bufs: ChunkBuffers,
    pos: usize,
    done: bool,
}

impl Iterator for HashIndexIter<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let record_size = self.reader.opts.record_size();
        while self.pos >= self.bufs.chunk.len() {
            let buckets = self.reader.chunk_lens.len();
            while self.next_bucket < buckets && self.reader.chunk_lens[self.next_bucket] == 0 {
                self.next_bucket += 1;
            }
            if self.next_bucket >= buckets {
                self.done = true;
                return None;
            }
            let bucket = self.next_bucket;
            self.next_bucket += 1;
            self.pos = 0;
            if let Err(e) = self.reader.read_chunk(bucket, &mut self.bufs) {
                self.done = true;
                return Some(Err(e));
            }
        }

        let record = &self.bufs.chunk[self.pos..self.pos + record_size];
        self.pos += record_size;
        let hash_len = self.reader.opts.key_hash_size;
        Some(Ok((record[..hash_len].to_vec(), record[hash_len..].to_vec())))
    }
}
