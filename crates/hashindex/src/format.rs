//! Footer layout, read/write helpers and load-time validation.
//!
//! ```text
//! [bucket_offset: i64 LE] x 2^hash_index_bits
//! [max_uncompressed_chunk: i32 LE]
//! [max_compressed_chunk: i32 LE]
//! ```
//!
//! A footer is only accepted if every offset is `-1` or inside the data
//! section, non-empty offsets never decrease in bucket order, and every chunk
//! fits within the recorded maximum compressed size. Anything else is a load
//! error; a reader is never handed a partially trustworthy index.

use anyhow::{bail, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Bucket offset marking a bucket with no records.
pub const EMPTY_BUCKET: i64 = -1;

/// Size of the two chunk-size fields after the offset table.
pub const FOOTER_TRAILER_BYTES: u64 = 4 + 4;

/// Total footer size for a given number of index bits.
#[must_use]
pub fn footer_size(hash_index_bits: u32) -> u64 {
    (1u64 << hash_index_bits) * 8 + FOOTER_TRAILER_BYTES
}

/// Parsed footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    /// Byte offset of each bucket's chunk, or [`EMPTY_BUCKET`].
    pub bucket_offsets: Vec<i64>,
    /// Largest chunk after decompression; sizes the decompression buffer.
    pub max_uncompressed_chunk: u32,
    /// Largest chunk as stored; sizes the read buffer.
    pub max_compressed_chunk: u32,
}

impl Footer {
    /// Writes the footer to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for &offset in &self.bucket_offsets {
            w.write_i64::<LittleEndian>(offset)?;
        }
        w.write_i32::<LittleEndian>(size_field(self.max_uncompressed_chunk)?)?;
        w.write_i32::<LittleEndian>(size_field(self.max_compressed_chunk)?)?;
        Ok(())
    }

    /// Stored length of every bucket's chunk (0 for empty buckets).
    ///
    /// Assumes the footer was validated against `data_len`.
    #[must_use]
    pub fn chunk_lengths(&self, data_len: u64) -> Vec<u32> {
        let mut lens = vec![0u32; self.bucket_offsets.len()];
        let mut end = data_len;
        for (i, &offset) in self.bucket_offsets.iter().enumerate().rev() {
            if offset == EMPTY_BUCKET {
                continue;
            }
            lens[i] = (end - offset as u64) as u32;
            end = offset as u64;
        }
        lens
    }

    /// Checks the footer against the size of the data section it indexes.
    pub fn validate(&self, data_len: u64) -> Result<()> {
        let mut previous: Option<(usize, u64)> = None;
        for (bucket, &offset) in self.bucket_offsets.iter().enumerate() {
            if offset == EMPTY_BUCKET {
                continue;
            }
            if offset < 0 {
                bail!("corrupt footer: bucket {} has negative offset {}", bucket, offset);
            }
            let offset = offset as u64;
            if offset >= data_len {
                bail!(
                    "corrupt footer: bucket {} offset {} is outside the {}-byte data section",
                    bucket,
                    offset,
                    data_len
                );
            }
            match previous {
                None if offset != 0 => {
                    bail!("corrupt footer: first non-empty bucket {} starts at {}, not 0", bucket, offset);
                }
                Some((prev_bucket, prev_offset)) => {
                    if offset < prev_offset {
                        bail!(
                            "corrupt footer: bucket offsets are not non-decreasing \
                             (bucket {} at {} precedes bucket {} at {})",
                            prev_bucket,
                            prev_offset,
                            bucket,
                            offset
                        );
                    }
                    self.check_chunk(prev_bucket, offset - prev_offset)?;
                }
                None => {}
            }
            previous = Some((bucket, offset));
        }

        match previous {
            Some((bucket, offset)) => self.check_chunk(bucket, data_len - offset)?,
            None if data_len > 0 => {
                bail!("corrupt footer: {} data bytes but every bucket is empty", data_len);
            }
            None => {}
        }
        Ok(())
    }

    fn check_chunk(&self, bucket: usize, len: u64) -> Result<()> {
        if len == 0 || len > u64::from(self.max_compressed_chunk) {
            bail!(
                "corrupt footer: bucket {} has a {}-byte chunk (recorded maximum {})",
                bucket,
                len,
                self.max_compressed_chunk
            );
        }
        Ok(())
    }
}

fn size_field(size: u32) -> io::Result<i32> {
    i32::try_from(size).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("chunk size {} does not fit the footer size field", size),
        )
    })
}

/// Reads and validates the footer of a hash-indexed file.
///
/// Returns the footer and the length of the data section that precedes it.
pub fn read_footer<R: Read + Seek>(r: &mut R, hash_index_bits: u32) -> Result<(Footer, u64)> {
    let filesize = r.seek(SeekFrom::End(0))?;
    let footer_len = footer_size(hash_index_bits);
    if filesize < footer_len {
        bail!(
            "file too small for hash index footer: {} bytes, footer needs {}",
            filesize,
            footer_len
        );
    }
    let data_len = filesize - footer_len;
    r.seek(SeekFrom::Start(data_len))?;

    let mut raw = vec![0u8; footer_len as usize];
    r.read_exact(&mut raw)?;
    let mut cursor = raw.as_slice();

    let num_buckets = 1usize << hash_index_bits;
    let mut bucket_offsets = Vec::with_capacity(num_buckets);
    for _ in 0..num_buckets {
        bucket_offsets.push(cursor.read_i64::<LittleEndian>()?);
    }
    let max_uncompressed = cursor.read_i32::<LittleEndian>()?;
    let max_compressed = cursor.read_i32::<LittleEndian>()?;
    if max_uncompressed < 0 || max_compressed < 0 {
        bail!(
            "corrupt footer: negative chunk size (uncompressed {}, compressed {})",
            max_uncompressed,
            max_compressed
        );
    }

    let footer = Footer {
        bucket_offsets,
        max_uncompressed_chunk: max_uncompressed as u32,
        max_compressed_chunk: max_compressed as u32,
    };
    footer.validate(data_len)?;
    Ok((footer, data_len))
}
