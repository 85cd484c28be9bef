//! # Blob Store - variable-length values over a hash index
//!
//! A blob store version is two files written and read together:
//!
//! ```text
//! <v>.base.hidx   key index: hash-indexed file, key hash -> location
//! <v>.base.blob   record file
//! ```
//!
//! The record file is a sequence of `[varint length][value bytes]` records.
//! With a block codec (anything but `none`) records are grouped into blocks,
//! each framed as `[varint compressed length][compressed block]`, and a
//! location is `(block offset, offset inside the decompressed block)`.
//!
//! Reads go through two caches owned by the [`BlobReader`]:
//!
//! - the last decompressed block, so clustered reads decompress once;
//! - an optional [`ValueCache`] of decoded values keyed by raw location
//!   bytes (the "L2" cache), reported per lookup through [`CacheOutcome`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use blobstore::{BlobOptions, BlobReader, BlobWriter};
//! use codec::CompressionCodec;
//!
//! # fn main() -> anyhow::Result<()> {
//! let opts = BlobOptions::new(10, 8).with_compression(CompressionCodec::Snappy);
//!
//! let mut w = BlobWriter::create("00000.base.hidx", "00000.base.blob", opts.clone())?;
//! w.write(b"alpha", b"first value")?; // keys must be in key-hash order
//! w.finish()?;
//!
//! let r = BlobReader::open("00000.base.hidx", "00000.base.blob", &opts)?;
//! assert_eq!(r.get(b"alpha")?.value.as_deref(), Some(&b"first value"[..]));
//! # Ok(())
//! # }
//! ```

mod cache;
mod location;
mod merge;
mod options;
mod reader;
mod writer;

pub use cache::ValueCache;
pub use location::{Location, LocationCodec};
pub use merge::{merge, BlobMergeSummary};
pub use options::BlobOptions;
pub use reader::{BlobReader, BlobReaderStats, CacheOutcome, ReadResult};
pub use writer::{BlobWriteSummary, BlobWriter};

#[cfg(test)]
mod tests;
