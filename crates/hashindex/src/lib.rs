//! # HashIndex - fixed-width hash-indexed store
//!
//! Immutable, on-disk files mapping fixed-width key hashes to fixed-width
//! values. A lookup hashes the key, uses the leading `hash_index_bits` bits of
//! the hash to pick a bucket, reads that bucket's chunk and scans it linearly.
//! Files are written once by bulk builds or by merging a base with its deltas,
//! and are never modified afterwards.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION (one chunk per non-empty bucket, in bucket order) │
//! │                                                               │
//! │ chunk = compress( key_hash | value | key_hash | value | ... ) │
//! │                                                               │
//! │ Records inside a chunk are sorted by ascending key hash, so    │
//! │ the whole data section is sorted by key hash.                  │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER                                                         │
//! │                                                               │
//! │ bucket_offset (i64 LE) x 2^hash_index_bits    (-1 = empty)     │
//! │ max_uncompressed_chunk (i32 LE)                               │
//! │ max_compressed_chunk (i32 LE)                                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The footer size depends only on `hash_index_bits`, so the reader locates
//! it from the end of the file. A bucket's chunk spans from its offset to the
//! next non-empty bucket's offset, or to the end of the data section.
//!
//! With [`codec::CompressionCodec::None`] or `Identity` a chunk is the raw
//! record bytes. Chunk boundaries are invisible to callers: [`HashIndexReader::get`]
//! and [`HashIndexReader::iter`] only ever see records.

mod format;
mod merge;
mod options;
mod reader;
mod writer;

pub use format::{footer_size, read_footer, Footer, EMPTY_BUCKET, FOOTER_TRAILER_BYTES};
pub use merge::{merge, MergeIterator, ValueTransformer};
pub use options::HashIndexOptions;
pub use reader::{ChunkBuffers, HashIndexIter, HashIndexReader};
pub use writer::{tmp_path_for, HashIndexWriter, WriteSummary};

#[cfg(test)]
mod tests;
