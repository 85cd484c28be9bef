//! # Codec - hashing, compression and varints
//!
//! Small building blocks shared by the on-disk formats of the FleetKV
//! storage engine:
//!
//! - [`KeyHasher`] turns a raw key into a fixed-width *key hash*. Both the
//!   hash-indexed store and the blob store only ever persist key hashes,
//!   never raw keys.
//! - [`CompressionCodec`] compresses the independently readable chunks and
//!   blocks written by the stores.
//! - [`varint`] holds the unsigned LEB128 length prefixes used by blob
//!   records and compressed block frames.
//!
//! Every strategy is a closed enum. Configuration selects a variant by name at
//! parse time, so an unknown hasher or codec is a config error rather than a
//! lookup failure in the middle of serving.
//!
//! ## Example
//!
//! ```rust
//! use codec::{CompressionCodec, KeyHasher};
//!
//! let hash = KeyHasher::Xxh64.hash(b"user:42", 10);
//! assert_eq!(hash.len(), 10);
//!
//! let packed = CompressionCodec::Snappy.compress(&[7u8; 256]).unwrap();
//! let mut out = Vec::new();
//! CompressionCodec::Snappy.decompress_into(&packed, &mut out).unwrap();
//! assert_eq!(out, vec![7u8; 256]);
//! ```

mod compression;
mod hasher;
pub mod varint;

use thiserror::Error;

pub use compression::CompressionCodec;
pub use hasher::{sort_by_key_hash, KeyHasher};

/// Errors produced while encoding or decoding bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The codec rejected the input while compressing.
    #[error("{codec} compression failed: {message}")]
    Compress {
        codec: &'static str,
        message: String,
    },

    /// The input could not be decompressed (truncated or corrupt block).
    #[error("{codec} decompression failed: {message}")]
    Decompress {
        codec: &'static str,
        message: String,
    },

    /// A varint ran past its maximum width or overflowed 64 bits.
    #[error("malformed varint: {0}")]
    Varint(&'static str),
}
