use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::CodecError;

/// Compression applied to hash-indexed chunks and blob-store blocks.
///
/// `None` and `Identity` both store bytes verbatim. They differ for the blob
/// store: `None` writes a flat record file addressed by byte offset, while
/// `Identity` still groups records into framed blocks addressed by
/// `(block offset, offset in block)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionCodec {
    #[default]
    None,
    Identity,
    Deflate,
    Gzip,
    Snappy,
}

impl CompressionCodec {
    /// Returns `true` if blob records are grouped into blocks.
    #[must_use]
    pub fn is_block_mode(&self) -> bool {
        !matches!(self, CompressionCodec::None)
    }

    /// Returns `true` if compressed bytes equal the input bytes.
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        matches!(self, CompressionCodec::None | CompressionCodec::Identity)
    }

    /// Stable lowercase name, identical to the config spelling.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            CompressionCodec::None => "none",
            CompressionCodec::Identity => "identity",
            CompressionCodec::Deflate => "deflate",
            CompressionCodec::Gzip => "gzip",
            CompressionCodec::Snappy => "snappy",
        }
    }

    /// Compresses `data` into a freshly allocated buffer.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let codec = self.name();
        let fail = |e: std::io::Error| CodecError::Compress {
            codec,
            message: e.to_string(),
        };
        match self {
            CompressionCodec::None | CompressionCodec::Identity => Ok(data.to_vec()),
            CompressionCodec::Deflate => {
                let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
                enc.write_all(data).map_err(fail)?;
                enc.finish().map_err(fail)
            }
            CompressionCodec::Gzip => {
                let mut enc = GzEncoder::new(Vec::new(), Compression::default());
                enc.write_all(data).map_err(fail)?;
                enc.finish().map_err(fail)
            }
            CompressionCodec::Snappy => snap::raw::Encoder::new()
                .compress_vec(data)
                .map_err(|e| CodecError::Compress {
                    codec,
                    message: e.to_string(),
                }),
        }
    }

    /// Decompresses `data` into `out`, replacing its contents.
    ///
    /// `out` is owned by the caller so that a reader can keep one scratch
    /// buffer per call site and reuse its allocation across chunks.
    pub fn decompress_into(&self, data: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
        let codec = self.name();
        let fail = |e: std::io::Error| CodecError::Decompress {
            codec,
            message: e.to_string(),
        };
        out.clear();
        match self {
            CompressionCodec::None | CompressionCodec::Identity => {
                out.extend_from_slice(data);
            }
            CompressionCodec::Deflate => {
                DeflateDecoder::new(data).read_to_end(out).map_err(fail)?;
            }
            CompressionCodec::Gzip => {
                GzDecoder::new(data).read_to_end(out).map_err(fail)?;
            }
            CompressionCodec::Snappy => {
                let snappy_fail = |e: snap::Error| CodecError::Decompress {
                    codec,
                    message: e.to_string(),
                };
                let len = snap::raw::decompress_len(data).map_err(snappy_fail)?;
                out.resize(len, 0);
                let written = snap::raw::Decoder::new()
                    .decompress(data, out)
                    .map_err(snappy_fail)?;
                out.truncate(written);
            }
        }
        Ok(())
    }
}
