use anyhow::{bail, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Where a record lives in the record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Byte offset of the length prefix in a flat record file.
    Flat(u64),
    /// Offset of a block frame and of the record inside the decompressed block.
    InBlock { block: u64, offset: u32 },
}

impl Location {
    /// Offset into the record file (the record itself or its block frame).
    #[must_use]
    pub fn file_offset(&self) -> u64 {
        match *self {
            Location::Flat(offset) => offset,
            Location::InBlock { block, .. } => block,
        }
    }
}

/// Fixed-width little-endian encoding of [`Location`]s, as stored in the key
/// index.
///
/// A flat descriptor is `offset_bytes` wide. A block descriptor is
/// `offset_bytes` of block offset followed by `in_block_bytes` of offset
/// inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationCodec {
    offset_bytes: usize,
    in_block_bytes: usize,
}

impl LocationCodec {
    #[must_use]
    pub fn flat(offset_bytes: usize) -> Self {
        Self {
            offset_bytes,
            in_block_bytes: 0,
        }
    }

    #[must_use]
    pub fn block(offset_bytes: usize, in_block_bytes: usize) -> Self {
        Self {
            offset_bytes,
            in_block_bytes,
        }
    }

    /// Width of one encoded descriptor.
    #[must_use]
    pub fn size(&self) -> usize {
        self.offset_bytes + self.in_block_bytes
    }

    #[must_use]
    pub fn is_block_mode(&self) -> bool {
        self.in_block_bytes > 0
    }

    pub fn encode(&self, location: Location, out: &mut [u8]) -> Result<()> {
        if out.len() != self.size() {
            bail!("location buffer is {} bytes, expected {}", out.len(), self.size());
        }
        match (location, self.is_block_mode()) {
            (Location::Flat(offset), false) => {
                put_uint(&mut out[..], offset, self.offset_bytes, "record offset")
            }
            (Location::InBlock { block, offset }, true) => {
                let (head, tail) = out.split_at_mut(self.offset_bytes);
                put_uint(head, block, self.offset_bytes, "block offset")?;
                put_uint(tail, u64::from(offset), self.in_block_bytes, "offset in block")
            }
            (location, _) => bail!("{:?} does not match the configured location layout", location),
        }
    }

    /// Encodes into a new buffer.
    pub fn to_bytes(&self, location: Location) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.size()];
        self.encode(location, &mut out)?;
        Ok(out)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Location> {
        if bytes.len() != self.size() {
            bail!("location is {} bytes, expected {}", bytes.len(), self.size());
        }
        let offset = LittleEndian::read_uint(bytes, self.offset_bytes);
        if !self.is_block_mode() {
            return Ok(Location::Flat(offset));
        }
        let in_block = LittleEndian::read_uint(&bytes[self.offset_bytes..], self.in_block_bytes);
        Ok(Location::InBlock {
            block: offset,
            offset: in_block as u32,
        })
    }

    /// Moves an encoded descriptor `by` bytes further into the record file.
    ///
    /// Used when record files are concatenated: the intra-block part is
    /// unchanged because blocks are copied whole.
    pub fn shift(&self, bytes: &mut [u8], by: u64) -> Result<()> {
        if by == 0 {
            return Ok(());
        }
        if bytes.len() != self.size() {
            bail!("location is {} bytes, expected {}", bytes.len(), self.size());
        }
        let offset = LittleEndian::read_uint(bytes, self.offset_bytes);
        let shifted = match offset.checked_add(by) {
            Some(v) => v,
            None => bail!("shifted record offset overflows"),
        };
        put_uint(&mut bytes[..self.offset_bytes], shifted, self.offset_bytes, "shifted record offset")
    }
}

fn put_uint(out: &mut [u8], value: u64, nbytes: usize, what: &str) -> Result<()> {
    if nbytes < 8 && value >> (8 * nbytes) != 0 {
        bail!("{} {} does not fit in {} bytes", what, value, nbytes);
    }
    LittleEndian::write_uint(out, value, nbytes);
    Ok(())
}
