mod merge_tests;

use crate::*;
use anyhow::Result;
use codec::sort_by_key_hash;
use std::path::Path;

/// Fixed-width value for key `i`.
pub(crate) fn value_for(i: u32, width: usize) -> Vec<u8> {
    let mut v = vec![0u8; width];
    let bytes = i.to_le_bytes();
    let n = width.min(4);
    v[..n].copy_from_slice(&bytes[..n]);
    v
}

/// Writes `entries` (any order) to `path`, sorting them by key hash first.
pub(crate) fn write_entries(
    path: &Path,
    opts: &HashIndexOptions,
    entries: &[(Vec<u8>, Vec<u8>)],
) -> Result<WriteSummary> {
    let mut sorted = entries.to_vec();
    sort_by_key_hash(opts.hasher, opts.key_hash_size, &mut sorted);
    let mut w = HashIndexWriter::create(path, opts.clone())?;
    for (k, v) in &sorted {
        w.write(k, v)?;
    }
    w.finish()
}

/// `n` keys `key-00000 ..` with values from [`value_for`].
pub(crate) fn numbered_entries(n: u32, width: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..n)
        .map(|i| (format!("key-{:05}", i).into_bytes(), value_for(i, width)))
        .collect()
}

/// Drains a merge into `(key_hash, value, source)` triples.
pub(crate) fn drain(iter: &mut MergeIterator<'_>) -> Result<Vec<(Vec<u8>, Vec<u8>, usize)>> {
    let mut out = Vec::new();
    while let Some(entry) = iter.next_entry()? {
        out.push(entry);
    }
    Ok(out)
}
