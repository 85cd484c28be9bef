
use crate::*;
use anyhow::Result;
use codec::sort_by_key_hash;
use std::path::{Path, PathBuf};

/// Paths of one blob store version inside `dir`.
pub(crate) fn paths(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    (dir.join(format!("{}.hidx", name)), dir.join(format!("{}.blob", name)))
}

/// Writes `entries` in key-hash order and returns the summary.
pub(crate) fn write_store(
    dir: &Path,
    name: &str,
    opts: &BlobOptions,
    entries: &[(Vec<u8>, Vec<u8>)],
) -> Result<BlobWriteSummary> {
    let (index, records) = paths(dir, name);
    let mut sorted = entries.to_vec();
    sort_by_key_hash(opts.hasher, opts.key_hash_size, &mut sorted);
    let mut w = BlobWriter::create(index, records, opts.clone())?;
    for (k, v) in &sorted {
        w.write(k, v)?;
    }
    w.finish()
}

pub(crate) fn open_store(dir: &Path, name: &str, opts: &BlobOptions) -> Result<BlobReader> {
    let (index, records) = paths(dir, name);
    BlobReader::open(index, records, opts)
}

/// Values of varied length, some longer than the default read buffer.
pub(crate) fn varied_entries(n: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..n)
        .map(|i| {
            let key = format!("doc-{:04}", i).into_bytes();
            let len = (i * 37) % 900;
            let value: Vec<u8> = (0..len).map(|j| ((i + j) % 251) as u8).collect();
            (key, value)
        })
        .collect()
}
