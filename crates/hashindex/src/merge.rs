//! Merging a base file with its ordered deltas.
//!
//! [`MergeIterator`] walks N hash-indexed files in key-hash order. When the
//! same key hash appears in more than one input, the entry from the **newest**
//! input wins: inputs are numbered base = 0, then deltas in ascending version
//! order, and the highest source index is kept.
//!
//! [`merge`] streams that iterator into a new file, passing every surviving
//! value through an optional [`ValueTransformer`] first.

use anyhow::{bail, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;
use tracing::debug;

use crate::reader::{HashIndexIter, HashIndexReader};
use crate::writer::{HashIndexWriter, WriteSummary};

/// Hook applied to each value that survives a merge.
///
/// `source` is the index of the input the value came from (0 = base,
/// `i` = i-th delta). The blob store uses this to shift record-file offsets
/// when it concatenates record files.
pub trait ValueTransformer {
    fn transform(&self, value: &mut [u8], source: usize) -> Result<()>;
}

impl<F> ValueTransformer for F
where
    F: Fn(&mut [u8], usize) -> Result<()>,
{
    fn transform(&self, value: &mut [u8], source: usize) -> Result<()> {
        self(value, source)
    }
}

/// The next pending record of one input.
struct HeapEntry {
    hash: Vec<u8>,
    value: Vec<u8>,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: smallest hash first, and among equal
        // hashes the newest source first.
        other
            .hash
            .cmp(&self.hash)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Merges several hash-indexed files into one sorted, deduplicated stream of
/// `(key_hash, value, source)`.
pub struct MergeIterator<'a> {
    sources: Vec<HashIndexIter<'a>>,
    heap: BinaryHeap<HeapEntry>,
}

impl<'a> MergeIterator<'a> {
    /// Creates a merge over `readers`, oldest first.
    pub fn new(readers: &[&'a HashIndexReader]) -> Result<Self> {
        let mut sources: Vec<HashIndexIter<'a>> = readers.iter().map(|r| r.iter()).collect();
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source, iter) in sources.iter_mut().enumerate() {
            if let Some(first) = iter.next() {
                let (hash, value) = first?;
                heap.push(HeapEntry { hash, value, source });
            }
        }
        Ok(Self { sources, heap })
    }

    fn advance(&mut self, source: usize) -> Result<()> {
        if let Some(next) = self.sources[source].next() {
            let (hash, value) = next?;
            self.heap.push(HeapEntry { hash, value, source });
        }
        Ok(())
    }

    /// Returns the next surviving record, or `None` once every input is
    /// exhausted.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>, usize)>> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };
        self.advance(top.source)?;

        // Older inputs holding the same hash are shadowed.
        while self.heap.peek().map_or(false, |p| p.hash == top.hash) {
            if let Some(shadowed) = self.heap.pop() {
                self.advance(shadowed.source)?;
            }
        }

        Ok(Some((top.hash, top.value, top.source)))
    }
}

/// Merges `base` and `deltas` (ascending version order) into a new file at
/// `output`, written with the base's options.
///
/// # Errors
///
/// Fails if the inputs disagree on key-hash or value width, on any read or
/// write error, or if the transformer fails. The output's temp file is
/// removed on failure.
pub fn merge(
    base: &HashIndexReader,
    deltas: &[&HashIndexReader],
    output: &Path,
    transformer: Option<&dyn ValueTransformer>,
) -> Result<WriteSummary> {
    let opts = base.options().clone();
    for delta in deltas {
        let d = delta.options();
        if d.key_hash_size != opts.key_hash_size || d.value_size != opts.value_size {
            bail!(
                "delta {} has shape {}+{} bytes, base has {}+{}",
                delta.path().display(),
                d.key_hash_size,
                d.value_size,
                opts.key_hash_size,
                opts.value_size
            );
        }
    }

    let mut inputs: Vec<&HashIndexReader> = Vec::with_capacity(deltas.len() + 1);
    inputs.push(base);
    inputs.extend_from_slice(deltas);

    let mut iter = MergeIterator::new(&inputs)?;
    let mut writer = HashIndexWriter::create(output, opts)?;
    while let Some((hash, mut value, source)) = iter.next_entry()? {
        if let Some(t) = transformer {
            t.transform(&mut value, source)?;
        }
        writer.write_hash(&hash, &value)?;
    }
    let summary = writer.finish()?;

    debug!(
        output = %output.display(),
        inputs = inputs.len(),
        records = summary.num_records,
        "hash index merge complete"
    );
    Ok(summary)
}
