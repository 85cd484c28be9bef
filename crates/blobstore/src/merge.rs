//! Merging blob stores.
//!
//! Both strategies reuse the key-index merge, so a key present in several
//! inputs resolves to the newest one.
//!
//! - [`BlobMergeStrategy::Concatenate`] appends the record files of base and
//!   deltas unchanged and shifts every surviving location by the start of its
//!   input's record file. Records that lost to a newer version stay behind as
//!   unreachable bytes.
//! - [`BlobMergeStrategy::Compact`] re-reads every surviving value and writes
//!   a fresh record file, dropping garbage and re-applying value folding.

use anyhow::{bail, Context, Result};
use config::BlobMergeStrategy;
use hashindex::{tmp_path_for, MergeIterator, ValueTransformer};
use std::fs::{rename, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;
use tracing::debug;

use crate::location::LocationCodec;
use crate::options::BlobOptions;
use crate::reader::BlobReader;
use crate::writer::BlobWriter;

/// Counts reported by [`merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobMergeSummary {
    pub strategy: BlobMergeStrategy,
    /// Keys in the merged key index.
    pub num_keys: u64,
    /// Size of the merged record file.
    pub record_bytes: u64,
}

/// Shifts each location by the record-file start of the input it came from.
struct OffsetShift {
    locations: LocationCodec,
    starts: Vec<u64>,
}

impl ValueTransformer for OffsetShift {
    fn transform(&self, value: &mut [u8], source: usize) -> Result<()> {
        match self.starts.get(source) {
            Some(&start) => self.locations.shift(value, start),
            None => bail!("no record file for merge input {}", source),
        }
    }
}

/// Merges `base` and `deltas` (ascending version order) into a new blob
/// store at `index_out` / `records_out` using `opts.blob.merge_strategy`.
pub fn merge(
    base: &BlobReader,
    deltas: &[BlobReader],
    index_out: &Path,
    records_out: &Path,
    opts: &BlobOptions,
) -> Result<BlobMergeSummary> {
    opts.validate()?;
    let mut inputs: Vec<&BlobReader> = Vec::with_capacity(deltas.len() + 1);
    inputs.push(base);
    inputs.extend(deltas.iter());

    let summary = match opts.blob.merge_strategy {
        BlobMergeStrategy::Concatenate => concatenate(&inputs, index_out, records_out, opts)?,
        BlobMergeStrategy::Compact => compact(&inputs, index_out, records_out, opts)?,
    };
    debug!(
        output = %records_out.display(),
        inputs = inputs.len(),
        strategy = ?summary.strategy,
        keys = summary.num_keys,
        bytes = summary.record_bytes,
        "blob merge complete"
    );
    Ok(summary)
}

fn concatenate(
    inputs: &[&BlobReader],
    index_out: &Path,
    records_out: &Path,
    opts: &BlobOptions,
) -> Result<BlobMergeSummary> {
    let records_tmp = tmp_path_for(records_out);
    let result = concatenate_into(inputs, index_out, &records_tmp, opts).and_then(|summary| {
        rename(&records_tmp, records_out)
            .with_context(|| format!("failed to move {} into place", records_out.display()))?;
        Ok(summary)
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&records_tmp);
        let _ = std::fs::remove_file(index_out);
    }
    result
}

fn concatenate_into(
    inputs: &[&BlobReader],
    index_out: &Path,
    records_tmp: &Path,
    opts: &BlobOptions,
) -> Result<BlobMergeSummary> {
    let mut out = BufWriter::new(
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(records_tmp)
            .with_context(|| format!("failed to create {}", records_tmp.display()))?,
    );
    let mut starts = Vec::with_capacity(inputs.len());
    let mut total = 0u64;
    for input in inputs {
        starts.push(total);
        let mut src = File::open(input.records_path())
            .with_context(|| format!("failed to open {}", input.records_path().display()))?;
        let copied = io::copy(&mut src, &mut out)?;
        if copied != input.records_len() {
            bail!(
                "{} changed size while merging ({} bytes, expected {})",
                input.records_path().display(),
                copied,
                input.records_len()
            );
        }
        total += copied;
    }
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;

    let shift = OffsetShift {
        locations: opts.location_codec(),
        starts,
    };
    let delta_indexes: Vec<_> = inputs[1..].iter().map(|r| r.index()).collect();
    let index = hashindex::merge(
        inputs[0].index(),
        &delta_indexes,
        index_out,
        Some(&shift as &dyn ValueTransformer),
    )?;

    Ok(BlobMergeSummary {
        strategy: BlobMergeStrategy::Concatenate,
        num_keys: index.num_records,
        record_bytes: total,
    })
}

fn compact(
    inputs: &[&BlobReader],
    index_out: &Path,
    records_out: &Path,
    opts: &BlobOptions,
) -> Result<BlobMergeSummary> {
    let indexes: Vec<_> = inputs.iter().map(|r| r.index()).collect();
    let mut iter = MergeIterator::new(&indexes)?;
    let mut writer = BlobWriter::create(index_out, records_out, opts.clone())?;
    while let Some((hash, location, source)) = iter.next_entry()? {
        let value = inputs[source].value_at(&location).with_context(|| {
            format!("failed to read value from {}", inputs[source].records_path().display())
        })?;
        writer.write_hash(&hash, &value)?;
    }
    let written = writer.finish()?;
    Ok(BlobMergeSummary {
        strategy: BlobMergeStrategy::Compact,
        num_keys: written.num_keys,
        record_bytes: written.record_bytes,
    })
}
