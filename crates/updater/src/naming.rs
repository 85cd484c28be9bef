//! Version file names and what a directory listing says about them.
//!
//! ```text
//! 00012.base.hidx    hash-indexed file, or blob key index
//! 00012.base.blob    blob record file
//! 00013.delta.hidx
//! ```
//!
//! No metadata file records which version a partition holds: the files are
//! the record. Everything here works on plain name listings so the rules can
//! be tested without touching a disk.

use config::StorageEngineKind;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;

/// One component of a stored version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileExt {
    /// Hash-indexed file (`.hidx`).
    Index,
    /// Blob record file (`.blob`).
    Records,
}

impl FileExt {
    pub const ALL: [FileExt; 2] = [FileExt::Index, FileExt::Records];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FileExt::Index => "hidx",
            FileExt::Records => "blob",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "hidx" => Some(FileExt::Index),
            "blob" => Some(FileExt::Records),
            _ => None,
        }
    }
}

/// Files that make up one version of a store.
#[must_use]
pub fn components(engine: StorageEngineKind) -> &'static [FileExt] {
    match engine {
        StorageEngineKind::HashIndexed => &[FileExt::Index],
        StorageEngineKind::Blob => &[FileExt::Index, FileExt::Records],
    }
}

/// A parsed version file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionedFile {
    pub version: u32,
    pub is_base: bool,
    pub ext: FileExt,
}

impl VersionedFile {
    #[must_use]
    pub fn new(version: u32, is_base: bool, ext: FileExt) -> Self {
        Self {
            version,
            is_base,
            ext,
        }
    }

    /// `<version:05>.<base|delta>.<ext>`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{:05}.{}.{}",
            self.version,
            if self.is_base { "base" } else { "delta" },
            self.ext.as_str()
        )
    }

    /// Parses a file name; anything that is not a version file is `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.split('.');
        let version = parts.next()?;
        let kind = parts.next()?;
        let ext = FileExt::parse(parts.next()?)?;
        if parts.next().is_some() || version.len() < 5 {
            return None;
        }
        if !version.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let is_base = match kind {
            "base" => true,
            "delta" => false,
            _ => return None,
        };
        Some(Self {
            version: version.parse().ok()?,
            is_base,
            ext,
        })
    }
}

/// Versions of the given kind whose every component appears in `names`.
///
/// A blob version with only its key index (or only its record file) is
/// incomplete and not reported.
pub fn complete_versions<I, S>(names: I, engine: StorageEngineKind, is_base: bool) -> BTreeSet<u32>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let found: BTreeSet<VersionedFile> = names
        .into_iter()
        .filter_map(|n| VersionedFile::parse(n.as_ref()))
        .filter(|f| f.is_base == is_base)
        .collect();
    found
        .iter()
        .map(|f| f.version)
        .filter(|&v| {
            components(engine)
                .iter()
                .all(|&ext| found.contains(&VersionedFile::new(v, is_base, ext)))
        })
        .collect()
}

/// The current version of a partition given its live directory listing: the
/// highest version with a complete base.
pub fn detect_current_version<I, S>(names: I, engine: StorageEngineKind) -> Option<u32>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    complete_versions(names, engine, true).into_iter().next_back()
}

/// Names of the regular files directly inside `dir`. A missing directory is
/// empty.
pub fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
