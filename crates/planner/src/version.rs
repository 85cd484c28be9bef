use config::VersionEntry;
use std::collections::{BTreeMap, BTreeSet};

/// Metadata of one version of a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainVersion {
    pub number: u32,
    /// Close time in milliseconds since the epoch. `None` while the version
    /// is still being written.
    pub closed_at: Option<u64>,
    pub defunct: bool,
    pub is_base: bool,
    /// Version this delta applies to. Ignored for bases.
    pub parent: Option<u32>,
}

impl DomainVersion {
    /// A closed base version.
    #[must_use]
    pub fn base(number: u32, closed_at: u64) -> Self {
        Self {
            number,
            closed_at: Some(closed_at),
            defunct: false,
            is_base: true,
            parent: None,
        }
    }

    /// A closed delta on top of `parent`.
    #[must_use]
    pub fn delta(number: u32, parent: u32, closed_at: u64) -> Self {
        Self {
            number,
            closed_at: Some(closed_at),
            defunct: false,
            is_base: false,
            parent: Some(parent),
        }
    }

    /// Marks the version as still open.
    #[must_use]
    pub fn still_open(mut self) -> Self {
        self.closed_at = None;
        self
    }

    #[must_use]
    pub fn marked_defunct(mut self) -> Self {
        self.defunct = true;
        self
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

impl From<&VersionEntry> for DomainVersion {
    fn from(e: &VersionEntry) -> Self {
        Self {
            number: e.number,
            closed_at: e.closed_at,
            defunct: e.defunct,
            is_base: e.is_base,
            parent: e.parent,
        }
    }
}

/// All versions of a domain, indexed by version number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionGraph {
    versions: BTreeMap<u32, DomainVersion>,
}

impl VersionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a version.
    pub fn insert(&mut self, version: DomainVersion) {
        self.versions.insert(version.number, version);
    }

    #[must_use]
    pub fn get(&self, number: u32) -> Option<&DomainVersion> {
        self.versions.get(&number)
    }

    #[must_use]
    pub fn contains(&self, number: u32) -> bool {
        self.versions.contains_key(&number)
    }

    /// Versions in ascending number order.
    pub fn iter(&self) -> impl Iterator<Item = &DomainVersion> {
        self.versions.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Non-defunct versions that no non-defunct version builds on.
    ///
    /// Defunct versions are cut out of the graph first: a delta whose parent
    /// is defunct hangs off the nearest non-defunct ancestor, and a version
    /// whose only children are defunct is a leaf itself.
    #[must_use]
    pub fn leaves(&self) -> Vec<u32> {
        let parents: BTreeSet<u32> = self
            .versions
            .values()
            .filter(|v| !v.defunct)
            .filter_map(|v| self.live_parent(v))
            .collect();
        self.versions
            .values()
            .filter(|v| !v.defunct && !parents.contains(&v.number))
            .map(|v| v.number)
            .collect()
    }

    /// Nearest non-defunct ancestor `v` builds on, stepping over defunct
    /// deltas. `None` for bases and for chains that end in a defunct base.
    fn live_parent(&self, v: &DomainVersion) -> Option<u32> {
        if v.is_base {
            return None;
        }
        let mut next = v.parent;
        for _ in 0..self.versions.len() {
            let p = self.versions.get(&next?)?;
            if !p.defunct {
                return Some(p.number);
            }
            if p.is_base {
                return None;
            }
            next = p.parent;
        }
        None
    }
}

impl FromIterator<DomainVersion> for VersionGraph {
    fn from_iter<I: IntoIterator<Item = DomainVersion>>(iter: I) -> Self {
        let mut graph = VersionGraph::new();
        for v in iter {
            graph.insert(v);
        }
        graph
    }
}

impl<'a> FromIterator<&'a VersionEntry> for VersionGraph {
    fn from_iter<I: IntoIterator<Item = &'a VersionEntry>>(iter: I) -> Self {
        iter.into_iter().map(DomainVersion::from).collect()
    }
}
