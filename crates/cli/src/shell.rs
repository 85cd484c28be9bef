use anyhow::{Context, Result};
use config::FleetConfig;
use planner::VersionGraph;
use std::io::Write;
use tracing::{debug, warn};
use updater::{remote_from_config, PartitionReader, PartitionUpdater, RemoteDomainCleaner, UpdateOutcome};

/// One partition, its version metadata, and the reader serving `GET`.
pub struct Shell {
    cfg: FleetConfig,
    graph: VersionGraph,
    updater: PartitionUpdater,
    reader: Option<PartitionReader>,
}

impl Shell {
    pub fn new(cfg: FleetConfig) -> Result<Self> {
        let updater = PartitionUpdater::from_config(&cfg)?;
        let graph: VersionGraph = cfg.versions.iter().collect();
        let reader = PartitionReader::open(&cfg.domain, updater.root())
            .with_context(|| format!("failed to open partition at {}", updater.root().display()))?;
        Ok(Self {
            cfg,
            graph,
            updater,
            reader,
        })
    }

    #[must_use]
    pub fn current_version(&self) -> Option<u32> {
        self.reader.as_ref().map(PartitionReader::version)
    }

    /// Newest closed, non-defunct version: the default `PLAN`/`UPDATE` target.
    #[must_use]
    pub fn default_target(&self) -> Option<u32> {
        self.graph
            .iter()
            .filter(|v| v.is_closed() && !v.defunct)
            .map(|v| v.number)
            .max()
    }

    /// Runs one command line, writing its reply to `out`. Returns `false`
    /// once the shell should exit.
    ///
    /// Command failures are replies (`ERR ...`); only a failed write to
    /// `out` is an error.
    pub fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> Result<bool> {
        let mut parts = line.split_whitespace();
        let cmd = match parts.next() {
            Some(c) => c.to_uppercase(),
            None => return Ok(true),
        };
        debug!(command = %cmd, "shell command");

        match cmd.as_str() {
            "GET" => match parts.next() {
                Some(k) => match &self.reader {
                    Some(reader) => match reader.get(k.as_bytes()) {
                        Ok(Some(v)) => writeln!(out, "{}", render_value(&v))?,
                        Ok(None) => writeln!(out, "(nil)")?,
                        Err(e) => writeln!(out, "ERR read failed: {:#}", e)?,
                    },
                    None => writeln!(out, "ERR partition has no version")?,
                },
                None => writeln!(out, "ERR usage: GET key")?,
            },
            "VERSION" => writeln!(out, "{}", version_str(self.current_version()))?,
            "PLAN" => match self.parse_target(parts.next()) {
                Ok(target) => match self.updater.plan(&self.graph, target) {
                    Ok(Some(plan)) => writeln!(out, "{}", plan)?,
                    Ok(None) => writeln!(out, "(up to date)")?,
                    Err(e) => writeln!(out, "ERR plan failed: {:#}", e)?,
                },
                Err(msg) => writeln!(out, "ERR {}", msg)?,
            },
            "UPDATE" => match self.parse_target(parts.next()) {
                Ok(target) => self.update(target, out)?,
                Err(msg) => writeln!(out, "ERR {}", msg)?,
            },
            "CLEAN" => {
                let cleaner = RemoteDomainCleaner::new(
                    self.cfg.domain.clone(),
                    remote_from_config(&self.cfg.updater.remote),
                );
                match cleaner.run(&self.graph) {
                    Ok(report) => writeln!(
                        out,
                        "OK deleted {:?} ({} files)",
                        report.deleted_versions, report.files_removed
                    )?,
                    Err(e) => writeln!(out, "ERR clean failed: {:#}", e)?,
                }
            }
            "STATS" => self.stats(out)?,
            "EXIT" | "QUIT" => {
                writeln!(out, "bye")?;
                return Ok(false);
            }
            other => writeln!(out, "unknown command: {}", other)?,
        }
        Ok(true)
    }

    fn parse_target(&self, arg: Option<&str>) -> std::result::Result<Option<u32>, String> {
        match arg {
            Some(s) => s
                .parse::<u32>()
                .map(Some)
                .map_err(|_| format!("invalid version: {}", s)),
            None => Ok(self.default_target()),
        }
    }

    fn update<W: Write>(&mut self, target: Option<u32>, out: &mut W) -> Result<()> {
        let outcome = match self.updater.update_to(&self.graph, target) {
            Ok(o) => o,
            Err(e) => {
                writeln!(out, "ERR update failed: {:#}", e)?;
                return Ok(());
            }
        };

        match outcome {
            UpdateOutcome::UpToDate { version } => {
                writeln!(out, "OK up to date at {}", version_str(version))?;
            }
            UpdateOutcome::Updated {
                from,
                to,
                plan,
                stats,
            } => {
                // The old reader still holds the previous version's files.
                self.reader = None;
                match PartitionReader::open(&self.cfg.domain, self.updater.root()) {
                    Ok(Some(r)) => self.reader = Some(r),
                    Ok(None) => warn!(version = to, "updated partition has no complete base"),
                    Err(e) => warn!(version = to, error = %e, "failed to reopen partition"),
                }
                writeln!(
                    out,
                    "OK {} -> {} via {} ({} records, {} files fetched)",
                    version_str(from),
                    to,
                    plan,
                    stats.merged_records,
                    stats.fetched_files
                )?;
            }
        }
        Ok(())
    }

    fn stats<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(
            out,
            "domain={} partition={} state={} version={} known_versions={}",
            self.cfg.domain.name,
            self.updater.partition(),
            self.updater.state(),
            version_str(self.current_version()),
            self.graph.len()
        )?;
        if let Some(s) = self.reader.as_ref().and_then(PartitionReader::blob_stats) {
            writeln!(
                out,
                "l2_hits={} l2_misses={} block_cache_hits={} block_reads={}",
                s.l2_hits, s.l2_misses, s.block_cache_hits, s.block_reads
            )?;
        }
        Ok(())
    }
}

fn version_str(v: Option<u32>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "none".to_string(),
    }
}

/// Printable values as text, anything else as hex.
pub fn render_value(v: &[u8]) -> String {
    if !v.is_empty() && v.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return String::from_utf8_lossy(v).into_owned();
    }
    let mut s = String::with_capacity(2 + v.len() * 2);
    s.push_str("0x");
    for b in v {
        s.push_str(&format!("{:02x}", b));
    }
    s
}
