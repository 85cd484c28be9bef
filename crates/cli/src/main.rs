//! # CLI - FleetKV partition shell
//!
//! A REPL over one partition of one domain. Reads commands from stdin,
//! prints replies to stdout, and logs to stderr, so it can be driven by a
//! script as easily as by hand.
//!
//! ## Commands
//!
//! ```text
//! GET key            Look up a key in the current version ("(nil)" if absent)
//! VERSION            Print the current local version ("none" if empty)
//! PLAN [target]      Show the base and deltas an update would use
//! UPDATE [target]    Fetch, merge and commit the target version
//! CLEAN              Delete remote versions no retained leaf needs
//! STATS              Print partition and reader counters
//! EXIT / QUIT        Leave the shell
//! ```
//!
//! Without a target, `PLAN` and `UPDATE` use the newest closed, non-defunct
//! version listed in the config.
//!
//! ## Configuration
//!
//! ```text
//! FLEET_CONFIG   Path of the TOML config file (default: built-in defaults)
//! RUST_LOG       Log filter                   (default: "info")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ FLEET_CONFIG=users.toml cargo run -p cli
//! FleetKV partition shell (domain=users, partition=3, version=none)
//! > PLAN
//! base=0 deltas=[1, 2]
//! > UPDATE
//! OK none -> 2 via base=0 deltas=[1, 2] (1200 records, 6 files fetched)
//! > GET alice
//! 0x2a000000
//! > EXIT
//! bye
//! ```

mod shell;

use anyhow::Result;
use config::FleetConfig;
use std::io::{self, BufRead, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shell::Shell;

fn load_config() -> Result<FleetConfig> {
    match std::env::var("FLEET_CONFIG") {
        Ok(path) => FleetConfig::load(path),
        Err(_) => Ok(FleetConfig::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cfg = load_config()?;
    info!(
        domain = %cfg.domain.name,
        partition = cfg.updater.partition,
        data_dir = %cfg.updater.data_dir.display(),
        versions = cfg.versions.len(),
        "config loaded"
    );
    let mut shell = Shell::new(cfg.clone())?;

    let mut stdout = io::stdout();
    writeln!(
        stdout,
        "FleetKV partition shell (domain={}, partition={}, version={})",
        cfg.domain.name,
        cfg.updater.partition,
        shell
            .current_version()
            .map_or_else(|| "none".to_string(), |v| v.to_string())
    )?;
    writeln!(stdout, "Commands: GET key | VERSION | PLAN [v] | UPDATE [v] | CLEAN | STATS | EXIT")?;
    write!(stdout, "> ")?;
    stdout.flush()?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        if !shell.execute(&line, &mut stdout)? {
            break;
        }
        write!(stdout, "> ")?;
        stdout.flush()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests;
