mod shell_tests;

use crate::shell::Shell;
use anyhow::Result;
use codec::sort_by_key_hash;
use config::{
    DomainConfig, FleetConfig, RemoteConfig, StorageConfig, UpdaterConfig, VersionEntry,
};
use hashindex::{HashIndexOptions, HashIndexWriter};
use std::path::Path;
use updater::naming::{FileExt, VersionedFile};

pub(crate) fn entry(number: u32, parent: Option<u32>, closed_at: Option<u64>) -> VersionEntry {
    VersionEntry {
        number,
        closed_at,
        defunct: false,
        is_base: parent.is_none(),
        parent,
    }
}

/// Hash-indexed `users` domain, one partition, v0 (base) <- v1 <- v2.
pub(crate) fn fleet_config(dir: &Path) -> FleetConfig {
    FleetConfig {
        domain: DomainConfig {
            name: "users".to_string(),
            storage: StorageConfig {
                key_hash_size: 8,
                value_size: 4,
                hash_index_bits: 4,
                ..StorageConfig::default()
            },
            ..DomainConfig::default()
        },
        updater: UpdaterConfig {
            data_dir: dir.join("data"),
            partition: 0,
            remote: RemoteConfig::Local {
                root: dir.join("remote"),
            },
        },
        versions: vec![
            entry(0, None, Some(100)),
            entry(1, Some(0), Some(200)),
            entry(2, Some(1), Some(300)),
        ],
    }
}

/// Publishes one hash-indexed version of partition 0 to the remote.
pub(crate) fn publish(cfg: &FleetConfig, version: u32, is_base: bool, entries: &[(&str, u32)]) -> Result<()> {
    let root = match &cfg.updater.remote {
        RemoteConfig::Local { root } => root.join("0"),
    };
    std::fs::create_dir_all(&root)?;
    let opts = HashIndexOptions::for_domain(&cfg.domain);
    let mut sorted: Vec<(Vec<u8>, Vec<u8>)> = entries
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.to_le_bytes().to_vec()))
        .collect();
    sort_by_key_hash(opts.hasher, opts.key_hash_size, &mut sorted);
    let path = root.join(VersionedFile::new(version, is_base, FileExt::Index).file_name());
    let mut w = HashIndexWriter::create(path, opts)?;
    for (k, v) in &sorted {
        w.write(k, v)?;
    }
    w.finish()?;
    Ok(())
}

/// Publishes the three versions of [`fleet_config`].
pub(crate) fn publish_chain(cfg: &FleetConfig) -> Result<()> {
    publish(cfg, 0, true, &[("alice", 1), ("carol", 7)])?;
    publish(cfg, 1, false, &[("alice", 2)])?;
    publish(cfg, 2, false, &[("bob", 3)])?;
    Ok(())
}

/// Runs `commands` one per line and returns everything the shell printed.
pub(crate) fn run(shell: &mut Shell, commands: &[&str]) -> Result<String> {
    let mut out = Vec::new();
    for c in commands {
        if !shell.execute(c, &mut out)? {
            break;
        }
    }
    Ok(String::from_utf8(out)?)
}
