use super::*;
use crate::shell::render_value;
use tempfile::tempdir;

#[test]
fn empty_partition_reports_no_version() -> Result<()> {
    let dir = tempdir()?;
    let cfg = fleet_config(dir.path());
    let mut shell = Shell::new(cfg)?;

    let out = run(&mut shell, &["VERSION", "GET alice"])?;
    assert_eq!(out, "none\nERR partition has no version\n");
    Ok(())
}

#[test]
fn plan_defaults_to_newest_closed_version() -> Result<()> {
    let dir = tempdir()?;
    let cfg = fleet_config(dir.path());
    let mut shell = Shell::new(cfg)?;

    assert_eq!(shell.default_target(), Some(2));
    let out = run(&mut shell, &["PLAN", "PLAN 1"])?;
    assert_eq!(out, "base=0 deltas=[1, 2]\nbase=0 deltas=[1]\n");
    Ok(())
}

#[test]
fn update_then_get_serves_merged_values() -> Result<()> {
    let dir = tempdir()?;
    let cfg = fleet_config(dir.path());
    publish_chain(&cfg)?;
    let mut shell = Shell::new(cfg)?;

    let out = run(&mut shell, &["UPDATE"])?;
    assert!(out.starts_with("OK none -> 2 via base=0 deltas=[1, 2]"), "{}", out);
    assert_eq!(shell.current_version(), Some(2));

    let out = run(&mut shell, &["GET alice", "GET bob", "GET carol", "GET dave", "VERSION"])?;
    assert_eq!(out, "0x02000000\n0x03000000\n0x07000000\n(nil)\n2\n");
    Ok(())
}

#[test]
fn second_update_is_up_to_date() -> Result<()> {
    let dir = tempdir()?;
    let cfg = fleet_config(dir.path());
    publish_chain(&cfg)?;
    let mut shell = Shell::new(cfg)?;

    run(&mut shell, &["UPDATE 2"])?;
    let out = run(&mut shell, &["UPDATE 2", "PLAN"])?;
    assert_eq!(out, "OK up to date at 2\n(up to date)\n");
    Ok(())
}

#[test]
fn reopened_shell_finds_committed_version() -> Result<()> {
    let dir = tempdir()?;
    let cfg = fleet_config(dir.path());
    publish_chain(&cfg)?;
    {
        let mut shell = Shell::new(cfg.clone())?;
        run(&mut shell, &["UPDATE 1"])?;
    }

    let mut shell = Shell::new(cfg)?;
    assert_eq!(shell.current_version(), Some(1));
    let out = run(&mut shell, &["GET alice", "PLAN"])?;
    assert_eq!(out, "0x02000000\nbase=1 deltas=[2]\n");
    Ok(())
}

#[test]
fn failed_update_keeps_serving_previous_version() -> Result<()> {
    let dir = tempdir()?;
    let mut cfg = fleet_config(dir.path());
    publish_chain(&cfg)?;
    // v3 is listed but never published.
    cfg.versions.push(entry(3, Some(2), Some(400)));
    let mut shell = Shell::new(cfg)?;

    run(&mut shell, &["UPDATE 2"])?;
    let out = run(&mut shell, &["UPDATE 3", "VERSION", "GET bob"])?;
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines[0].starts_with("ERR update failed"), "{}", out);
    assert_eq!(&lines[1..], &["2", "0x03000000"]);
    Ok(())
}

#[test]
fn plan_errors_are_replies() -> Result<()> {
    let dir = tempdir()?;
    let mut cfg = fleet_config(dir.path());
    cfg.versions.push(entry(3, Some(2), None));
    let mut shell = Shell::new(cfg)?;

    let out = run(&mut shell, &["PLAN 3", "PLAN 9", "PLAN x"])?;
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("ERR plan failed") && lines[0].contains("not closed"), "{}", out);
    assert!(lines[1].starts_with("ERR plan failed"), "{}", out);
    assert_eq!(lines[2], "ERR invalid version: x");
    Ok(())
}

#[test]
fn clean_deletes_versions_behind_newer_base() -> Result<()> {
    let dir = tempdir()?;
    let mut cfg = fleet_config(dir.path());
    cfg.domain.storage.num_remote_leaf_versions_to_keep = 1;
    cfg.versions.push(entry(3, None, Some(400)));
    publish_chain(&cfg)?;
    publish(&cfg, 3, true, &[("alice", 9)])?;
    let mut shell = Shell::new(cfg.clone())?;

    let out = run(&mut shell, &["CLEAN"])?;
    assert_eq!(out, "OK deleted {0, 1, 2} (3 files)\n");

    let remote = dir.path().join("remote").join("0");
    let left: Vec<String> = std::fs::read_dir(&remote)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<_>>()?;
    assert_eq!(left, vec!["00003.base.hidx".to_string()]);
    Ok(())
}

#[test]
fn stats_and_exit() -> Result<()> {
    let dir = tempdir()?;
    let cfg = fleet_config(dir.path());
    let mut shell = Shell::new(cfg)?;

    let mut out = Vec::new();
    assert!(shell.execute("stats", &mut out)?);
    assert!(shell.execute("", &mut out)?);
    assert!(shell.execute("FROB", &mut out)?);
    assert!(!shell.execute("quit", &mut out)?);
    let out = String::from_utf8(out)?;
    assert_eq!(
        out,
        "domain=users partition=0 state=idle version=none known_versions=3\nunknown command: FROB\nbye\n"
    );
    Ok(())
}

#[test]
fn out_of_range_partition_is_rejected() {
    let dir = tempdir().unwrap();
    let mut cfg = fleet_config(dir.path());
    cfg.updater.partition = 4;
    assert!(Shell::new(cfg).is_err());
}

#[test]
fn values_render_as_text_or_hex() {
    assert_eq!(render_value(b"hello world"), "hello world");
    assert_eq!(render_value(&[0x2a, 0, 0, 0]), "0x2a000000");
    assert_eq!(render_value(b""), "0x");
}
