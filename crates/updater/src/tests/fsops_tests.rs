use super::*;
use tempfile::tempdir;

#[test]
fn commit_moves_only_flat_files() -> Result<()> {
    let dir = tempdir()?;
    let src = dir.path().join("work");
    let dst = dir.path().join("live");
    std::fs::create_dir_all(src.join("nested"))?;
    std::fs::write(src.join("00003.base.hidx"), b"new")?;
    std::fs::write(src.join("notes"), b"n")?;
    std::fs::write(src.join("nested").join("inner"), b"i")?;

    let moved = commit_files(&src, &dst)?;
    assert_eq!(moved.len(), 2);
    assert_eq!(entries(&dst), vec!["00003.base.hidx", "notes"]);
    assert_eq!(entries(&src), vec!["nested"]);
    assert_eq!(entries(&src.join("nested")), vec!["inner"]);
    Ok(())
}

#[test]
fn commit_replaces_existing_files() -> Result<()> {
    let dir = tempdir()?;
    let src = dir.path().join("work");
    let dst = dir.path().join("live");
    std::fs::create_dir_all(&src)?;
    std::fs::create_dir_all(&dst)?;
    std::fs::write(src.join("00003.base.hidx"), b"new")?;
    std::fs::write(dst.join("00003.base.hidx"), b"old")?;

    commit_files(&src, &dst)?;
    assert_eq!(std::fs::read(dst.join("00003.base.hidx"))?, b"new");
    Ok(())
}

#[test]
fn missing_file_error_names_the_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("00009.delta.hidx");
    let err = require_file(&path).unwrap_err();
    assert_eq!(err.path, path);
    assert!(err.to_string().contains("00009.delta.hidx"));
}
