use super::*;
use std::cell::RefCell;
use tempfile::tempdir;

fn open(path: &Path, opts: &HashIndexOptions) -> Result<HashIndexReader> {
    HashIndexReader::open(path, opts.clone())
}

#[test]
fn newest_input_wins_on_duplicate_keys() -> Result<()> {
    let dir = tempdir()?;
    let opts = HashIndexOptions::new(8, 4, 4);

    let base_path = dir.path().join("00000.base.hidx");
    write_entries(&base_path, &opts, &numbered_entries(100, 4))?;

    // Delta 1 rewrites keys 0..10, delta 2 rewrites keys 5..15 and adds 100.
    let d1_path = dir.path().join("00001.delta.hidx");
    let d1: Vec<_> = (0..10)
        .map(|i| (format!("key-{:05}", i).into_bytes(), value_for(1_000 + i, 4)))
        .collect();
    write_entries(&d1_path, &opts, &d1)?;

    let d2_path = dir.path().join("00002.delta.hidx");
    let d2: Vec<_> = (5..15)
        .chain(std::iter::once(100))
        .map(|i| (format!("key-{:05}", i).into_bytes(), value_for(2_000 + i, 4)))
        .collect();
    write_entries(&d2_path, &opts, &d2)?;

    let out = dir.path().join("00002.base.hidx");
    let base = open(&base_path, &opts)?;
    let d1 = open(&d1_path, &opts)?;
    let d2 = open(&d2_path, &opts)?;
    let summary = merge(&base, &[&d1, &d2], &out, None)?;
    assert_eq!(summary.num_records, 101);

    let merged = open(&out, &opts)?;
    assert_eq!(merged.get(b"key-00000")?, Some(value_for(1_000, 4)));
    assert_eq!(merged.get(b"key-00004")?, Some(value_for(1_004, 4)));
    assert_eq!(merged.get(b"key-00005")?, Some(value_for(2_005, 4)));
    assert_eq!(merged.get(b"key-00014")?, Some(value_for(2_014, 4)));
    assert_eq!(merged.get(b"key-00015")?, Some(value_for(15, 4)));
    assert_eq!(merged.get(b"key-00100")?, Some(value_for(2_100, 4)));
    Ok(())
}

#[test]
fn merge_iterator_reports_winning_source() -> Result<()> {
    let dir = tempdir()?;
    let opts = HashIndexOptions::new(8, 4, 2);

    let a = dir.path().join("a.hidx");
    let b = dir.path().join("b.hidx");
    write_entries(&a, &opts, &[(b"x".to_vec(), value_for(1, 4)), (b"y".to_vec(), value_for(2, 4))])?;
    write_entries(&b, &opts, &[(b"y".to_vec(), value_for(3, 4))])?;

    let ra = open(&a, &opts)?;
    let rb = open(&b, &opts)?;
    let mut iter = MergeIterator::new(&[&ra, &rb])?;
    let all = drain(&mut iter)?;
    assert_eq!(all.len(), 2);

    let y_hash = opts.hash_key(b"y");
    let y = all.iter().find(|(h, _, _)| *h == y_hash).unwrap();
    assert_eq!(y.1, value_for(3, 4));
    assert_eq!(y.2, 1);
    Ok(())
}

#[test]
fn transformer_sees_source_of_each_value() -> Result<()> {
    let dir = tempdir()?;
    let opts = HashIndexOptions::new(8, 4, 3);

    let base_path = dir.path().join("base.hidx");
    let delta_path = dir.path().join("delta.hidx");
    write_entries(&base_path, &opts, &numbered_entries(20, 4))?;
    write_entries(
        &delta_path,
        &opts,
        &[(b"key-00003".to_vec(), value_for(0, 4)), (b"new".to_vec(), value_for(0, 4))],
    )?;

    let seen = RefCell::new(Vec::new());
    let bump = |value: &mut [u8], source: usize| -> Result<()> {
        seen.borrow_mut().push(source);
        value[3] = 0xA0 + source as u8;
        Ok(())
    };

    let out = dir.path().join("merged.hidx");
    let base = open(&base_path, &opts)?;
    let delta = open(&delta_path, &opts)?;
    merge(&base, &[&delta], &out, Some(&bump as &dyn ValueTransformer))?;

    let mut sources = seen.into_inner();
    sources.sort_unstable();
    assert_eq!(sources.iter().filter(|&&s| s == 0).count(), 19);
    assert_eq!(sources.iter().filter(|&&s| s == 1).count(), 2);

    let merged = open(&out, &opts)?;
    assert_eq!(merged.get(b"key-00010")?.unwrap()[3], 0xA0);
    assert_eq!(merged.get(b"key-00003")?.unwrap()[3], 0xA1);
    assert_eq!(merged.get(b"new")?.unwrap()[3], 0xA1);
    Ok(())
}

#[test]
fn failing_transformer_leaves_no_output() -> Result<()> {
    let dir = tempdir()?;
    let opts = HashIndexOptions::new(8, 4, 3);
    let base_path = dir.path().join("base.hidx");
    write_entries(&base_path, &opts, &numbered_entries(10, 4))?;

    let refuse = |_: &mut [u8], _: usize| -> Result<()> { anyhow::bail!("no") };
    let out = dir.path().join("merged.hidx");
    let base = open(&base_path, &opts)?;
    assert!(merge(&base, &[], &out, Some(&refuse as &dyn ValueTransformer)).is_err());
    assert!(!out.exists());
    assert!(!tmp_path_for(&out).exists());
    Ok(())
}

#[test]
fn mismatched_value_width_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let narrow = HashIndexOptions::new(8, 4, 3);
    let wide = HashIndexOptions::new(8, 6, 3);

    let base_path = dir.path().join("base.hidx");
    let delta_path = dir.path().join("delta.hidx");
    write_entries(&base_path, &narrow, &numbered_entries(4, 4))?;
    write_entries(&delta_path, &wide, &numbered_entries(4, 6))?;

    let base = open(&base_path, &narrow)?;
    let delta = open(&delta_path, &wide)?;
    assert!(merge(&base, &[&delta], &dir.path().join("out.hidx"), None).is_err());
    Ok(())
}
