use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_encode_eqlen_stats() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("reads.fa");
    let idx = temp.path().join("idx");

    fs::write(&input, ">s1\nACGT\n>s2\nACGT\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("encode")
        .arg("--db")
        .arg(&input)
        .arg("--indexname")
        .arg(&idx);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("sequences = 2"))
        .stdout(predicate::str::contains("eqlen     = 5"))
        .stdout(predicate::str::contains("total     = 9"))
        .stdout(predicate::str::contains("distri    = [2, 2, 2, 2]"));

    assert!(temp.path().join("idx.esq").exists());
    assert!(temp.path().join("idx.rlt").exists());
    // equal-length mode has no separator position file
    assert!(!temp.path().join("idx.ssp").exists());

    Ok(())
}

#[test]
fn test_encode_invalid_record_skipped() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("reads.fa");
    let idx = temp.path().join("idx");

    fs::write(&input, ">s1\nACGTN\nACGT\n>s2\nACGT\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("encode")
        .arg("--db")
        .arg(&input)
        .arg("--indexname")
        .arg(&idx);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("sequences = 1"))
        .stdout(predicate::str::contains("invalid   = 1"));

    Ok(())
}

#[test]
fn test_encode_varlen_writes_seppos() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("reads.fa");
    let idx = temp.path().join("idx");

    fs::write(&input, ">a\nACGTACG\n>b\nTT\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("encode")
        .arg("--db")
        .arg(&input)
        .arg("--indexname")
        .arg(&idx);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("eqlen     = 0 (variable)"));

    let ssp = fs::read(temp.path().join("idx.ssp"))?;
    // two separator positions: 7 and 10
    assert_eq!(ssp.len(), 16);
    let mut first = [0u8; 8];
    first.copy_from_slice(&ssp[..8]);
    assert_eq!(u64::from_ne_bytes(first), 7);

    Ok(())
}

#[test]
fn test_encode_rle_writes_hpl() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("reads.fa");
    let idx = temp.path().join("idx");

    fs::write(&input, ">a\nAAACCG\n>b\nTTTTGG\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("encode")
        .arg("--db")
        .arg(&input)
        .arg("--indexname")
        .arg(&idx)
        .arg("--rle");

    cmd.assert().success();
    assert!(temp.path().join("idx.hpl").exists());

    Ok(())
}

#[test]
fn test_encode_quality_filter() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("reads.fq");
    let idx = temp.path().join("idx");

    fs::write(&input, "@r1\nACGT\n+\n####\n@r2\nTTTT\n+\nIIII\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("encode")
        .arg("--db")
        .arg(&input)
        .arg("--indexname")
        .arg(&idx)
        .arg("--maxlow")
        .arg("2")
        .arg("--lowqual")
        .arg("10");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("sequences = 1"))
        .stdout(predicate::str::contains("invalid   = 1"));

    Ok(())
}

#[test]
fn test_encode_unknown_format_fails() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("reads.txt");
    let idx = temp.path().join("idx");

    fs::write(&input, "ACGT\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("encode")
        .arg("--db")
        .arg(&input)
        .arg("--indexname")
        .arg(&idx);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown format"));

    Ok(())
}

#[test]
fn test_encode_bad_libspec_fails() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let idx = temp.path().join("idx");

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("encode")
        .arg("--db")
        .arg("a:b:c:d")
        .arg("--indexname")
        .arg(&idx);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("library specification not valid"));

    Ok(())
}
