use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_contained_prefix_and_duplicate() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("reads.fa");
    let idx = temp.path().join("idx");

    fs::write(&input, ">a\nAAAA\n>b\nAAAAT\n>c\nAAAA\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("contained")
        .arg("--db")
        .arg(&input)
        .arg("--indexname")
        .arg(&idx);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("contained = 2"))
        .stdout(predicate::str::contains("remaining = 1"));

    assert!(temp.path().join("idx.clb").exists());

    Ok(())
}

#[test]
fn test_contained_write_fasta_keeps_survivors() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("reads.fa");
    let idx = temp.path().join("idx");

    fs::write(&input, ">a\nAAAA\n>b\nAAAAT\n>c\nAAAA\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("contained")
        .arg("--db")
        .arg(&input)
        .arg("--indexname")
        .arg(&idx)
        .arg("--write-fasta");

    cmd.assert().success();

    let fas = fs::read_to_string(temp.path().join("idx.fas"))?;
    assert!(fas.contains("AAAAT"));
    assert_eq!(fas.matches('>').count(), 1);

    Ok(())
}

#[test]
fn test_contained_copynum() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("reads.fa");
    let idx = temp.path().join("idx");

    fs::write(&input, ">a\nAAAA\n>b\nAAAA\n>c\nCCCC\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("contained")
        .arg("--db")
        .arg(&input)
        .arg("--indexname")
        .arg(&idx)
        .arg("--copynum");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("contained = 1"));

    // one byte per surviving read: copy counts 2 and 1
    let cpn = fs::read(temp.path().join("idx.cpn"))?;
    assert_eq!(cpn, vec![2, 1]);

    Ok(())
}

#[test]
fn test_contained_copynum_needs_eqlen() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("reads.fa");
    let idx = temp.path().join("idx");

    fs::write(&input, ">a\nAAAA\n>b\nAAAAT\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("contained")
        .arg("--db")
        .arg(&input)
        .arg("--indexname")
        .arg(&idx)
        .arg("--copynum");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("equal length"));

    Ok(())
}

#[test]
fn test_contained_mirror_finds_revcompl_duplicates() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("reads.fa");
    let idx = temp.path().join("idx");

    // GGTT is the reverse complement of AACC
    fs::write(&input, ">a\nAACC\n>b\nGGTT\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("contained")
        .arg("--db")
        .arg(&input)
        .arg("--indexname")
        .arg(&idx)
        .arg("--mirror");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("contained = 1"));

    Ok(())
}

#[test]
fn test_contained_paired_mates_dropped_together() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let f1 = temp.path().join("r1.fa");
    let f2 = temp.path().join("r2.fa");
    let idx = temp.path().join("idx");

    fs::write(&f1, ">a/1\nAAAA\n>b/1\nAAAA\n")?;
    fs::write(&f2, ">a/2\nCCCC\n>b/2\nGGGG\n")?;

    let mut cmd = Command::cargo_bin("rdk")?;
    cmd.arg("contained")
        .arg("--db")
        .arg(format!("{}:{}:300", f1.display(), f2.display()))
        .arg("--indexname")
        .arg(&idx)
        .arg("--write-fasta");

    cmd.assert().success();

    // b/1 is a duplicate of a/1; its mate b/2 goes with it
    let fas = fs::read_to_string(temp.path().join("idx.fas"))?;
    assert_eq!(fas.matches('>').count(), 2);
    assert!(fas.contains("AAAA"));
    assert!(fas.contains("CCCC"));
    assert!(!fas.contains("GGGG"));

    Ok(())
}
