//! Read-library descriptors and the textual libspec surface.
//!
//! A libspec is one of `file` (unpaired), `file1:file2:len[-stdev]`
//! (paired, two files) or `file:len[-stdev]` (paired, interleaved).

use anyhow::{bail, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Write;

pub const LIBSPEC_SEP: char = ':';
pub const INSERT_SEP: char = '-';

lazy_static! {
    static ref RE_INSERT: Regex = Regex::new(r"^(\d+)(?:-(\d+))?$").unwrap();
}

#[derive(Debug, Clone)]
pub struct ReadsLibrary {
    pub paired: bool,
    pub file1: String,
    pub file2: Option<String>,
    pub insertlength: u64,
    pub stdev: u64,
    pub total_filelength: u64,
    pub total_seqlength: u64,
    pub first_seqnum: u64,
    pub nofseqs: u64,
}

impl ReadsLibrary {
    fn new(paired: bool, file1: &str, file2: Option<&str>, insertlength: u64, stdev: u64) -> Self {
        let mut total_filelength = crate::libs::io::file_size(file1);
        if let Some(f2) = file2 {
            total_filelength += crate::libs::io::file_size(f2);
        }
        ReadsLibrary {
            paired,
            file1: file1.to_string(),
            file2: file2.map(|s| s.to_string()),
            insertlength,
            stdev,
            total_filelength,
            total_seqlength: 0,
            first_seqnum: 0,
            nofseqs: 0,
        }
    }

    /// The virtual library name recorded in index metadata:
    /// `file1[:file2][:insertlength[-stdev]]`.
    pub fn name(&self) -> String {
        let mut name = self.file1.clone();
        if let Some(f2) = &self.file2 {
            name.push(LIBSPEC_SEP);
            name.push_str(f2);
        }
        if self.paired {
            name.push(LIBSPEC_SEP);
            name.push_str(&self.insertlength.to_string());
            if self.stdev > 0 {
                name.push(INSERT_SEP);
                name.push_str(&self.stdev.to_string());
            }
        }
        name
    }
}

pub fn parse_libspec(spec: &str) -> Result<ReadsLibrary> {
    assert!(!spec.is_empty());
    let fields: Vec<&str> = spec.split(LIBSPEC_SEP).collect();
    match fields.len() {
        1 => Ok(ReadsLibrary::new(false, fields[0], None, 0, 0)),
        2 | 3 => {
            let (file2, insertspec) = if fields.len() == 3 {
                (Some(fields[1]), fields[2])
            } else {
                (None, fields[1])
            };
            let Some(caps) = RE_INSERT.captures(insertspec) else {
                bail!(
                    "insert specification not valid: {}\nthe correct syntax is \
                     \"insertlength[{}stdev]\"",
                    insertspec,
                    INSERT_SEP
                );
            };
            let insertlength: u64 = caps[1].parse()?;
            let stdev: u64 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse())?;
            Ok(ReadsLibrary::new(true, fields[0], file2, insertlength, stdev))
        }
        _ => bail!(
            "library specification not valid: {}\nthe correct syntax is \
             \"filename[[{sep}filename2]{sep}insertlength[{isep}stdev]]\"\n\
             (filenames are not allowed to contain \"{sep}\")",
            spec,
            sep = LIBSPEC_SEP,
            isep = INSERT_SEP
        ),
    }
}

/// Fixed native-endian records: count, then per library first_seqnum,
/// insertlength, stdev and a paired flag byte.
pub fn write_libraries_table(libs: &[ReadsLibrary], out: &mut dyn Write) -> std::io::Result<()> {
    out.write_all(&(libs.len() as u64).to_ne_bytes())?;
    for rli in libs {
        out.write_all(&rli.first_seqnum.to_ne_bytes())?;
        out.write_all(&rli.insertlength.to_ne_bytes())?;
        out.write_all(&rli.stdev.to_ne_bytes())?;
        out.write_all(&[rli.paired as u8])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unpaired() {
        let rli = parse_libspec("reads.fa").unwrap();
        assert!(!rli.paired);
        assert_eq!(rli.file1, "reads.fa");
        assert!(rli.file2.is_none());
    }

    #[test]
    fn test_parse_paired_two_files() {
        let rli = parse_libspec("r1.fq:r2.fq:250-30").unwrap();
        assert!(rli.paired);
        assert_eq!(rli.file2.as_deref(), Some("r2.fq"));
        assert_eq!(rli.insertlength, 250);
        assert_eq!(rli.stdev, 30);
        assert_eq!(rli.name(), "r1.fq:r2.fq:250-30");
    }

    #[test]
    fn test_parse_paired_interleaved() {
        let rli = parse_libspec("r.fq:180").unwrap();
        assert!(rli.paired);
        assert!(rli.file2.is_none());
        assert_eq!(rli.insertlength, 180);
        assert_eq!(rli.stdev, 0);
    }

    #[test]
    fn test_parse_rejects_bad_specs() {
        assert!(parse_libspec("a:b:c:d").is_err());
        assert!(parse_libspec("r.fq:12x").is_err());
        assert!(parse_libspec("r1.fq:r2.fq:100-2-3").is_err());
    }
}
