use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// ```
/// use std::io::BufRead;
/// let reader = rdk::reader("tests/data/t1.fa");
/// assert_eq!(reader.lines().collect::<Vec<_>>().len(), 4);
/// ```
pub fn reader(input: &str) -> Box<dyn BufRead> {
    let reader: Box<dyn BufRead> = if input == "stdin" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let path = std::path::Path::new(input);
        let file = match std::fs::File::open(path) {
            Err(why) => panic!("could not open {}: {}", path.display(), why),
            Ok(file) => file,
        };

        if path.extension() == Some(std::ffi::OsStr::new("gz")) {
            Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        }
    };

    reader
}

/// Fallible variant used by the encoder, which reports the file path in its
/// diagnostics instead of panicking.
pub fn open_reader(input: &str) -> Result<Box<dyn BufRead>> {
    let path = std::path::Path::new(input);
    let file = File::open(path).map_err(|e| anyhow!("{}: {}", path.display(), e))?;

    let reader: Box<dyn BufRead> = if path.extension() == Some(std::ffi::OsStr::new("gz")) {
        Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(reader)
}

pub fn writer(output: &str) -> Box<dyn Write> {
    let writer: Box<dyn Write> = if output == "stdout" {
        Box::new(BufWriter::new(std::io::stdout()))
    } else {
        Box::new(BufWriter::new(std::fs::File::create(output).unwrap()))
    };

    writer
}

pub fn file_size<P: AsRef<Path>>(path: P) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Sniff the first record byte: `>` means FASTA, `@` means FASTQ.
pub fn is_fq<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();

    let mut buffer = [0; 2];
    {
        let mut file = File::open(path)?;
        file.read_exact(&mut buffer)?;
    }

    let first = if buffer[0] == 0x1f && buffer[1] == 0x8b {
        // gzip, sniff the decompressed stream instead
        let mut decoder = flate2::read::GzDecoder::new(File::open(path)?);
        let mut buffer = [0; 1];
        decoder.read_exact(&mut buffer)?;
        buffer[0]
    } else {
        buffer[0]
    };

    match first as char {
        '>' => Ok(false),
        '@' => Ok(true),
        _ => Err(anyhow!("{}: unknown format", path.display())),
    }
}
