//! Rolling k-mer code enumeration over a two-bit encoded read set.
//!
//! Both the forward code and its reverse complement are maintained with
//! one shift per nucleotide; the storage word is reloaded only when the
//! shift counter runs dry. No k-mer crosses a separator: scanning walks
//! the separator-free segments of the view. Reverse-complement codes are
//! emitted for mirrored views, attributed to the mirror seqnum.

use crate::libs::twobit::{kmer_at, kmer_revcompl, mask_right, TwobitView};

/// Emits `(code, seqnum, relpos)` for every k-mer start of the segment
/// `[startpos, startpos+len)`. Positions whose suffix would be shorter
/// than `skip_shorter` are suppressed.
#[allow(clippy::too_many_arguments)]
fn kmerscan_range<F>(
    twobit: &[u64],
    kmersize: u32,
    skip_shorter: u32,
    startpos: u64,
    len: u64,
    fseqnum: u64,
    rseqnum: u64,
    max_unit_index: u64,
    emit_rc: bool,
    process: &mut F,
) where
    F: FnMut(u64, u64, u64),
{
    debug_assert!(len >= skip_shorter as u64 && skip_shorter >= kmersize);
    let maskright = mask_right(kmersize);
    let shiftleft = 2 * (kmersize - 1);
    let lastpossiblepos = len - skip_shorter as u64;
    let lastfrelpos = len - kmersize as u64;

    let mut fcode = kmer_at(twobit, startpos, kmersize);
    let mut rccode = kmer_revcompl(fcode, kmersize);
    process(fcode, fseqnum, 0);
    if emit_rc && lastfrelpos <= lastpossiblepos {
        process(rccode, rseqnum, lastfrelpos);
    }

    let mut unitindex = (startpos + kmersize as u64) / 32;
    let mut currentencoding = twobit[unitindex as usize];
    let mut shiftright = 2 * (31 - ((startpos + kmersize as u64) % 32)) as u32;
    for frelpos in 1..=lastfrelpos {
        let cc = (currentencoding >> shiftright) & 3;
        fcode = ((fcode << 2) | cc) & maskright;
        rccode = (rccode >> 2) | ((cc ^ 3) << shiftleft);
        if frelpos <= lastpossiblepos {
            process(fcode, fseqnum, frelpos);
        }
        if emit_rc && lastfrelpos - frelpos <= lastpossiblepos {
            process(rccode, rseqnum, lastfrelpos - frelpos);
        }
        if shiftright > 0 {
            shiftright -= 2;
        } else {
            debug_assert!(unitindex < max_unit_index || frelpos == lastfrelpos);
            if unitindex < max_unit_index {
                unitindex += 1;
                currentencoding = twobit[unitindex as usize];
                shiftright = 62;
            }
        }
    }
}

/// Scans every segment of the view. Segments shorter than `skip_shorter`
/// contribute nothing.
pub fn kmerscan<F>(view: &TwobitView, kmersize: u32, skip_shorter: u32, mut process: F)
where
    F: FnMut(u64, u64, u64),
{
    debug_assert!((2..=32).contains(&kmersize) && skip_shorter >= kmersize);
    let max_unit_index = view.max_unit_index();
    let logical = view.logical_nofseqs();
    for (start, end, fseqnum) in view.segments() {
        let len = end - start;
        if len >= skip_shorter as u64 {
            kmerscan_range(
                view.words,
                kmersize,
                skip_shorter,
                start,
                len,
                fseqnum,
                logical - 1 - fseqnum,
                max_unit_index,
                view.mirrored,
                &mut process,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::reads::Reads2Twobit;
    use crate::libs::twobit::code_to_bases;
    use std::fs;
    use tempfile::TempDir;

    fn view_of(content: &str) -> (TempDir, Reads2Twobit) {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("t.fa");
        fs::write(&file, content).unwrap();
        let mut r2t = Reads2Twobit::new(dir.path().join("idx"));
        r2t.add_library(file.to_str().unwrap()).unwrap();
        r2t.encode().unwrap();
        (dir, r2t)
    }

    #[test]
    fn test_acgt_k3_forward_and_revcompl() {
        let (_dir, r2t) = view_of(">s\nACGT\n");
        let mut emitted = Vec::new();
        kmerscan(&r2t.view(true), 3, 3, |code, seqnum, relpos| {
            emitted.push((code, seqnum, relpos));
        });
        // ACG = 6 at relpos 0, CGT = 27 at relpos 1, and the reverse
        // complements at mirrored relpos len-k-relpos
        assert!(emitted.contains(&(6, 0, 0)));
        assert!(emitted.contains(&(27, 0, 1)));
        // revcompl(ACG) = CGT on the mirror read, revcompl(CGT) = ACG
        assert!(emitted.contains(&(27, 1, 1)));
        assert!(emitted.contains(&(6, 1, 0)));
        assert_eq!(emitted.len(), 4);
    }

    #[test]
    fn test_counts_per_segment() {
        let (_dir, r2t) = view_of(">a\nACGTACGTAC\n>b\nTTTTGGGG\n");
        let k = 4u32;
        let mut fwd_counts = vec![0u64; 2];
        kmerscan(&r2t.view(false), k, k, |_code, seqnum, _relpos| {
            fwd_counts[seqnum as usize] += 1;
        });
        // L - k + 1 per segment
        assert_eq!(fwd_counts, vec![7, 5]);

        let mut total = 0u64;
        kmerscan(&r2t.view(true), k, k, |_, _, _| total += 1);
        assert_eq!(total, 2 * (7 + 5));
    }

    #[test]
    fn test_codes_match_decoded_text() {
        let (_dir, r2t) = view_of(">a\nGATTACACAT\n>b\nCCCGTGTGAA\n");
        let k = 5u32;
        let view = r2t.view(false);
        kmerscan(&view, k, k, |code, seqnum, relpos| {
            let seq = r2t.decode_sequence(seqnum);
            let expected = &seq[relpos as usize..relpos as usize + k as usize];
            assert_eq!(code_to_bases(code, k), expected);
        });
    }

    #[test]
    fn test_mirrored_codes_match_revcompl_text() {
        let (_dir, r2t) = view_of(">a\nGATTACACAT\n>b\nCCGTGTGAAT\n");
        let k = 4u32;
        let view = r2t.view(true);
        let n = r2t.nofseqs();
        kmerscan(&view, k, k, |code, seqnum, relpos| {
            if seqnum >= n {
                let original = r2t.decode_sequence(2 * n - 1 - seqnum);
                let rc: String = original
                    .chars()
                    .rev()
                    .map(|c| match c {
                        'A' => 'T',
                        'C' => 'G',
                        'G' => 'C',
                        _ => 'A',
                    })
                    .collect();
                let expected = &rc[relpos as usize..relpos as usize + k as usize];
                assert_eq!(code_to_bases(code, k), expected);
            }
        });
    }

    #[test]
    fn test_skip_shorter_gates_tail_positions() {
        let (_dir, r2t) = view_of(">a\nACGTACGTAC\n");
        let mut relposes = Vec::new();
        kmerscan(&r2t.view(false), 4, 6, |_code, _seqnum, relpos| {
            relposes.push(relpos);
        });
        // only suffixes of length >= 6 contribute: relpos 0..=4
        assert_eq!(relposes, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_short_segments_skipped() {
        let (_dir, r2t) = view_of(">a\nACG\n>b\nACGTACGT\n");
        let mut seqnums = Vec::new();
        kmerscan(&r2t.view(false), 4, 4, |_c, s, _r| seqnums.push(s));
        assert!(seqnums.iter().all(|&s| s == 1));
    }
}
