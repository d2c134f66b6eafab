//! Per-bucket sorting of suffix positions by the remaining characters of
//! their read suffixes.
//!
//! MSD radix over 4-nucleotide chunks with an explicit stack, an
//! insertion sort below 32 elements, and a suffix that ends inside a
//! chunk ranking before every longer suffix sharing its prefix. Mirrored
//! suffixes read the original sequence backwards, complemented. Besides
//! the sorted positions an LCP table is produced whose first entry is
//! seeded from the key of the preceding bucket.

use crate::libs::twobit::TwobitView;
use std::cmp::Ordering;

const INSERTION_SORT_MAX: u64 = 31;
const CHUNK: u64 = 4;

#[inline]
fn chunk_at(words: &[u64], pos: u64) -> u8 {
    let unitoffset = (pos % 32) as u32;
    let unitindex = (pos / 32) as usize;
    if unitoffset <= 32 - CHUNK as u32 {
        ((words[unitindex] >> (2 * (32 - CHUNK as u32 - unitoffset))) & 0xff) as u8
    } else {
        let shiftleft = 2 * (unitoffset + CHUNK as u32 - 32);
        (((words[unitindex] << shiftleft) | (words[unitindex + 1] >> (64 - shiftleft))) & 0xff)
            as u8
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SrsEntry {
    seqnum: u64,
    relpos: u64,
    /// Forward storage position of the suffix start (unused for
    /// mirrored entries).
    abspos: u64,
    /// Characters of the suffix taking part in the sort (capped by the
    /// sorting depth).
    remaining: u64,
}

/// Radix key of one chunk: the zero-padded chunk value, tie-broken by how
/// many of its slots the suffix still fills (0..=4). A suffix that ends
/// early is a prefix of every suffix continuing with the same symbols and
/// therefore precedes them.
#[inline]
fn radix_key(view: &TwobitView, entry: &SrsEntry, depth: u64) -> u16 {
    let rem = entry.remaining.saturating_sub(depth);
    if rem == 0 {
        return 0;
    }
    let take = rem.min(CHUNK);
    let chunk = if entry.seqnum < view.nofseqs {
        chunk_at(view.words, entry.abspos + depth) & (0xffu8 << ((CHUNK - take) << 1))
    } else {
        let mut chunk = 0u8;
        for i in 0..take {
            chunk |= (view.logical_symbol(entry.seqnum, entry.relpos + depth + i) as u8)
                << ((3 - i) << 1);
        }
        chunk
    };
    (chunk as u16) * 5 + take as u16
}

fn cmp_suffixes(view: &TwobitView, a: &SrsEntry, b: &SrsEntry, from_depth: u64) -> Ordering {
    let mut depth = from_depth;
    loop {
        let ka = radix_key(view, a, depth);
        let kb = radix_key(view, b, depth);
        if ka != kb {
            return ka.cmp(&kb);
        }
        if ka % 5 != 4 {
            return Ordering::Equal;
        }
        depth += CHUNK;
    }
}

/// Reusable per-worker workspace.
#[derive(Debug, Default)]
pub struct ShortReadSort {
    entries: Vec<SrsEntry>,
    keys: Vec<u16>,
    tmp: Vec<SrsEntry>,
    suftab_bucket: Vec<(u64, u64)>,
    lcptab_bucket: Vec<u16>,
}

impl ShortReadSort {
    pub fn new() -> Self {
        ShortReadSort::default()
    }

    /// Sorts one bucket of `(seqnum, relpos)` suffix positions. All
    /// suffixes are known to share their first `lcp_base` characters
    /// (the LCP of the bucket's key with its predecessor), so the sort
    /// skips them. With `sorting_depth == 0` the suffixes are sorted to
    /// the read ends.
    pub fn sort_bucket(
        &mut self,
        view: &TwobitView,
        pairs: &[(u64, u64)],
        lcp_base: u16,
        sorting_depth: u64,
    ) -> (&[(u64, u64)], &[u16]) {
        let width = pairs.len();
        self.entries.clear();
        for &(seqnum, relpos) in pairs {
            let seqlen = view.logical_seq_length(seqnum);
            debug_assert!(relpos < seqlen);
            let mut remaining = seqlen - relpos;
            if sorting_depth > 0 {
                remaining = remaining.min(sorting_depth);
            }
            let abspos = if seqnum < view.nofseqs {
                view.seq_start(seqnum) + relpos
            } else {
                0
            };
            self.entries.push(SrsEntry {
                seqnum,
                relpos,
                abspos,
                remaining,
            });
        }

        if width > 1 {
            self.keys.resize(width, 0);
            self.tmp.resize(width, SrsEntry::default());
            let mut stack: Vec<(usize, usize, u64)> = vec![(0, width, lcp_base as u64)];
            while let Some((start, len, depth)) = stack.pop() {
                if len as u64 <= INSERTION_SORT_MAX {
                    self.insertion_sort_range(view, start, len, depth);
                    continue;
                }
                let mut counts = [0u32; 1280];
                for i in start..start + len {
                    let key = radix_key(view, &self.entries[i], depth);
                    self.keys[i] = key;
                    counts[key as usize] += 1;
                }
                let mut offsets = [0u32; 1280];
                for k in 1..1280 {
                    offsets[k] = offsets[k - 1] + counts[k - 1];
                }
                for i in start..start + len {
                    let slot = &mut offsets[self.keys[i] as usize];
                    self.tmp[*slot as usize] = self.entries[i];
                    *slot += 1;
                }
                self.entries[start..start + len].copy_from_slice(&self.tmp[..len]);
                // recurse into the groups whose suffixes continue
                let mut group_start = start;
                for (key, &count) in counts.iter().enumerate() {
                    if count > 0 {
                        if key % 5 == CHUNK as usize && count > 1 {
                            stack.push((group_start, count as usize, depth + CHUNK));
                        }
                        group_start += count as usize;
                    }
                }
            }
        }

        self.suftab_bucket.clear();
        self.lcptab_bucket.clear();
        for entry in self.entries.iter() {
            self.suftab_bucket.push((entry.seqnum, entry.relpos));
        }
        self.lcptab_bucket.push(lcp_base);
        for w in self.entries.windows(2) {
            let maxcmp = w[0].remaining.min(w[1].remaining);
            let mut lcp = lcp_base as u64;
            while lcp < maxcmp
                && view.logical_symbol(w[0].seqnum, w[0].relpos + lcp)
                    == view.logical_symbol(w[1].seqnum, w[1].relpos + lcp)
            {
                lcp += 1;
            }
            self.lcptab_bucket.push(lcp.min(u16::MAX as u64) as u16);
        }
        (&self.suftab_bucket, &self.lcptab_bucket)
    }

    fn insertion_sort_range(&mut self, view: &TwobitView, start: usize, len: usize, depth: u64) {
        for i in 1..len {
            let entry = self.entries[start + i];
            let mut j = i;
            while j > 0
                && cmp_suffixes(view, &entry, &self.entries[start + j - 1], depth)
                    == Ordering::Less
            {
                self.entries[start + j] = self.entries[start + j - 1];
                j -= 1;
            }
            self.entries[start + j] = entry;
        }
    }
}

/// Leading characters shared by two bucket keys: the leading equal 2-bit
/// pairs of the codes, discounting the unused high slots of the word.
pub fn codelcp(a: u64, b: u64, kmersize: u32) -> u64 {
    if a == b {
        return kmersize as u64;
    }
    let pairs = ((a ^ b).leading_zeros() / 2) as u64;
    pairs - (32 - kmersize as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::reads::Reads2Twobit;
    use std::fs;
    use tempfile::TempDir;

    fn readset(content: &str) -> (TempDir, Reads2Twobit) {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("t.fa");
        fs::write(&file, content).unwrap();
        let mut r2t = Reads2Twobit::new(dir.path().join("idx"));
        r2t.add_library(file.to_str().unwrap()).unwrap();
        r2t.encode().unwrap();
        (dir, r2t)
    }

    fn suffix_text(r2t: &Reads2Twobit, seqnum: u64, relpos: u64) -> String {
        let n = r2t.nofseqs();
        if seqnum < n {
            r2t.decode_sequence(seqnum)[relpos as usize..].to_string()
        } else {
            let rc: String = r2t
                .decode_sequence(2 * n - 1 - seqnum)
                .chars()
                .rev()
                .map(|c| match c {
                    'A' => 'T',
                    'C' => 'G',
                    'G' => 'C',
                    _ => 'A',
                })
                .collect();
            rc[relpos as usize..].to_string()
        }
    }

    #[test]
    fn test_bucket_sorted_by_suffix() {
        // all suffixes starting with "AC"
        let (_dir, r2t) = readset(">a\nACGTACTT\n>b\nTTACACAA\n>c\nGGACGG\n");
        let view = r2t.view(false);
        let pairs = vec![(0u64, 0u64), (0, 4), (1, 2), (1, 4), (2, 2)];
        let mut srs = ShortReadSort::new();
        let (sorted, lcps) = srs.sort_bucket(&view, &pairs, 2, 0);
        let texts: Vec<String> = sorted
            .iter()
            .map(|&(sn, rp)| suffix_text(&r2t, sn, rp))
            .collect();
        let mut expected = texts.clone();
        expected.sort();
        assert_eq!(texts, expected);
        assert_eq!(lcps.len(), sorted.len());
        for i in 1..texts.len() {
            let common = texts[i - 1]
                .bytes()
                .zip(texts[i].bytes())
                .take_while(|(a, b)| a == b)
                .count();
            assert_eq!(lcps[i] as usize, common, "lcp between {} and {}", i - 1, i);
        }
    }

    #[test]
    fn test_prefix_suffix_ranks_first() {
        let (_dir, r2t) = readset(">a\nGGAC\n>b\nGGACTT\n");
        let view = r2t.view(false);
        let pairs = vec![(1u64, 0u64), (0, 0)];
        let mut srs = ShortReadSort::new();
        let (sorted, lcps) = srs.sort_bucket(&view, &pairs, 2, 0);
        assert_eq!(sorted, &[(0, 0), (1, 0)]);
        assert_eq!(lcps[1], 4);
    }

    #[test]
    fn test_mirrored_suffixes_read_reverse_complement() {
        // revcompl(AAGGTC) = GACCTT: its suffixes interleave with the
        // forward suffixes of read 1
        let (_dir, r2t) = readset(">a\nAAGGTC\n>b\nGATTGA\n");
        let view = r2t.view(true);
        // logical seqnum 3 mirrors read 0; all suffixes start with "GA"
        let pairs = vec![(1u64, 0u64), (3, 0)];
        let mut srs = ShortReadSort::new();
        let (sorted, lcps) = srs.sort_bucket(&view, &pairs, 2, 0);
        let texts: Vec<String> = sorted
            .iter()
            .map(|&(sn, rp)| suffix_text(&r2t, sn, rp))
            .collect();
        // GACCTT < GATTGA
        assert_eq!(texts, vec!["GACCTT".to_string(), "GATTGA".to_string()]);
        assert_eq!(sorted[0], (3, 0));
        assert_eq!(lcps[1], 2);
    }

    #[test]
    fn test_large_bucket_uses_radix_path() {
        // 40 suffixes of one long periodic read, all starting "AC"
        let text = "AC".repeat(50);
        let content = format!(">a\n{}\n", text);
        let (_dir, r2t) = readset(&content);
        let view = r2t.view(false);
        let pairs: Vec<(u64, u64)> = (0..40).map(|i| (0u64, 2 * i as u64)).collect();
        let mut srs = ShortReadSort::new();
        let (sorted, _lcps) = srs.sort_bucket(&view, &pairs, 2, 0);
        // shorter periodic suffixes are prefixes of longer ones
        let relposes: Vec<u64> = sorted.iter().map(|&(_, rp)| rp).collect();
        let expected: Vec<u64> = (0..40).rev().map(|i| 2 * i as u64).collect();
        assert_eq!(relposes, expected);
    }

    #[test]
    fn test_sorting_depth_caps_comparison() {
        let (_dir, r2t) = readset(">a\nACGTAAAA\n>b\nACGTCCCC\n");
        let view = r2t.view(false);
        let pairs = vec![(1u64, 0u64), (0, 0)];
        let mut srs = ShortReadSort::new();
        // depth 4: both suffixes compare equal within the bound
        let (sorted, lcps) = srs.sort_bucket(&view, &pairs, 4, 4);
        assert_eq!(sorted.len(), 2);
        assert_eq!(lcps[1], 4);
        // full depth separates them
        let (sorted, _) = srs.sort_bucket(&view, &pairs, 4, 0);
        assert_eq!(sorted, &[(0, 0), (1, 0)]);
    }

    #[test]
    fn test_codelcp() {
        // ACGT vs ACGA at k=4: 3 common leading chars
        let a = 0b00_01_10_11u64;
        let b = 0b00_01_10_00u64;
        assert_eq!(codelcp(a, b, 4), 3);
        assert_eq!(codelcp(a, a, 4), 4);
        assert_eq!(codelcp(0, 0b11, 4), 3);
    }
}
