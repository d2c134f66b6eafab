//! The ordered bucket-key table: unique k-mer codes, per-bucket counters
//! and the partial-sum left borders.
//!
//! Keys come from either enumerating the first k-mer of every sequence
//! (both strands for mirrored views) or from random sampling across the
//! encoding. A terminal all-ones sentinel catches every code beyond the
//! last real key, so lookups never fall off the table.

use crate::libs::twobit::{kmer_at, kmer_revcompl, mask_right, TwobitView};
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;

const NOFSAMPLES_MIN: u64 = 2;

#[derive(Debug)]
pub struct BucketKeys {
    codes: Vec<u64>,
    /// `codes.len() + 1` entries. During counting, entry `i` is the
    /// number of observations of `codes[i]`; after [`partial_sums`] it is
    /// the start border of bucket `i`, with the last entry holding the
    /// total count.
    leftborder: Vec<u32>,
    bscache: Vec<(u64, u64)>,
    kmersize: u32,
}

impl BucketKeys {
    /// Sorts, deduplicates and closes the key list with the sentinel.
    pub fn new(mut codes: Vec<u64>, kmersize: u32) -> Self {
        codes.push(mask_right(kmersize));
        codes.par_sort_unstable();
        codes.dedup();
        let num = codes.len();
        BucketKeys {
            codes,
            leftborder: vec![0u32; num + 1],
            bscache: Vec::new(),
            kmersize,
        }
    }

    pub fn num_codes(&self) -> u64 {
        self.codes.len() as u64
    }

    pub fn kmersize(&self) -> u32 {
        self.kmersize
    }

    pub fn code(&self, idx: u64) -> u64 {
        self.codes[idx as usize]
    }

    pub fn codes(&self) -> &[u64] {
        &self.codes
    }

    pub fn leftborder(&self) -> &[u32] {
        &self.leftborder
    }

    /// Evenly spaced (index, code) anchors narrowing the binary search;
    /// `depth` grows with the decimal magnitude of the table.
    pub fn fill_bscache(&mut self, add_depth: u32) {
        let num = self.codes.len() as u64;
        let depth = add_depth + (num as f64).log10() as u32;
        let cachesize = 1u64 << (depth + 1);
        let width = num / cachesize;
        if cachesize >= num || width == 0 {
            return;
        }
        let mut current = width;
        self.bscache = Vec::with_capacity(cachesize as usize);
        for _ in 0..cachesize {
            if current >= num {
                break;
            }
            self.bscache.push((current, self.codes[current as usize]));
            current += width;
        }
    }

    /// Index of the least code `>= code`, over the whole table.
    pub fn find_accu(&self, code: u64) -> Option<u64> {
        if code <= self.codes[0] {
            return Some(0);
        }
        let (lo, hi) = if self.bscache.is_empty() {
            (1usize, self.codes.len())
        } else {
            let p = self.bscache.partition_point(|&(_, c)| c < code);
            let lo = if p == 0 {
                1
            } else {
                self.bscache[p - 1].0 as usize + 1
            };
            let hi = if p < self.bscache.len() {
                self.bscache[p].0 as usize + 1
            } else {
                self.codes.len()
            };
            (lo, hi)
        };
        let idx = lo + self.codes[lo..hi].partition_point(|&c| c < code);
        if idx < self.codes.len() {
            Some(idx as u64)
        } else {
            None
        }
    }

    /// Same lookup restricted to the window of the current part; the
    /// caller guarantees `code <= codes[maxidx]`.
    pub fn find_insert(&self, code: u64, minidx: u64, maxidx: u64) -> u64 {
        let lo = minidx as usize;
        let hi = maxidx as usize + 1;
        let idx = lo + self.codes[lo..hi].partition_point(|&c| c < code);
        debug_assert!(idx <= maxidx as usize);
        idx as u64
    }

    #[inline]
    pub fn count_increment(&mut self, idx: u64) {
        self.leftborder[idx as usize] += 1;
    }

    /// Turns the observation counts into start borders; returns the
    /// largest bucket size.
    pub fn partial_sums(&mut self) -> u64 {
        let mut sum = 0u32;
        let mut maxbucketsize = 0u32;
        for entry in self.leftborder.iter_mut() {
            let count = *entry;
            maxbucketsize = maxbucketsize.max(count);
            *entry = sum;
            sum += count;
        }
        maxbucketsize as u64
    }

    /// Start border of bucket `idx` (valid after [`partial_sums`];
    /// `idx == num_codes()` yields the total count).
    #[inline]
    pub fn get_leftborder(&self, idx: u64) -> u64 {
        self.leftborder[idx as usize] as u64
    }

    pub fn total_count(&self) -> u64 {
        *self.leftborder.last().unwrap() as u64
    }

    /// Code value strictly below the window starting at `minidx`
    /// (0 for the first bucket, which admits code 0 itself).
    pub fn idx_to_min_code(&self, minidx: u64) -> u64 {
        if minidx == 0 {
            0
        } else {
            self.codes[minidx as usize - 1]
        }
    }

    pub fn idx_to_max_code(&self, maxidx: u64) -> u64 {
        self.codes[maxidx as usize]
    }
}

/// The first k-mer of every sufficiently long sequence, on both strands
/// for mirrored views.
pub fn collect_first_codes(view: &TwobitView, kmersize: u32) -> Vec<u64> {
    let mut codes = Vec::with_capacity(
        (view.logical_nofseqs() as usize).min(1 << 20).max(16),
    );
    for (start, end, _) in view.segments() {
        if end - start >= kmersize as u64 {
            codes.push(kmer_at(view.words, start, kmersize));
            if view.mirrored {
                codes.push(kmer_revcompl(
                    kmer_at(view.words, end - kmersize as u64, kmersize),
                    kmersize,
                ));
            }
        }
    }
    codes
}

/// Sample size: one key per `sampling_factor` positions that can start a
/// k-mer, never fewer than two.
pub fn calculate_nofsamples(view: &TwobitView, kmersize: u32, sampling_factor: u32) -> u64 {
    let logical_total = if view.mirrored {
        2 * view.total_length + 1
    } else {
        view.total_length
    };
    let mut nofkmers = logical_total;
    let nofnonkmers = (kmersize as u64 + 1) * view.logical_nofseqs() - 1;
    if nofnonkmers < nofkmers {
        nofkmers -= nofnonkmers;
    }
    (nofkmers / sampling_factor as u64).max(NOFSAMPLES_MIN)
}

/// Strictly increasing random positions with gaps in
/// `[1, 2*factor - factor/16]`; positions on separators or too close to a
/// sequence end are rerolled, wrap-arounds trigger a final sort.
pub fn collect_sample_codes(
    view: &TwobitView,
    kmersize: u32,
    sampling_factor: u32,
    rng: &mut StdRng,
) -> Vec<u64> {
    let numofsamples = calculate_nofsamples(view, kmersize, sampling_factor);
    let logical_total = if view.mirrored {
        2 * view.total_length + 1
    } else {
        view.total_length
    };
    let randmax =
        (2 * sampling_factor as u64 - sampling_factor as u64 / 16).min(logical_total);

    let valid_forward = |pos: u64| -> bool {
        match view.pos_to_seq(pos) {
            None => false,
            Some((_, relpos, seqlen)) => relpos + kmersize as u64 <= seqlen,
        }
    };
    let valid = |pos: u64| -> bool {
        if pos >= view.total_length {
            // mirrored half: test the forward image
            valid_forward(2 * view.total_length - pos)
        } else {
            valid_forward(pos)
        }
    };

    // linear probe from the drawn position; some valid position exists
    // because the longest read can start a k-mer
    let mut sorted = true;
    let probe = |mut next: u64, sorted: &mut bool| -> u64 {
        while !valid(next) {
            next += 1;
            if next >= logical_total {
                next = 0;
                *sorted = false;
            }
        }
        next
    };
    let mut positions = Vec::with_capacity(numofsamples as usize);
    let first = probe(rng.gen_range(0..=randmax), &mut sorted);
    positions.push(first);
    for _ in 1..numofsamples {
        let mut next = positions[positions.len() - 1] + rng.gen_range(0..=randmax) + 1;
        if next >= logical_total {
            next = 0;
            sorted = false;
        }
        next = probe(next, &mut sorted);
        positions.push(next);
    }
    if !sorted {
        positions.sort_unstable();
    }

    positions
        .into_iter()
        .map(|pos| {
            if pos >= view.total_length {
                kmer_revcompl(
                    kmer_at(
                        view.words,
                        2 * view.total_length - pos - kmersize as u64,
                        kmersize,
                    ),
                    kmersize,
                )
            } else {
                kmer_at(view.words, pos, kmersize)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::twobit::LenMode;
    use rand::SeedableRng;

    #[test]
    fn test_new_sorts_dedups_and_appends_sentinel() {
        let keys = BucketKeys::new(vec![9, 3, 9, 1, 3], 4);
        assert_eq!(keys.codes(), &[1, 3, 9, mask_right(4)]);
        assert_eq!(keys.num_codes(), 4);
    }

    #[test]
    fn test_find_accu_without_cache() {
        let keys = BucketKeys::new(vec![10, 20, 30], 4);
        assert_eq!(keys.find_accu(0), Some(0));
        assert_eq!(keys.find_accu(10), Some(0));
        assert_eq!(keys.find_accu(11), Some(1));
        assert_eq!(keys.find_accu(20), Some(1));
        assert_eq!(keys.find_accu(31), Some(3));
        assert_eq!(keys.find_accu(mask_right(4)), Some(3));
    }

    #[test]
    fn test_find_accu_with_cache_matches_plain_search() {
        let codes: Vec<u64> = (0..5000u64).map(|i| i * 3).collect();
        let mut keys = BucketKeys::new(codes, 16);
        let plain: Vec<Option<u64>> = (0..15010u64).map(|c| keys.find_accu(c)).collect();
        keys.fill_bscache(1);
        assert!(!keys.bscache.is_empty());
        for (c, expected) in plain.iter().enumerate() {
            assert_eq!(keys.find_accu(c as u64), *expected, "code {}", c);
        }
    }

    #[test]
    fn test_find_insert_window() {
        let keys = BucketKeys::new(vec![10, 20, 30, 40], 4);
        assert_eq!(keys.find_insert(20, 1, 3), 1);
        assert_eq!(keys.find_insert(25, 1, 3), 2);
        assert_eq!(keys.find_insert(40, 2, 3), 3);
    }

    #[test]
    fn test_partial_sums() {
        let mut keys = BucketKeys::new(vec![10, 20, 30], 4);
        for (idx, count) in [(0u64, 3u32), (1, 5), (2, 2), (3, 1)] {
            for _ in 0..count {
                keys.count_increment(idx);
            }
        }
        let maxbucketsize = keys.partial_sums();
        assert_eq!(maxbucketsize, 5);
        assert_eq!(keys.leftborder(), &[0, 3, 8, 10, 11]);
        assert_eq!(keys.total_count(), 11);
        assert_eq!(keys.get_leftborder(2), 8);
    }

    #[test]
    fn test_min_max_codes() {
        let keys = BucketKeys::new(vec![10, 20, 30], 4);
        assert_eq!(keys.idx_to_min_code(0), 0);
        assert_eq!(keys.idx_to_min_code(2), 20);
        assert_eq!(keys.idx_to_max_code(1), 20);
    }

    #[test]
    fn test_collect_sample_codes_reproducible() {
        // synthetic equal-length view: 4 sequences of 32+1 symbols
        let words: Vec<u64> = vec![0x0123456789abcdef; 5];
        let view = TwobitView {
            words: &words,
            total_length: 4 * 33 - 1,
            nofseqs: 4,
            len_mode: LenMode::Equal(33),
            mirrored: false,
        };
        let mut rng1 = StdRng::seed_from_u64(7);
        let mut rng2 = StdRng::seed_from_u64(7);
        let a = collect_sample_codes(&view, 8, 4, &mut rng1);
        let b = collect_sample_codes(&view, 8, 4, &mut rng2);
        assert_eq!(a, b);
        assert_eq!(a.len() as u64, calculate_nofsamples(&view, 8, 4));
    }
}
