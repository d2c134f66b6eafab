//! Contained-read detection over a two-bit encoded read set.
//!
//! An MSD radix sort on 4-nucleotide chunks (8 bits per round) sorts the
//! reads, optionally together with their reverse complements, and marks
//! every read that is a duplicate or a strict prefix of another read.
//! Reads that fall short of a full chunk carry an *overflow* count; an
//! overflow bucket whose prefix is continued by longer reads consists
//! entirely of contained reads.

use crate::libs::bittab::Bittab;
use std::io::Write;
use std::path::Path;

const KMERSIZE: u64 = 4;
const KMERCODE_MAX: u8 = u8::MAX;
const INSERTION_SORT_MAX: u64 = 31;
const COPYNUM_MAX: u8 = u8::MAX;

/// 256, 64, 16, 4, 1 buckets at overflow levels 0..=4.
fn nofbuckets(overflow: u64) -> usize {
    1usize << ((KMERSIZE - overflow) << 1)
}

#[inline]
fn code_at_position(twobit: &[u64], pos: u64) -> u8 {
    let unitoffset = (pos % 32) as u32;
    let unitindex = (pos / 32) as usize;
    if unitoffset <= 32 - KMERSIZE as u32 {
        ((twobit[unitindex] >> (2 * (32 - KMERSIZE as u32 - unitoffset))) & 0xff) as u8
    } else {
        let shiftleft = 2 * (unitoffset + KMERSIZE as u32 - 32);
        (((twobit[unitindex] << shiftleft) | (twobit[unitindex + 1] >> (64 - shiftleft))) & 0xff)
            as u8
    }
}

#[inline]
fn revcompl8(code: u8) -> u8 {
    let reversed = ((code & 0xc0) >> 6)
        | ((code & 0x03) << 6)
        | ((code & 0x30) >> 2)
        | ((code & 0x0c) << 2);
    KMERCODE_MAX ^ reversed
}

#[derive(Debug, Clone, Copy, Default)]
struct CodeWithOverflow {
    code: u8,
    /// Number of trailing 2-bit slots past the end of the read, in 0..=4.
    overflow: u8,
}

#[derive(Debug, Clone, Copy)]
struct BucketInfo {
    offset: u64,
    nofseqs: u64,
    depth: u64,
}

pub struct Contfinder<'a> {
    twobit: &'a [u64],
    nofseqs: u64,
    logical_nofseqs: u64,
    /// Equal length including the separator; 0 switches to `seppos`.
    len: u64,
    seppos: Option<&'a [u64]>,
    contained: Bittab,
    copynum: Option<Vec<u8>>,
    seqnums: Vec<u32>,
}

impl<'a> Contfinder<'a> {
    pub fn new(
        twobit: &'a [u64],
        nofseqs: u64,
        seqlen_eqlen: u64,
        seppos: Option<&'a [u64]>,
    ) -> Self {
        assert!(nofseqs < u32::MAX as u64 / 2);
        debug_assert!(seqlen_eqlen > 0 || seppos.is_some());
        Contfinder {
            twobit,
            nofseqs,
            logical_nofseqs: nofseqs,
            len: seqlen_eqlen,
            seppos,
            contained: Bittab::new(nofseqs.max(1)),
            copynum: None,
            seqnums: Vec::new(),
        }
    }

    #[inline]
    fn correct(&self, seqnum: u64) -> u64 {
        if seqnum >= self.nofseqs {
            (self.nofseqs << 1) - 1 - seqnum
        } else {
            seqnum
        }
    }

    /// The next 8-bit radix of `seqnum` at `depth`, reverse-complemented
    /// for mirrored indices. Slots past the read end are zeroed and
    /// counted in `overflow`.
    fn get_code(&self, seqnum: u64, depth: u64) -> CodeWithOverflow {
        if seqnum < self.nofseqs {
            let (seqstart, len) = if self.len != 0 {
                (seqnum * self.len, self.len)
            } else {
                let seppos = self.seppos.unwrap();
                let seqstart = if seqnum > 0 {
                    seppos[seqnum as usize - 1] + 1
                } else {
                    0
                };
                (seqstart, seppos[seqnum as usize] - seqstart + 1)
            };
            if depth < len - 1 {
                let mut code = code_at_position(self.twobit, seqstart + depth);
                let mut overflow = 0u8;
                let remaining = len - 1 - depth;
                if remaining < KMERSIZE {
                    overflow = (KMERSIZE - remaining) as u8;
                    code &= KMERCODE_MAX - (((1u16 << (overflow << 1)) - 1) as u8);
                }
                CodeWithOverflow { code, overflow }
            } else {
                CodeWithOverflow {
                    code: 0,
                    overflow: KMERSIZE as u8,
                }
            }
        } else {
            let (endpos, len) = if self.len != 0 {
                (
                    ((self.nofseqs << 1) - seqnum) * self.len - 1 - depth,
                    self.len,
                )
            } else {
                let corrected = (self.nofseqs << 1) - seqnum - 1;
                let seppos = self.seppos.unwrap();
                let seqstart = if corrected > 0 {
                    seppos[corrected as usize - 1] + 1
                } else {
                    0
                };
                (
                    seppos[corrected as usize] - depth,
                    seppos[corrected as usize] - seqstart + 1,
                )
            };
            if depth < len - 1 {
                let remaining = len - 1 - depth;
                let pos = endpos - remaining.min(KMERSIZE);
                let mut code = revcompl8(code_at_position(self.twobit, pos));
                let mut overflow = 0u8;
                if remaining < KMERSIZE {
                    overflow = (KMERSIZE - remaining) as u8;
                    code <<= overflow << 1;
                }
                CodeWithOverflow { code, overflow }
            } else {
                CodeWithOverflow {
                    code: 0,
                    overflow: KMERSIZE as u8,
                }
            }
        }
    }

    fn seq_length(&self, corrected: u64) -> u64 {
        if self.len != 0 {
            self.len
        } else {
            let seppos = self.seppos.unwrap();
            if corrected > 0 {
                seppos[corrected as usize] - seppos[corrected as usize - 1]
            } else {
                seppos[0] + 1
            }
        }
    }

    fn mark_contains(&mut self, container: u64, contained: u64) {
        self.contained.set_bit(contained);
        if self.copynum.is_some() {
            debug_assert!(!self.contained.get_bit(container));
            let inc = self.copynum.as_ref().unwrap()[contained as usize];
            let copynum = self.copynum.as_mut().unwrap();
            if copynum[container as usize] as u16 + inc as u16 <= COPYNUM_MAX as u16 {
                copynum[container as usize] += inc;
            }
            copynum[contained as usize] = 0;
        }
    }

    /// Sorts a small bucket, marking duplicates (all but the lowest
    /// corrected seqnum) and shorter reads that are strict prefixes of
    /// longer bucket members.
    fn insertion_sort(&mut self, bucket: BucketInfo) {
        debug_assert!(bucket.nofseqs > 1);
        for i in 1..bucket.nofseqs {
            let u = self.seqnums[(bucket.offset + i) as usize] as u64;
            let ucorrected = self.correct(u);
            let ulen = self.seq_length(ucorrected);
            let mut j = i;
            while j > 0 {
                let v = self.seqnums[(bucket.offset + j - 1) as usize] as u64;
                let vcorrected = self.correct(v);
                let vlen = self.seq_length(vcorrected);
                let len = ulen.min(vlen);
                let mut unk = CodeWithOverflow::default();
                let mut vnk = CodeWithOverflow::default();
                let mut uvcmp = 0i32;
                let mut pos = bucket.depth;
                while uvcmp == 0 && pos < len {
                    unk = self.get_code(u, pos);
                    vnk = self.get_code(v, pos);
                    uvcmp = vnk.code as i32 - unk.code as i32;
                    pos += KMERSIZE;
                }
                if ulen > vlen {
                    // compare only the slots v still defines
                    let shift = (vnk.overflow as u32) << 1;
                    uvcmp = ((vnk.code as u16) >> shift) as i32 - ((unk.code as u16) >> shift) as i32;
                    if uvcmp == 0 {
                        // v is a prefix of u
                        self.mark_contains(ucorrected, vcorrected);
                        break;
                    }
                } else if ulen < vlen {
                    let shift = (unk.overflow as u32) << 1;
                    uvcmp = ((vnk.code as u16) >> shift) as i32 - ((unk.code as u16) >> shift) as i32;
                    if uvcmp == 0 {
                        // u is a prefix of v
                        self.mark_contains(vcorrected, ucorrected);
                        break;
                    }
                }
                if uvcmp < 0 {
                    break;
                }
                if uvcmp == 0 {
                    if ucorrected > vcorrected {
                        self.mark_contains(vcorrected, ucorrected);
                        break;
                    }
                    // the lower corrected seqnum keeps sliding unmarked
                }
                self.seqnums[(bucket.offset + j) as usize] = v as u32;
                j -= 1;
            }
            self.seqnums[(bucket.offset + j) as usize] = u as u32;
        }

        // attribute marked reads to the preceding non-contained member
        let mut container = self.correct(self.seqnums[bucket.offset as usize] as u64);
        for i in 1..bucket.nofseqs {
            let u = self.correct(self.seqnums[(bucket.offset + i) as usize] as u64);
            if self.contained.get_bit(u) {
                self.mark_contains(container, u);
            } else {
                container = u;
            }
        }
    }

    /// Marks a bucket of mutually equal reads, keeping one representative
    /// when `except_lowest` is set. The representative is chosen with the
    /// mirrored corrections of the original, so a palindromic pair is not
    /// eliminated against itself.
    fn mark_as_contained(&mut self, bucket: BucketInfo, except_lowest: bool) {
        debug_assert!(bucket.nofseqs > 0);
        let mut from = 0u64;
        let mut to = bucket.nofseqs;
        let mut container = 0u64;
        if except_lowest {
            if bucket.nofseqs == 1 {
                return;
            }
            let first = self.seqnums[bucket.offset as usize] as u64;
            let last =
                self.correct(self.seqnums[(bucket.offset + bucket.nofseqs - 1) as usize] as u64);
            from = 1;
            if first >= self.nofseqs || last < first {
                from -= 1;
                to -= 1;
                container = last;
            } else {
                container = first;
                if first == last {
                    // palindromic
                    to -= 1;
                }
            }
        }
        for i in from..to {
            let corrected = self.correct(self.seqnums[(bucket.offset + i) as usize] as u64);
            if corrected != container || !except_lowest {
                self.mark_contains(container, corrected);
            }
        }
    }

    /// Equal-length read sets have no overflow buckets below the terminal
    /// depth, so the radix rounds stay on the fast path.
    fn radixsort_eqlen(&mut self, all: BucketInfo) {
        let mut bucketsize = [0u64; 256];
        let mut bucketindex = [0u64; 256];

        for i in 0..all.nofseqs {
            bucketsize[self.get_code(i, 0).code as usize] += 1;
        }
        bucketindex[0] = 0;
        for i in 1..256 {
            bucketindex[i] = bucketindex[i - 1] + bucketsize[i - 1];
        }
        for i in 0..all.nofseqs {
            let code = self.get_code(i, 0).code as usize;
            self.seqnums[(all.offset + bucketindex[code]) as usize] = i as u32;
            bucketindex[code] += 1;
        }

        if self.len <= KMERSIZE {
            let mut offset = all.offset;
            for size in bucketsize {
                if size > 1 {
                    self.mark_as_contained(
                        BucketInfo {
                            offset,
                            nofseqs: size,
                            depth: 0,
                        },
                        true,
                    );
                }
                offset += size;
            }
            return;
        }

        let maxbucketsize = bucketsize.iter().copied().max().unwrap_or(0);
        let mut oracle = vec![0u8; maxbucketsize as usize];
        let mut sorted = vec![0u32; maxbucketsize as usize];
        let mut stack: Vec<BucketInfo> = Vec::with_capacity(1024);

        let mut offset = all.offset;
        for size in bucketsize {
            if size > 1 {
                let subbucket = BucketInfo {
                    offset,
                    nofseqs: size,
                    depth: KMERSIZE,
                };
                if size <= INSERTION_SORT_MAX {
                    self.insertion_sort(subbucket);
                } else {
                    stack.push(subbucket);
                }
            }
            offset += size;
        }

        while let Some(bucket) = stack.pop() {
            let mut bucketsize = [0u64; 256];
            for i in 0..bucket.nofseqs {
                let seqnum = self.seqnums[(bucket.offset + i) as usize] as u64;
                oracle[i as usize] = self.get_code(seqnum, bucket.depth).code;
            }
            for i in 0..bucket.nofseqs {
                bucketsize[oracle[i as usize] as usize] += 1;
            }
            bucketindex[0] = 0;
            for i in 1..256 {
                bucketindex[i] = bucketindex[i - 1] + bucketsize[i - 1];
            }
            for i in 0..bucket.nofseqs {
                sorted[bucketindex[oracle[i as usize] as usize] as usize] =
                    self.seqnums[(bucket.offset + i) as usize];
                bucketindex[oracle[i as usize] as usize] += 1;
            }
            self.seqnums[bucket.offset as usize..(bucket.offset + bucket.nofseqs) as usize]
                .copy_from_slice(&sorted[..bucket.nofseqs as usize]);

            let depth = bucket.depth + KMERSIZE;
            let mut offset = bucket.offset;
            for size in bucketsize {
                if size > 1 {
                    let subbucket = BucketInfo {
                        offset,
                        nofseqs: size,
                        depth,
                    };
                    if depth < self.len {
                        if size <= INSERTION_SORT_MAX {
                            self.insertion_sort(subbucket);
                        } else {
                            stack.push(subbucket);
                        }
                    } else {
                        self.mark_as_contained(subbucket, true);
                    }
                }
                offset += size;
            }
        }
    }

    /// Distributes one parent bucket into (overflow, code) sub-buckets:
    /// no-overflow buckets are sub-sorted, overflow buckets resolve to
    /// containment marks against the longer-sibling tables.
    fn process_buckets(
        &mut self,
        parent: BucketInfo,
        bucketsize: &[Vec<u64>],
        stack: &mut Vec<BucketInfo>,
        bucketcontained: &mut [Bittab],
    ) {
        for tab in bucketcontained.iter_mut() {
            tab.clear_all();
        }
        let mut offset = parent.offset;
        let depth = parent.depth + KMERSIZE;
        for i in 0..nofbuckets(0) {
            let size = bucketsize[0][i];
            if size > 0 {
                if size > 1 {
                    let subbucket = BucketInfo {
                        offset,
                        nofseqs: size,
                        depth,
                    };
                    if size <= INSERTION_SORT_MAX {
                        self.insertion_sort(subbucket);
                    } else {
                        stack.push(subbucket);
                    }
                }
                for overflow in 1..=KMERSIZE {
                    bucketcontained[overflow as usize - 1].set_bit((i >> (overflow << 1)) as u64);
                }
            }
            offset += size;
        }
        for overflow in 1..=KMERSIZE {
            for i in 0..nofbuckets(overflow) {
                let size = bucketsize[overflow as usize][i];
                if size > 0 {
                    let subbucket = BucketInfo {
                        offset,
                        nofseqs: size,
                        depth,
                    };
                    let has_longer_sibling =
                        bucketcontained[overflow as usize - 1].get_bit(i as u64);
                    // a longer sibling contains every member; otherwise the
                    // members are equal reads and the lowest one survives
                    self.mark_as_contained(subbucket, !has_longer_sibling);
                    // members still extend past any deeper overflow level
                    for t in overflow + 1..=KMERSIZE {
                        bucketcontained[t as usize - 1]
                            .set_bit((i >> ((t - overflow) << 1)) as u64);
                    }
                }
                offset += size;
            }
        }
    }

    fn radixsort(&mut self, all: BucketInfo) {
        let mut bucketsize: Vec<Vec<u64>> =
            (0..=KMERSIZE).map(|ov| vec![0u64; nofbuckets(ov)]).collect();
        let mut bucketindex: Vec<Vec<u64>> =
            (0..=KMERSIZE).map(|ov| vec![0u64; nofbuckets(ov)]).collect();
        let mut bucketcontained: Vec<Bittab> = (1..=KMERSIZE)
            .map(|ov| Bittab::new(nofbuckets(ov) as u64))
            .collect();

        for i in 0..all.nofseqs {
            let k = self.get_code(i, 0);
            bucketsize[k.overflow as usize][((k.code as u16) >> (k.overflow << 1)) as usize] += 1;
        }
        let mut baseindex = 0u64;
        for overflow in 0..=KMERSIZE as usize {
            bucketindex[overflow][0] = baseindex;
            for i in 1..nofbuckets(overflow as u64) {
                bucketindex[overflow][i] = bucketindex[overflow][i - 1] + bucketsize[overflow][i - 1];
            }
            let last = nofbuckets(overflow as u64) - 1;
            baseindex = bucketindex[overflow][last] + bucketsize[overflow][last];
        }
        for i in 0..all.nofseqs {
            let k = self.get_code(i, 0);
            let idx =
                &mut bucketindex[k.overflow as usize][((k.code as u16) >> (k.overflow << 1)) as usize];
            self.seqnums[(all.offset + *idx) as usize] = i as u32;
            *idx += 1;
        }

        let maxbucketsize = bucketsize[0].iter().copied().max().unwrap_or(0);
        let mut oracle = vec![0u8; maxbucketsize as usize];
        let mut overflows = vec![0u8; maxbucketsize as usize];
        let mut sorted = vec![0u32; maxbucketsize as usize];
        let mut stack: Vec<BucketInfo> = Vec::with_capacity(1024);

        self.process_buckets(all, &bucketsize, &mut stack, &mut bucketcontained);

        while let Some(bucket) = stack.pop() {
            for sizes in bucketsize.iter_mut() {
                sizes.fill(0);
            }
            for i in 0..bucket.nofseqs {
                let seqnum = self.seqnums[(bucket.offset + i) as usize] as u64;
                let k = self.get_code(seqnum, bucket.depth);
                oracle[i as usize] = ((k.code as u16) >> (k.overflow << 1)) as u8;
                overflows[i as usize] = k.overflow;
            }
            for i in 0..bucket.nofseqs as usize {
                bucketsize[overflows[i] as usize][oracle[i] as usize] += 1;
            }
            let mut baseindex = 0u64;
            for overflow in 0..=KMERSIZE as usize {
                bucketindex[overflow][0] = baseindex;
                for i in 1..nofbuckets(overflow as u64) {
                    bucketindex[overflow][i] =
                        bucketindex[overflow][i - 1] + bucketsize[overflow][i - 1];
                }
                let last = nofbuckets(overflow as u64) - 1;
                baseindex = bucketindex[overflow][last] + bucketsize[overflow][last];
            }
            for i in 0..bucket.nofseqs as usize {
                let idx = &mut bucketindex[overflows[i] as usize][oracle[i] as usize];
                sorted[*idx as usize] = self.seqnums[bucket.offset as usize + i];
                *idx += 1;
            }
            self.seqnums[bucket.offset as usize..(bucket.offset + bucket.nofseqs) as usize]
                .copy_from_slice(&sorted[..bucket.nofseqs as usize]);

            self.process_buckets(bucket, &bucketsize, &mut stack, &mut bucketcontained);
        }
    }

    /// Runs the detection. With `mirrored` the reverse complements take
    /// part; `calculate_copynum` (equal length only) accumulates how many
    /// copies each surviving read represents.
    pub fn run(&mut self, mirrored: bool, calculate_copynum: bool) {
        if self.nofseqs == 0 {
            return;
        }
        self.contained = Bittab::new(self.nofseqs);
        self.logical_nofseqs = if mirrored {
            self.nofseqs << 1
        } else {
            self.nofseqs
        };
        self.seqnums = vec![0u32; self.logical_nofseqs as usize];
        if calculate_copynum {
            // the overflow path cannot attribute copy numbers
            assert!(self.len > 0, "copy numbers require equal-length reads");
            self.copynum = Some(vec![1u8; self.nofseqs as usize]);
        }
        let all = BucketInfo {
            offset: 0,
            nofseqs: self.logical_nofseqs,
            depth: 0,
        };
        if self.len > 0 {
            self.radixsort_eqlen(all);
        } else {
            self.radixsort(all);
        }
    }

    pub fn contained(&self) -> &Bittab {
        &self.contained
    }

    pub fn into_contained(self) -> Bittab {
        self.contained
    }

    pub fn nofcontained(&self) -> u64 {
        self.contained.count_ones()
    }

    pub fn copynum(&self) -> Option<&[u8]> {
        self.copynum.as_deref()
    }

    /// Sorted order of the logical seqnums whose read survived.
    pub fn sorted_noncontained(&self) -> Vec<u64> {
        self.seqnums
            .iter()
            .map(|&s| s as u64)
            .filter(|&s| !self.contained.get_bit(self.correct(s)))
            .collect()
    }

    /// `.clb`: read count then the raw contained-bit words.
    pub fn write_cntlist(&self, path: &Path) -> std::io::Result<()> {
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        out.write_all(&self.nofseqs.to_ne_bytes())?;
        for word in self.contained.words() {
            out.write_all(&word.to_ne_bytes())?;
        }
        Ok(())
    }

    /// `.cpn`: one byte per non-contained read.
    pub fn write_copynum(&self, path: &Path) -> std::io::Result<()> {
        let copynum = self.copynum.as_ref().expect("copy numbers not calculated");
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        let bytes: Vec<u8> = copynum.iter().copied().filter(|&cn| cn > 0).collect();
        out.write_all(&bytes)
    }
}
