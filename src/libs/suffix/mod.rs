//! The two-pass external-memory suffix sorter.
//!
//! Pass one enumerates k-mer codes and accumulates per-bucket counts
//! against the bucket-key table; a prefix sum turns the counts into left
//! borders. The bucket universe is then partitioned into memory-bounded
//! parts. Per part, a second scan inserts each k-mer's source position
//! into its bucket at a decrementing cursor, and the buckets are sorted
//! by the short-read radix sorter, optionally on a fixed worker pool over
//! disjoint bucket ranges.

pub mod bucketkeys;
pub mod codepos;
pub mod kmerscan;
pub mod parts;
pub mod radix;
pub mod seqnumrelpos;
pub mod shortreadsort;
pub mod spmsuftab;

use anyhow::{anyhow, bail, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Mutex;

use crate::libs::bitpack::required_uint_bits;
use crate::libs::pqueue::PriorityQueue;
use crate::libs::twobit::TwobitView;
use bucketkeys::BucketKeys;
use codepos::{CodeBuffer, CodePosBuffer};
use kmerscan::kmerscan;
use parts::{Part, SuftabParts};
use radix::{radix_sort_pairs, radix_sort_u64};
use seqnumrelpos::SeqnumRelpos;
use shortreadsort::{codelcp, ShortReadSort};
use spmsuftab::{SpmSuftab, SpmSuftabWriter};

const MAX_FLUSH_ROUNDS: u64 = 400;
const ADD_BSCACHE_DEPTH: u32 = 1;

#[derive(Debug, Clone)]
pub struct SuffixSortOptions {
    pub kmersize: u32,
    /// 0 means `kmersize`.
    pub skip_shorter: u32,
    pub numofparts: u32,
    pub memlimit: Option<u64>,
    /// 0 sorts to the read ends.
    pub sorting_depth: u64,
    pub sampling_factor: u32,
    pub use_firstcodes: bool,
    pub threads: u32,
    pub seed: u64,
}

impl Default for SuffixSortOptions {
    fn default() -> Self {
        SuffixSortOptions {
            kmersize: 14,
            skip_shorter: 0,
            numofparts: 1,
            memlimit: None,
            sorting_depth: 0,
            sampling_factor: 50,
            use_firstcodes: false,
            threads: 1,
            seed: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct SuffixSortStats {
    pub different_codes: u64,
    pub total_count: u64,
    pub maxbucketsize: u64,
    pub numofparts: u32,
    pub largest_width: u64,
    pub accum_flushes: u32,
    pub insert_flushes: u32,
}

/// Per-bucket consumer of the sorted output: part number, bucket key,
/// sorted `(seqnum, relpos)` positions, LCP table.
pub type BucketProcess<'a> = &'a mut dyn FnMut(u32, u64, &[(u64, u64)], &[u16]);

fn accum_flush(
    keys: &mut BucketKeys,
    buf: &mut CodeBuffer,
    temp: &mut Vec<u64>,
    total: &mut u64,
    flushes: &mut u32,
) {
    if buf.next_free() == 0 {
        return;
    }
    radix_sort_u64(&mut buf.space, temp);
    let mut subject = keys
        .find_accu(buf.space[0])
        .expect("sentinel closes the key table");
    for i in 0..buf.space.len() {
        let code = buf.space[i];
        while code > keys.code(subject) {
            subject += 1;
        }
        keys.count_increment(subject);
    }
    *total += buf.next_free() as u64;
    *flushes += 1;
    buf.clear();
}

#[allow(clippy::too_many_arguments)]
fn insert_flush(
    view: &TwobitView,
    keys: &BucketKeys,
    snrp: &SeqnumRelpos,
    spmsuftab: &mut SpmSuftab,
    minindex: u64,
    cursors: &mut [u32],
    buf: &mut CodePosBuffer,
    temp: &mut Vec<(u64, u64)>,
    total: &mut u64,
    flushes: &mut u32,
) {
    if buf.space.is_empty() {
        return;
    }
    radix_sort_pairs(&mut buf.space, temp);
    let maxindex = minindex + cursors.len() as u64 - 1;
    let mut subject = keys.find_insert(buf.space[0].0, minindex, maxindex);
    for i in 0..buf.space.len() {
        let (code, value) = buf.space[i];
        while code > keys.code(subject) {
            subject += 1;
        }
        let cursor = &mut cursors[(subject - minindex) as usize];
        *cursor -= 1;
        let stored = if spmsuftab.use_bits_for_positions() {
            view.logical_position(snrp.seqnum(value), snrp.relpos(value))
        } else {
            value
        };
        spmsuftab.set(*cursor as u64, stored);
    }
    *total += buf.space.len() as u64;
    *flushes += 1;
    buf.clear();
}

/// Splits one part's bucket range into `threads` sub-ranges of roughly
/// even suffix width.
fn evenly_divide_part(keys: &BucketKeys, part: &Part, threads: u32) -> Vec<(u64, u64)> {
    if threads <= 1 || part.minindex == part.maxindex {
        return vec![(part.minindex, part.maxindex)];
    }
    let width = part.widthofpart;
    let widthofrange = width / threads as u64;
    let mut remainder = width % threads as u64;
    let leftborder = keys.leftborder();
    let mut ranges = Vec::with_capacity(threads as usize);
    let mut offset = keys.get_leftborder(part.minindex);
    let mut start = part.minindex;
    for t in 0..threads {
        offset += widthofrange;
        if remainder > 0 {
            offset += 1;
            remainder -= 1;
        }
        let end = if t == threads - 1 {
            part.maxindex
        } else {
            let lo = start as usize;
            let hi = part.maxindex as usize;
            let found = lo
                + leftborder[lo + 1..=hi + 1].partition_point(|&cum| (cum as u64) < offset);
            (found as u64).min(part.maxindex)
        };
        ranges.push((start, end));
        if end >= part.maxindex {
            break;
        }
        start = end + 1;
    }
    ranges
}

/// Sorts every bucket of `[minindex, maxindex]`, returning the
/// concatenated sorted positions and LCP entries of the range.
#[allow(clippy::too_many_arguments)]
fn sort_bucket_range(
    view: &TwobitView,
    keys: &BucketKeys,
    snrp: &SeqnumRelpos,
    spmsuftab: &SpmSuftab,
    minindex: u64,
    maxindex: u64,
    kmersize: u32,
    sorting_depth: u64,
) -> Result<(Vec<(u64, u64)>, Vec<u16>)> {
    let mut srs = ShortReadSort::new();
    let mut pairbuf: Vec<(u64, u64)> = Vec::new();
    let range_width =
        keys.get_leftborder(maxindex + 1) - keys.get_leftborder(minindex);
    let mut out_pairs = Vec::with_capacity(range_width as usize);
    let mut out_lcps = Vec::with_capacity(range_width as usize);
    for idx in minindex..=maxindex {
        let bucket_start = keys.get_leftborder(idx);
        let width = keys.get_leftborder(idx + 1) - bucket_start;
        if width == 0 {
            continue;
        }
        pairbuf.clear();
        for j in bucket_start..bucket_start + width {
            let value = spmsuftab.get(j);
            let (seqnum, relpos) = if spmsuftab.use_bits_for_positions() {
                view.logical_pos_to_seq(value)
            } else {
                (snrp.seqnum(value), snrp.relpos(value))
            };
            if seqnum >= view.logical_nofseqs() {
                bail!("corrupt suffix table entry in bucket {}", idx);
            }
            pairbuf.push((seqnum, relpos));
        }
        let lcp_seed = if idx == minindex {
            0
        } else {
            codelcp(keys.code(idx - 1), keys.code(idx), kmersize) as u16
        };
        let (sorted, lcps) = srs.sort_bucket(view, &pairbuf, lcp_seed, sorting_depth);
        out_pairs.extend_from_slice(sorted);
        out_lcps.extend_from_slice(lcps);
    }
    Ok((out_pairs, out_lcps))
}

/// k-way merge of sorted streams via the bounded min-heap; ties resolve
/// in stream order of arrival.
pub fn merge_sorted_streams<V, I>(mut streams: Vec<I>) -> Vec<(u64, V)>
where
    I: Iterator<Item = (u64, V)>,
{
    let mut merged = Vec::new();
    if streams.is_empty() {
        return merged;
    }
    let mut heads: Vec<Option<(u64, V)>> = Vec::with_capacity(streams.len());
    let mut pq = PriorityQueue::new(streams.len());
    for (i, stream) in streams.iter_mut().enumerate() {
        let head = stream.next();
        if let Some((key, _)) = &head {
            pq.add(*key, i as u64);
        }
        heads.push(head);
    }
    while !pq.is_empty() {
        let min = pq.delete_min();
        let stream_idx = min.value as usize;
        let (_, payload) = heads[stream_idx].take().unwrap();
        merged.push((min.sortkey, payload));
        let next = streams[stream_idx].next();
        if let Some((key, _)) = &next {
            pq.add(*key, stream_idx as u64);
        }
        heads[stream_idx] = next;
    }
    merged
}

/// Runs the whole pipeline over an encoded read set. When `out_path` is
/// given the `.spmsuftab` file is produced; `process` receives every
/// sorted bucket in global order.
pub fn sort_suffixes(
    view: &TwobitView,
    opts: &SuffixSortOptions,
    out_path: Option<&Path>,
    mut process: Option<BucketProcess>,
) -> Result<SuffixSortStats> {
    let kmersize = opts.kmersize;
    if !(2..=32).contains(&kmersize) {
        bail!("kmersize must be in the range 2..=32");
    }
    let skip_shorter = if opts.skip_shorter == 0 {
        kmersize
    } else {
        opts.skip_shorter
    };
    if skip_shorter < kmersize {
        bail!("skipshorter must not be smaller than kmersize");
    }
    let sorting_depth = if opts.sorting_depth > 0 {
        opts.sorting_depth.max(kmersize as u64)
    } else {
        0
    };

    let mut stats = SuffixSortStats::default();
    let maxseqlen = (0..view.nofseqs)
        .map(|sn| view.seq_length(sn))
        .max()
        .unwrap_or(0);
    if maxseqlen < skip_shorter as u64 || view.nofseqs == 0 {
        return Ok(stats);
    }

    let maxrelpos = maxseqlen - skip_shorter as u64;
    let bits_for_relpos = required_uint_bits(maxrelpos);
    let bits_for_seqnum = required_uint_bits(view.logical_nofseqs() - 1);
    let snrp = SeqnumRelpos::new(bits_for_seqnum, bits_for_relpos, view.logical_nofseqs(), maxseqlen)?;

    // bucket keys
    let codes = if opts.use_firstcodes {
        bucketkeys::collect_first_codes(view, kmersize)
    } else {
        let mut rng = StdRng::seed_from_u64(opts.seed);
        bucketkeys::collect_sample_codes(view, kmersize, opts.sampling_factor, &mut rng)
    };
    let mut keys = BucketKeys::new(codes, kmersize);
    keys.fill_bscache(ADD_BSCACHE_DEPTH);
    stats.different_codes = keys.num_codes();

    // counting pass
    let accum_capacity = (keys.num_codes() as usize / 5).max(16);
    {
        let mut buf = CodeBuffer::new(accum_capacity);
        let mut temp: Vec<u64> = Vec::new();
        let mut total = 0u64;
        let mut flushes = 0u32;
        {
            let keys = &mut keys;
            let buf = &mut buf;
            let temp = &mut temp;
            let total = &mut total;
            let flushes = &mut flushes;
            kmerscan(view, kmersize, skip_shorter, |code, _seqnum, _relpos| {
                if buf.is_full() {
                    accum_flush(keys, buf, temp, total, flushes);
                }
                buf.push(code);
            });
        }
        accum_flush(&mut keys, &mut buf, &mut temp, &mut total, &mut flushes);
        stats.total_count = total;
        stats.accum_flushes = flushes;
    }
    stats.maxbucketsize = keys.partial_sums();
    debug_assert_eq!(keys.total_count(), stats.total_count);
    if stats.total_count == 0 {
        return Ok(stats);
    }

    // partition into memory-bounded parts; mapping a part means holding
    // the per-part cursor window plus the codes and borders of its range
    let mapped_cost = |minidx: u64, maxidx: u64| -> u64 {
        let buckets = maxidx - minidx + 1;
        (buckets + 1) * 4 + buckets * 8
    };
    let numofparts = match opts.memlimit {
        Some(memlimit) => {
            let estimated = keys.num_codes() * 12 + accum_capacity as u64 * 8;
            SuftabParts::fit_memlimit(
                estimated,
                memlimit,
                keys.leftborder(),
                view.logical_total_length(),
                snrp.bits(),
                &mapped_cost,
            )?
        }
        None => opts.numofparts.max(1),
    };
    let suftabparts = SuftabParts::new(numofparts, keys.leftborder(), &mapped_cost);
    stats.numofparts = suftabparts.num_parts();
    stats.largest_width = suftabparts.largest_width();

    let mut spmsuftab = SpmSuftab::new(
        suftabparts.largest_width(),
        view.logical_total_length(),
        snrp.bits(),
    );

    let mut writer = match out_path {
        Some(path) => Some(SpmSuftabWriter::new(
            std::io::BufWriter::new(std::fs::File::create(path)?),
            stats.total_count,
            spmsuftab.bits_per_entry(),
        )?),
        None => None,
    };

    // insertion buffer: bounded so the flush count stays reasonable
    let insert_capacity = (accum_capacity / 2)
        .max(((stats.total_count + keys.num_codes()) / MAX_FLUSH_ROUNDS + 1) as usize)
        .max(16);
    let mut buf = CodePosBuffer::new(insert_capacity);
    let mut temp: Vec<(u64, u64)> = Vec::new();
    let mut cursors: Vec<u32> = Vec::new();

    for (part_number, part) in suftabparts.parts().iter().enumerate() {
        // insertion pass for this part
        buf.current_min_code = keys.idx_to_min_code(part.minindex);
        buf.current_max_code = keys.idx_to_max_code(part.maxindex);
        spmsuftab.set_part_offset(part.suftaboffset);
        cursors.clear();
        for idx in part.minindex..=part.maxindex {
            cursors.push(keys.leftborder()[idx as usize + 1]);
        }
        {
            let keys = &keys;
            let snrp = &snrp;
            let spmsuftab = &mut spmsuftab;
            let buf = &mut buf;
            let temp = &mut temp;
            let cursors = &mut cursors;
            let mut total = 0u64;
            let flushes = &mut stats.insert_flushes;
            kmerscan(view, kmersize, skip_shorter, |code, seqnum, relpos| {
                if buf.in_window(code) {
                    if buf.is_full() {
                        insert_flush(
                            view,
                            keys,
                            snrp,
                            spmsuftab,
                            part.minindex,
                            cursors,
                            buf,
                            temp,
                            &mut total,
                            flushes,
                        );
                    }
                    buf.push_pair(code, snrp.encode(seqnum, relpos));
                }
            });
            insert_flush(
                view,
                keys,
                snrp,
                spmsuftab,
                part.minindex,
                cursors,
                buf,
                temp,
                &mut total,
                flushes,
            );
            debug_assert_eq!(total, part.widthofpart);
        }
        debug_assert!(cursors
            .iter()
            .zip(part.minindex..)
            .all(|(&c, idx)| c as u64 == keys.get_leftborder(idx)));

        // parallel bucket sorting over disjoint ranges
        let ranges = evenly_divide_part(&keys, part, opts.threads.max(1));
        let mut results: Vec<(Vec<(u64, u64)>, Vec<u16>)> = Vec::with_capacity(ranges.len());
        if ranges.len() == 1 {
            results.push(sort_bucket_range(
                view,
                &keys,
                &snrp,
                &spmsuftab,
                ranges[0].0,
                ranges[0].1,
                kmersize,
                sorting_depth,
            )?);
        } else {
            // first error wins; later workers see it and abandon the part
            let first_error: Mutex<Option<anyhow::Error>> = Mutex::new(None);
            let mut slots: Vec<Option<(Vec<(u64, u64)>, Vec<u16>)>> = Vec::new();
            slots.resize_with(ranges.len(), || None);
            let keys_ref = &keys;
            let snrp_ref = &snrp;
            let spmsuftab_ref = &spmsuftab;
            crossbeam::scope(|scope| {
                for (slot, &(minidx, maxidx)) in slots.iter_mut().zip(ranges.iter()) {
                    let first_error = &first_error;
                    scope.spawn(move |_| {
                        if first_error.lock().unwrap().is_some() {
                            return;
                        }
                        match sort_bucket_range(
                            view,
                            keys_ref,
                            snrp_ref,
                            spmsuftab_ref,
                            minidx,
                            maxidx,
                            kmersize,
                            sorting_depth,
                        ) {
                            Ok(sorted) => *slot = Some(sorted),
                            Err(err) => {
                                let mut guard = first_error.lock().unwrap();
                                if guard.is_none() {
                                    *guard = Some(err);
                                }
                            }
                        }
                    });
                }
            })
            .map_err(|_| anyhow!("bucket sorting worker panicked"))?;
            if let Some(err) = first_error.into_inner().unwrap() {
                return Err(err);
            }
            for slot in slots {
                results.push(slot.expect("worker completed"));
            }
        }

        // write the sorted positions back into the disjoint slices and
        // stream them out
        let mut write_idx = part.suftaboffset;
        for (pairs, _) in results.iter() {
            for &(seqnum, relpos) in pairs.iter() {
                let stored = if spmsuftab.use_bits_for_positions() {
                    view.logical_position(seqnum, relpos)
                } else {
                    snrp.encode(seqnum, relpos)
                };
                spmsuftab.set(write_idx, stored);
                if let Some(writer) = writer.as_mut() {
                    writer.write_entry(stored)?;
                }
                write_idx += 1;
            }
        }
        debug_assert_eq!(write_idx, part.sumofwidth);

        if let Some(process) = process.as_mut() {
            let mut flat = 0usize;
            let all_pairs: Vec<(u64, u64)> =
                results.iter().flat_map(|(p, _)| p.iter().copied()).collect();
            let all_lcps: Vec<u16> =
                results.iter().flat_map(|(_, l)| l.iter().copied()).collect();
            for idx in part.minindex..=part.maxindex {
                let width =
                    (keys.get_leftborder(idx + 1) - keys.get_leftborder(idx)) as usize;
                if width == 0 {
                    continue;
                }
                process(
                    part_number as u32,
                    keys.code(idx),
                    &all_pairs[flat..flat + width],
                    &all_lcps[flat..flat + width],
                );
                flat += width;
            }
        }
    }

    if let Some(writer) = writer {
        writer.finish()?;
    }
    Ok(stats)
}
