//! Partitioning of the bucket-index space into memory-bounded parts.
//!
//! Works on the start-border form of the left-border table: entry `i` is
//! the first suffix slot of bucket `i`, the last entry the total count.

use anyhow::{bail, Result};

use super::spmsuftab::SpmSuftab;

const MAX_PARTS_TRIED: u32 = 500;

#[derive(Debug, Clone, Copy)]
pub struct Part {
    pub minindex: u64,
    pub maxindex: u64,
    pub widthofpart: u64,
    pub suftaboffset: u64,
    pub sumofwidth: u64,
}

#[derive(Debug)]
pub struct SuftabParts {
    parts: Vec<Part>,
    largest_width: u64,
    largest_size_mapped_partwise: u64,
}

impl SuftabParts {
    /// Splits `[0, D-1]` into at most `numofparts` contiguous parts of
    /// roughly even suffix width; zero-width parts are dropped.
    /// `mapped_cost(min, max)` prices the per-part mapping of the
    /// auxiliary tables.
    pub fn new(
        numofparts: u32,
        leftborder: &[u32],
        mapped_cost: &dyn Fn(u64, u64) -> u64,
    ) -> Self {
        let num_codes = (leftborder.len() - 1) as u64;
        let total = *leftborder.last().unwrap() as u64;
        let numofparts = if total == 0 || total < numofparts as u64 {
            1
        } else {
            numofparts.max(1)
        };

        let widthofsuftabpart = total / numofparts as u64;
        let mut remainder = (total % numofparts as u64) as u32;
        let mut raw: Vec<Part> = Vec::with_capacity(numofparts as usize);
        let mut suftaboffset = 0u64;
        let mut sumofwidth = 0u64;
        let mut minindex = 0u64;
        for part in 0..numofparts {
            if remainder > 0 {
                suftaboffset += widthofsuftabpart + 1;
                remainder -= 1;
            } else {
                suftaboffset += widthofsuftabpart;
            }
            let maxindex = if part == numofparts - 1 {
                num_codes - 1
            } else {
                // least bucket whose cumulative width reaches the target
                let hi = num_codes as usize;
                let lo = minindex as usize;
                let found = lo
                    + leftborder[lo + 1..=hi].partition_point(|&cum| (cum as u64) < suftaboffset);
                (found as u64).min(num_codes - 1).max(minindex)
            };
            let width = leftborder[maxindex as usize + 1] as u64 - leftborder[minindex as usize] as u64;
            sumofwidth += width;
            raw.push(Part {
                minindex,
                maxindex,
                widthofpart: width,
                suftaboffset: leftborder[minindex as usize] as u64,
                sumofwidth,
            });
            minindex = maxindex + 1;
            if minindex >= num_codes {
                break;
            }
        }
        debug_assert_eq!(raw.last().map(|p| p.sumofwidth), Some(total));

        // remove empty parts, folding their index range into the next one
        let mut parts: Vec<Part> = Vec::with_capacity(raw.len());
        let mut pending_min: Option<u64> = None;
        for mut part in raw {
            if part.widthofpart == 0 {
                pending_min = pending_min.or(Some(part.minindex));
                continue;
            }
            if let Some(m) = pending_min.take() {
                part.minindex = m;
            }
            parts.push(part);
        }
        if let Some(last) = parts.last_mut() {
            // trailing empty buckets belong to the final part
            last.maxindex = num_codes - 1;
        }

        let largest_width = parts.iter().map(|p| p.widthofpart).max().unwrap_or(0);
        let largest_size_mapped_partwise = parts
            .iter()
            .map(|p| mapped_cost(p.minindex, p.maxindex))
            .max()
            .unwrap_or(0);
        SuftabParts {
            parts,
            largest_width,
            largest_size_mapped_partwise,
        }
    }

    /// Smallest part count in 1..=500 whose footprint fits the budget.
    pub fn fit_memlimit(
        estimated_space: u64,
        maximumspace: u64,
        leftborder: &[u32],
        totallength: u64,
        bits_for_seqnumrelpos: u32,
        mapped_cost: &dyn Fn(u64, u64) -> u64,
    ) -> Result<u32> {
        let num_codes = (leftborder.len() - 1) as u64;
        let size_mapped_entire = mapped_cost(0, num_codes - 1);
        for numofparts in 1..=MAX_PARTS_TRIED {
            let parts = SuftabParts::new(numofparts, leftborder, mapped_cost);
            let suftabsize = SpmSuftab::required_space(
                parts.largest_width(),
                totallength,
                bits_for_seqnumrelpos,
            );
            let fits = if numofparts == 1 {
                suftabsize + estimated_space <= maximumspace
            } else {
                (suftabsize + parts.largest_size_mapped_partwise() + estimated_space)
                    .saturating_sub(size_mapped_entire)
                    <= maximumspace
            };
            if fits {
                return Ok(numofparts);
            }
        }
        bail!(
            "cannot compute suffix index in at most {} bytes",
            maximumspace
        );
    }

    pub fn num_parts(&self) -> u32 {
        self.parts.len() as u32
    }

    pub fn part(&self, idx: u32) -> &Part {
        &self.parts[idx as usize]
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn largest_width(&self) -> u64 {
        self.largest_width
    }

    pub fn largest_size_mapped_partwise(&self) -> u64 {
        self.largest_size_mapped_partwise
    }

    pub fn total_width(&self) -> u64 {
        self.parts.last().map(|p| p.sumofwidth).unwrap_or(0)
    }
}
