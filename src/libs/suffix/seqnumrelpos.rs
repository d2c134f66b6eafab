//! Packing of (seqnum, relpos) pairs into one word.

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy)]
pub struct SeqnumRelpos {
    bits_for_seqnum: u32,
    bits_for_relpos: u32,
    mask_relpos: u64,
}

impl SeqnumRelpos {
    pub fn new(bits_for_seqnum: u32, bits_for_relpos: u32, nofseqs: u64, maxseqlen: u64) -> Result<Self> {
        if bits_for_seqnum + bits_for_relpos > 64 {
            bail!(
                "cannot process encoded sequences with {} sequences of length up to {} \
                 ({}+{} bits)",
                nofseqs,
                maxseqlen,
                bits_for_seqnum,
                bits_for_relpos
            );
        }
        Ok(SeqnumRelpos {
            bits_for_seqnum,
            bits_for_relpos,
            mask_relpos: if bits_for_relpos == 64 {
                u64::MAX
            } else {
                (1u64 << bits_for_relpos) - 1
            },
        })
    }

    pub fn bits(&self) -> u32 {
        self.bits_for_seqnum + self.bits_for_relpos
    }

    #[inline]
    pub fn encode(&self, seqnum: u64, relpos: u64) -> u64 {
        debug_assert!(relpos <= self.mask_relpos);
        (seqnum << self.bits_for_relpos) | relpos
    }

    #[inline]
    pub fn seqnum(&self, value: u64) -> u64 {
        value >> self.bits_for_relpos
    }

    #[inline]
    pub fn relpos(&self, value: u64) -> u64 {
        value & self.mask_relpos
    }
}
