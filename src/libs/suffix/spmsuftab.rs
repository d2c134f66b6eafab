//! Bit-packed suffix-position store, filled sequentially per part.

use crate::libs::bitpack::{required_uint_bits, PackedIntArray};
use std::io::Write;

#[derive(Debug)]
pub struct SpmSuftab {
    store: PackedIntArray,
    num_entries: u64,
    part_offset: u64,
    /// When the total length packs narrower than (seqnum, relpos), the
    /// entries hold absolute positions instead of the packed form.
    use_bits_for_positions: bool,
}

impl SpmSuftab {
    pub fn new(num_entries: u64, totallength: u64, bits_for_seqnumrelpos: u32) -> Self {
        let bits_for_position = required_uint_bits(totallength);
        let use_bits_for_positions = bits_for_position < bits_for_seqnumrelpos;
        let bits = if use_bits_for_positions {
            bits_for_position
        } else {
            bits_for_seqnumrelpos
        };
        SpmSuftab {
            store: PackedIntArray::new(num_entries.max(1), bits),
            num_entries,
            part_offset: 0,
            use_bits_for_positions,
        }
    }

    pub fn required_space(num_entries: u64, totallength: u64, bits_for_seqnumrelpos: u32) -> u64 {
        let bits = required_uint_bits(totallength).min(bits_for_seqnumrelpos);
        PackedIntArray::size_in_bytes(num_entries, bits)
    }

    pub fn use_bits_for_positions(&self) -> bool {
        self.use_bits_for_positions
    }

    pub fn bits_per_entry(&self) -> u32 {
        self.store.bits_per_elem()
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    pub fn set_part_offset(&mut self, offset: u64) {
        self.part_offset = offset;
    }

    #[inline]
    pub fn set(&mut self, idx: u64, value: u64) {
        debug_assert!(idx >= self.part_offset);
        self.store.set(idx - self.part_offset, value);
    }

    #[inline]
    pub fn get(&self, idx: u64) -> u64 {
        self.store.get(idx - self.part_offset)
    }
}

/// Streams entries into the on-disk `.spmsuftab` representation: a
/// native-endian header (entry count, bits per entry) followed by the
/// MSB-first packed values, parts written back to back without padding.
pub struct SpmSuftabWriter<W: Write> {
    out: W,
    bits_per_entry: u32,
    acc: u64,
    accbits: u32,
}

impl<W: Write> SpmSuftabWriter<W> {
    pub fn new(mut out: W, num_entries: u64, bits_per_entry: u32) -> std::io::Result<Self> {
        out.write_all(&num_entries.to_ne_bytes())?;
        out.write_all(&bits_per_entry.to_ne_bytes())?;
        Ok(SpmSuftabWriter {
            out,
            bits_per_entry,
            acc: 0,
            accbits: 0,
        })
    }

    pub fn write_entry(&mut self, value: u64) -> std::io::Result<()> {
        let mut remaining = self.bits_per_entry;
        while remaining > 0 {
            let take = (8 - self.accbits).min(remaining);
            let chunk = (value >> (remaining - take)) & ((1u64 << take) - 1);
            self.acc = (self.acc << take) | chunk;
            self.accbits += take;
            remaining -= take;
            if self.accbits == 8 {
                self.out.write_all(&[self.acc as u8])?;
                self.acc = 0;
                self.accbits = 0;
            }
        }
        Ok(())
    }

    /// Flushes the trailing partial byte, zero-padded on the right.
    pub fn finish(mut self) -> std::io::Result<W> {
        if self.accbits > 0 {
            let byte = ((self.acc << (8 - self.accbits)) & 0xff) as u8;
            self.out.write_all(&[byte])?;
        }
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_packs_msb_first() {
        let mut raw = Vec::new();
        {
            let mut writer = SpmSuftabWriter::new(&mut raw, 3, 10).unwrap();
            for v in [0x3ffu64, 0, 0x155] {
                writer.write_entry(v).unwrap();
            }
            writer.finish().unwrap();
        }
        // 12 header bytes, then 30 bits -> 4 bytes
        assert_eq!(raw.len(), 12 + 4);
        assert_eq!(&raw[12..], &[0b1111_1111, 0b1100_0000, 0b0000_0101, 0b0101_0100]);
    }

    #[test]
    fn test_part_offset_addressing() {
        let mut tab = SpmSuftab::new(10, 1000, 40);
        assert!(tab.use_bits_for_positions());
        assert_eq!(tab.bits_per_entry(), 10);
        tab.set_part_offset(100);
        for i in 0..10u64 {
            tab.set(100 + i, i * 99);
        }
        for i in 0..10u64 {
            assert_eq!(tab.get(100 + i), i * 99);
        }
    }

    #[test]
    fn test_packed_form_chosen() {
        let tab = SpmSuftab::new(4, u64::MAX, 20);
        assert!(!tab.use_bits_for_positions());
        assert_eq!(tab.bits_per_entry(), 20);
    }

    #[test]
    fn test_required_space() {
        // 10 entries of 10 bits = 100 bits = 13 bytes
        assert_eq!(SpmSuftab::required_space(10, 1000, 40), 13);
    }
}
