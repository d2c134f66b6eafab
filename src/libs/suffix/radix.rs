//! LSB radix sort for the flush paths: plain `u64` codes and
//! (code, position) pairs keyed on the code. Byte passes whose key byte is
//! constant across the buffer are skipped.

pub fn radix_sort_u64(keys: &mut [u64], temp: &mut Vec<u64>) {
    let n = keys.len();
    if n < 2 {
        return;
    }
    temp.clear();
    temp.resize(n, 0);
    let mut flipped = false;
    for pass in 0..8u32 {
        let shift = pass * 8;
        let (src, dst): (&[u64], &mut [u64]) = if flipped {
            (&temp[..], &mut keys[..])
        } else {
            (&keys[..], &mut temp[..])
        };
        let mut counts = [0usize; 256];
        for &k in src.iter() {
            counts[((k >> shift) & 0xff) as usize] += 1;
        }
        if counts.iter().any(|&c| c == n) {
            continue;
        }
        let mut offsets = [0usize; 256];
        for b in 1..256 {
            offsets[b] = offsets[b - 1] + counts[b - 1];
        }
        for &k in src.iter() {
            let b = ((k >> shift) & 0xff) as usize;
            dst[offsets[b]] = k;
            offsets[b] += 1;
        }
        flipped = !flipped;
    }
    if flipped {
        keys.copy_from_slice(temp);
    }
}

pub fn radix_sort_pairs(pairs: &mut [(u64, u64)], temp: &mut Vec<(u64, u64)>) {
    let n = pairs.len();
    if n < 2 {
        return;
    }
    temp.clear();
    temp.resize(n, (0, 0));
    let mut flipped = false;
    for pass in 0..8u32 {
        let shift = pass * 8;
        let (src, dst): (&[(u64, u64)], &mut [(u64, u64)]) = if flipped {
            (&temp[..], &mut pairs[..])
        } else {
            (&pairs[..], &mut temp[..])
        };
        let mut counts = [0usize; 256];
        for &(k, _) in src.iter() {
            counts[((k >> shift) & 0xff) as usize] += 1;
        }
        if counts.iter().any(|&c| c == n) {
            continue;
        }
        let mut offsets = [0usize; 256];
        for b in 1..256 {
            offsets[b] = offsets[b - 1] + counts[b - 1];
        }
        for &p in src.iter() {
            let b = ((p.0 >> shift) & 0xff) as usize;
            dst[offsets[b]] = p;
            offsets[b] += 1;
        }
        flipped = !flipped;
    }
    if flipped {
        pairs.copy_from_slice(temp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_u64() {
        let mut keys: Vec<u64> = (0..1000u64).map(|i| (i * 2654435761) % 100003).collect();
        let mut expected = keys.clone();
        expected.sort_unstable();
        let mut temp = Vec::new();
        radix_sort_u64(&mut keys, &mut temp);
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_sort_u64_high_bytes() {
        let mut keys = vec![u64::MAX, 0, 1 << 63, 42, 1 << 40];
        let mut temp = Vec::new();
        radix_sort_u64(&mut keys, &mut temp);
        assert_eq!(keys, vec![0, 42, 1 << 40, 1 << 63, u64::MAX]);
    }

    #[test]
    fn test_sort_pairs_keeps_payload() {
        let mut pairs: Vec<(u64, u64)> = (0..500u64).map(|i| ((i * 977) % 1009, i)).collect();
        let mut temp = Vec::new();
        radix_sort_pairs(&mut pairs, &mut temp);
        for w in pairs.windows(2) {
            assert!(w[0].0 <= w[1].0);
        }
        for &(k, v) in pairs.iter() {
            assert_eq!(k, (v * 977) % 1009);
        }
    }
}
