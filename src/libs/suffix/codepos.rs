//! Fixed-capacity staging buffers between the k-mer scanners and the
//! flush paths. The owner drains a buffer exactly when it reports full,
//! and once more at the end of each phase.

/// Counting phase: plain u64 codes.
#[derive(Debug)]
pub struct CodeBuffer {
    pub space: Vec<u64>,
    capacity: usize,
}

impl CodeBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        CodeBuffer {
            space: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.space.len() == self.capacity
    }

    #[inline]
    pub fn push(&mut self, code: u64) {
        debug_assert!(!self.is_full());
        self.space.push(code);
    }

    pub fn next_free(&self) -> usize {
        self.space.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.space.clear();
    }
}

/// Insertion phase: (code, packed seqnum/relpos) pairs, gated by the code
/// window of the current part.
#[derive(Debug)]
pub struct CodePosBuffer {
    pub space: Vec<(u64, u64)>,
    capacity: usize,
    /// Exclusive lower bound; 0 admits code 0 as well.
    pub current_min_code: u64,
    /// Inclusive upper bound.
    pub current_max_code: u64,
}

impl CodePosBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        CodePosBuffer {
            space: Vec::with_capacity(capacity),
            capacity,
            current_min_code: 0,
            current_max_code: u64::MAX,
        }
    }

    #[inline]
    pub fn in_window(&self, code: u64) -> bool {
        (self.current_min_code == 0 || self.current_min_code < code)
            && code <= self.current_max_code
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.space.len() == self.capacity
    }

    #[inline]
    pub fn push_pair(&mut self, code: u64, pos: u64) {
        debug_assert!(!self.is_full());
        self.space.push((code, pos));
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.space.clear();
    }
}
