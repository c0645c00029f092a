//! Heap accounting for the reference runtime.
//!
//! Memory the runtime holds falls into four groups: the environment
//! (loaded bindings and packages), live compiled patterns, output buffers
//! retired by later matches, and patterns released by the embedder.
//! Retired buffers are freed by the next collection. Released patterns
//! are finalized by one collection and reclaimed by the following one, so
//! two cycles are needed to return everything.
//!
//! The runtime collects on its own once reclaimable memory passes
//! [`COLLECTION_THRESHOLD`]. An allocation limit only makes collections
//! happen sooner.

use super::PatternRef;

/// Reclaimable bytes that trigger a collection without any limit set.
pub const COLLECTION_THRESHOLD: usize = 32 * 1024 * 1024;

struct Released {
    pattern: PatternRef,
    finalized: bool,
}

#[derive(Default)]
pub struct Heap {
    environment: usize,
    patterns: usize,
    garbage: Vec<Vec<u8>>,
    garbage_bytes: usize,
    released: Vec<Released>,
    collections: u64,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn charge_environment(&mut self, bytes: usize) {
        self.environment += bytes;
    }

    pub fn charge_pattern(&mut self, pattern: &PatternRef) {
        self.patterns += pattern.footprint();
    }

    pub fn release_pattern(&mut self, pattern: PatternRef) {
        self.patterns = self.patterns.saturating_sub(pattern.footprint());
        self.released.push(Released {
            pattern,
            finalized: false,
        });
    }

    pub fn retire_buffer(&mut self, buf: Vec<u8>) {
        if buf.capacity() > 0 {
            self.garbage_bytes += buf.capacity();
            self.garbage.push(buf);
        }
    }

    fn released_bytes(&self) -> usize {
        self.released.iter().map(|r| r.pattern.footprint()).sum()
    }

    /// Whether enough memory is reclaimable to warrant a collection.
    pub fn should_collect(&self) -> bool {
        self.garbage_bytes + self.released_bytes() > COLLECTION_THRESHOLD
    }

    /// Bytes currently held.
    pub fn usage(&self) -> usize {
        self.environment + self.patterns + self.garbage_bytes + self.released_bytes()
    }

    /// One full, synchronous collection cycle.
    pub fn collect(&mut self) {
        self.garbage.clear();
        self.garbage.shrink_to_fit();
        self.garbage_bytes = 0;
        self.released.retain_mut(|r| {
            if r.finalized {
                false
            } else {
                r.finalized = true;
                true
            }
        });
        self.collections += 1;
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }
}
