//! Per-engine table of compiled patterns.
//!
//! A handle packs a slot index and the slot's generation into one
//! positive `i32`. Freed slots go on a free list and are reused with the
//! next generation, so a stale handle no longer resolves. `0` never names
//! a slot.

use crate::runtime::PatternRef;

const INDEX_BITS: u32 = 20;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u32 = (1 << 11) - 1;

/// Slots a table can hold. Index `0` is unused so that handles stay
/// non-zero.
pub const MAX_SLOTS: usize = INDEX_MASK as usize;

/// Handle value meaning "no pattern".
pub const NO_HANDLE: i32 = 0;

struct Slot {
    generation: u32,
    pattern: Option<PatternRef>,
}

pub struct HandleTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self::with_capacity(crate::config::INITIAL_PATTERN_SLOTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    fn encode(index: usize, generation: u32) -> i32 {
        // index + 1 < 2^20 and generation < 2^11, so the result is positive.
        (((generation & GENERATION_MASK) << INDEX_BITS) | (index as u32 + 1)) as i32
    }

    fn decode(handle: i32) -> Option<(usize, u32)> {
        if handle <= 0 {
            return None;
        }
        let raw = handle as u32;
        let index = (raw & INDEX_MASK) as usize;
        if index == 0 {
            return None;
        }
        Some((index - 1, raw >> INDEX_BITS))
    }

    /// Store a pattern. Returns `None` when every slot is taken.
    pub fn insert(&mut self, pattern: PatternRef) -> Option<i32> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.slots.len() < MAX_SLOTS - 1 => {
                self.slots.push(Slot {
                    generation: 0,
                    pattern: None,
                });
                self.slots.len() - 1
            }
            None => return None,
        };
        let slot = &mut self.slots[index];
        slot.pattern = Some(pattern);
        self.live += 1;
        Some(Self::encode(index, slot.generation))
    }

    pub fn get(&self, handle: i32) -> Option<&PatternRef> {
        let (index, generation) = Self::decode(handle)?;
        let slot = self.slots.get(index)?;
        if slot.generation != generation {
            return None;
        }
        slot.pattern.as_ref()
    }

    /// Empty the slot named by `handle`, returning its pattern.
    pub fn remove(&mut self, handle: i32) -> Option<PatternRef> {
        let (index, generation) = Self::decode(handle)?;
        let slot = self.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let pattern = slot.pattern.take()?;
        slot.generation = (slot.generation + 1) & GENERATION_MASK;
        self.free.push(index);
        self.live -= 1;
        Some(pattern)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Remove every pattern.
    pub fn drain(&mut self) -> Vec<PatternRef> {
        let patterns: Vec<PatternRef> = self
            .slots
            .iter_mut()
            .filter_map(|slot| slot.pattern.take())
            .collect();
        self.slots.clear();
        self.free.clear();
        self.live = 0;
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::CompiledPattern;
    use std::any::Any;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Named(&'static str);

    impl CompiledPattern for Named {
        fn expression(&self) -> &str {
            self.0
        }
        fn footprint(&self) -> usize {
            0
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn pattern(name: &'static str) -> PatternRef {
        Arc::new(Named(name))
    }

    #[test]
    fn test_handles_are_non_zero() {
        let mut table = HandleTable::new();
        let a = table.insert(pattern("a")).unwrap();
        let b = table.insert(pattern("b")).unwrap();
        assert!(a > 0 && b > 0);
        assert_ne!(a, b);
        assert_eq!(table.get(a).unwrap().expression(), "a");
        assert_eq!(table.get(b).unwrap().expression(), "b");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut table = HandleTable::new();
        let a = table.insert(pattern("a")).unwrap();
        assert!(table.remove(a).is_some());
        assert!(table.get(a).is_none());
        assert!(table.remove(a).is_none());

        let b = table.insert(pattern("b")).unwrap();
        assert_ne!(a, b);
        assert!(table.get(a).is_none());
        assert_eq!(table.get(b).unwrap().expression(), "b");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_slots_are_reused() {
        let mut table = HandleTable::new();
        let a = table.insert(pattern("a")).unwrap();
        table.remove(a);
        let b = table.insert(pattern("b")).unwrap();
        assert_eq!(a as u32 & INDEX_MASK, b as u32 & INDEX_MASK);
    }

    #[test]
    fn test_invalid_handles() {
        let table = HandleTable::new();
        assert!(table.get(NO_HANDLE).is_none());
        assert!(table.get(-5).is_none());
        assert!(table.get(12345).is_none());
    }

    #[test]
    fn test_drain() {
        let mut table = HandleTable::new();
        table.insert(pattern("a"));
        table.insert(pattern("b"));
        assert_eq!(table.drain().len(), 2);
        assert!(table.is_empty());
    }
}
