//! Trailing-group word cache
//!
//! Holds the word of the group at index `num_full_slots` for the whole
//! batch so consecutive adds and removes touch the store at most once per
//! group boundary.

use crate::error::Result;
use crate::storage::{SlotArray, SlotWord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotCache {
    /// Current contents of the trailing group
    pub word: SlotWord,
    /// Word differs from what the store holds
    pub dirty: bool,
    /// The trailing group already exists in the store
    pub stored: bool,
}

impl SlotCache {
    /// No trailing group yet; the next add starts a fresh one
    pub fn empty() -> Self {
        Self::default()
    }

    /// Cache for a group already present in the store
    pub fn loaded(word: SlotWord) -> Self {
        Self {
            word,
            dirty: false,
            stored: true,
        }
    }

    /// Persist the word as group `index`; returns whether a store write happened
    pub fn flush<A: SlotArray + ?Sized>(&mut self, slots: &mut A, index: u64) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        if self.stored {
            slots.write_group(index, self.word)?;
        } else {
            slots.append_group(self.word)?;
            self.stored = true;
        }
        self.dirty = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SlotVec;
    use crate::types::Selector;

    #[test]
    fn test_flush_appends_then_writes() -> Result<()> {
        let mut slots = SlotVec::new();
        let mut cache = SlotCache::empty();

        // Clean cache never touches the store
        assert!(!cache.flush(&mut slots, 0)?);
        assert_eq!(slots.group_count(), 0);

        cache.word.set(0, Selector::from(1));
        cache.dirty = true;
        assert!(cache.flush(&mut slots, 0)?);
        assert_eq!(slots.group_count(), 1);
        assert!(cache.stored);

        cache.word.set(1, Selector::from(2));
        cache.dirty = true;
        assert!(cache.flush(&mut slots, 0)?);
        assert_eq!(slots.group_count(), 1);
        assert_eq!(slots.read_group(0)?.get(1), Selector::from(2));
        Ok(())
    }
}
