//! In-memory registry store
//!
//! Used by tests and by embedders that rebuild the registry on startup.

use super::slot::{SlotArray, SlotHeader, SlotVec, SlotWord};
use super::staged::ChangeSet;
use super::{merge_entries, RegistryStore};
use crate::error::Result;
use crate::types::{Entry, Selector};
use std::collections::HashMap;

/// In-memory store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    slots: SlotVec,
    entries: HashMap<Selector, Entry>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw groups, for inspection
    pub fn groups(&self) -> &[SlotWord] {
        self.slots.groups()
    }
}

impl SlotArray for MemoryStore {
    fn length(&self) -> SlotHeader {
        self.slots.length()
    }

    fn set_length(&mut self, header: SlotHeader) -> Result<()> {
        self.slots.set_length(header)
    }

    fn group_count(&self) -> u64 {
        self.slots.group_count()
    }

    fn read_group(&self, index: u64) -> Result<SlotWord> {
        self.slots.read_group(index)
    }

    fn write_group(&mut self, index: u64, word: SlotWord) -> Result<()> {
        self.slots.write_group(index, word)
    }

    fn delete_group(&mut self, index: u64) -> Result<()> {
        self.slots.delete_group(index)
    }

    fn append_group(&mut self, word: SlotWord) -> Result<()> {
        self.slots.append_group(word)
    }
}

impl RegistryStore for MemoryStore {
    fn load_entries(&self) -> Result<HashMap<Selector, Entry>> {
        Ok(self.entries.clone())
    }

    fn apply(&mut self, changes: ChangeSet) -> Result<()> {
        // Replay onto a copy so a bad op cannot leave half a batch behind
        let mut slots = self.slots.clone();
        changes.replay(&mut slots)?;
        self.slots = slots;
        merge_entries(&mut self.entries, &changes.entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::staged::SlotOp;
    use crate::types::FacetAddress;

    #[test]
    fn test_memory_store_apply() -> Result<()> {
        let mut store = MemoryStore::new();
        let selector = Selector::from(0x01020304);
        let entry = Entry::new(FacetAddress::repeat(0xaa), 0, 0);

        let mut word = SlotWord::EMPTY;
        word.set(0, selector);

        store.apply(ChangeSet {
            ops: vec![
                SlotOp::Append { word },
                SlotOp::SetLength {
                    header: SlotHeader::new(0, 1),
                },
            ],
            entries: vec![(selector, Some(entry))],
        })?;

        assert_eq!(store.len(), 1);
        assert_eq!(store.length(), SlotHeader::new(0, 1));
        assert_eq!(store.read_group(0)?.get(0), selector);
        assert_eq!(store.load_entries()?.get(&selector), Some(&entry));
        Ok(())
    }

    #[test]
    fn test_memory_store_failed_apply_leaves_state() -> Result<()> {
        let mut store = MemoryStore::new();
        let before = store.clone();

        // Appending then writing past the end fails on the second op
        let result = store.apply(ChangeSet {
            ops: vec![
                SlotOp::Append {
                    word: SlotWord::EMPTY,
                },
                SlotOp::Write {
                    index: 5,
                    word: SlotWord::EMPTY,
                },
            ],
            entries: Vec::new(),
        });

        assert!(result.is_err());
        assert_eq!(store, before);
        Ok(())
    }
}
