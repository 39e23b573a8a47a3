//! Storage layer
//!
//! # Architecture
//!
//! ```text
//! RegistryStore (SlotArray + persisted entries)
//!   ├─→ Header: num_full_slots, last_slot_len
//!   ├─→ Groups: [word 0 | word 1 | ... | trailing word]
//!   └─→ Entries: selector → (facet, slot, position)
//! ```
//!
//! A cut batch never writes a store directly. It runs against a
//! [`StagedSlots`] overlay and hands the recorded [`ChangeSet`] to
//! [`RegistryStore::apply`] once every group has succeeded.
//!
//! ## Implementations
//!
//! - **MemoryStore** keeps everything in process memory
//! - **JournalStore** persists committed change sets to an append-only
//!   journal and rebuilds state from it on open

pub mod journal;
pub mod memory;
pub mod slot;
pub mod staged;

pub use journal::{JournalOptions, JournalStore};
pub use memory::MemoryStore;
pub use slot::{SlotArray, SlotHeader, SlotVec, SlotWord, SLOT_CAPACITY, WORD_LEN};
pub use staged::{ChangeSet, IoStats, SlotOp, StagedSlots};

use crate::error::Result;
use crate::types::{Entry, Selector};
use std::collections::HashMap;

/// Backend owning a slot array and the persisted entry map
pub trait RegistryStore: SlotArray {
    /// Every persisted entry
    fn load_entries(&self) -> Result<HashMap<Selector, Entry>>;

    /// Apply a committed batch. Either all of `changes` is applied or none.
    fn apply(&mut self, changes: ChangeSet) -> Result<()>;
}

/// Apply entry updates to an in-memory map
pub(crate) fn merge_entries(
    target: &mut HashMap<Selector, Entry>,
    updates: &[(Selector, Option<Entry>)],
) {
    for (selector, entry) in updates {
        match entry {
            Some(entry) => {
                target.insert(*selector, *entry);
            }
            None => {
                target.remove(selector);
            }
        }
    }
}
