//! Staged slot writes for one cut batch
//!
//! ```text
//! StagedSlots ──read miss──→ base store (read-only)
//!     │
//!     └─→ ChangeSet { ops: [Write, Append, Delete, SetLength], entries }
//!             └─→ RegistryStore::apply  (all or nothing)
//! ```
//!
//! Nothing reaches the base store until the batch succeeds, so dropping a
//! `StagedSlots` is the rollback.

use super::slot::{SlotArray, SlotHeader, SlotWord, SLOT_CAPACITY};
use crate::error::{Error, Result};
use crate::types::{Entry, Selector};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::BTreeMap;

/// One recorded word operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SlotOp {
    Write { index: u64, word: SlotWord },
    Append { word: SlotWord },
    Delete { index: u64 },
    SetLength { header: SlotHeader },
}

/// Everything a committed batch changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Slot array operations in execution order
    pub ops: Vec<SlotOp>,
    /// Entry updates; `None` deletes the entry
    pub entries: Vec<(Selector, Option<Entry>)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.entries.is_empty()
    }

    /// Apply the slot operations, in order, to `target`
    pub fn replay<A: SlotArray + ?Sized>(&self, target: &mut A) -> Result<()> {
        for op in &self.ops {
            match *op {
                SlotOp::Write { index, word } => target.write_group(index, word)?,
                SlotOp::Append { word } => target.append_group(word)?,
                SlotOp::Delete { index } => target.delete_group(index)?,
                SlotOp::SetLength { header } => target.set_length(header)?,
            }
        }
        Ok(())
    }
}

/// Word traffic of a staged batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    pub word_reads: u64,
    pub word_writes: u64,
}

/// Copy-on-write view of a slot array
pub struct StagedSlots<'a, A: SlotArray + ?Sized> {
    base: &'a A,
    header: SlotHeader,
    group_count: u64,
    overlay: BTreeMap<u64, SlotWord>,
    ops: Vec<SlotOp>,
    reads: Cell<u64>,
    writes: u64,
}

impl<'a, A: SlotArray + ?Sized> StagedSlots<'a, A> {
    pub fn new(base: &'a A) -> Self {
        Self {
            header: base.length(),
            group_count: base.group_count(),
            base,
            overlay: BTreeMap::new(),
            ops: Vec::new(),
            reads: Cell::new(0),
            writes: 0,
        }
    }

    pub fn stats(&self) -> IoStats {
        IoStats {
            word_reads: self.reads.get(),
            word_writes: self.writes,
        }
    }

    /// Finish staging; the recorded ops are ready to commit
    pub fn into_ops(self) -> Vec<SlotOp> {
        self.ops
    }

    fn check_index(&self, index: u64) -> Result<()> {
        if index >= self.group_count {
            return Err(Error::Storage(format!(
                "Slot index {} out of range ({} groups)",
                index, self.group_count
            )));
        }
        Ok(())
    }

    fn record(&mut self, op: SlotOp) {
        self.writes += 1;
        self.ops.push(op);
    }
}

impl<A: SlotArray + ?Sized> SlotArray for StagedSlots<'_, A> {
    fn length(&self) -> SlotHeader {
        self.header
    }

    fn set_length(&mut self, header: SlotHeader) -> Result<()> {
        if header.last_slot_len as usize >= SLOT_CAPACITY {
            return Err(Error::Storage(format!(
                "Trailing slot length {} exceeds {}",
                header.last_slot_len,
                SLOT_CAPACITY - 1
            )));
        }
        self.header = header;
        self.record(SlotOp::SetLength { header });
        Ok(())
    }

    fn group_count(&self) -> u64 {
        self.group_count
    }

    fn read_group(&self, index: u64) -> Result<SlotWord> {
        self.check_index(index)?;
        self.reads.set(self.reads.get() + 1);
        match self.overlay.get(&index) {
            Some(word) => Ok(*word),
            None => self.base.read_group(index),
        }
    }

    fn write_group(&mut self, index: u64, word: SlotWord) -> Result<()> {
        self.check_index(index)?;
        self.overlay.insert(index, word);
        self.record(SlotOp::Write { index, word });
        Ok(())
    }

    fn delete_group(&mut self, index: u64) -> Result<()> {
        if index + 1 != self.group_count {
            return Err(Error::Storage(format!(
                "Only the trailing group can be deleted (asked for {}, have {})",
                index, self.group_count
            )));
        }
        self.overlay.remove(&index);
        self.group_count -= 1;
        self.record(SlotOp::Delete { index });
        Ok(())
    }

    fn append_group(&mut self, word: SlotWord) -> Result<()> {
        self.overlay.insert(self.group_count, word);
        self.group_count += 1;
        self.record(SlotOp::Append { word });
        Ok(())
    }
}
