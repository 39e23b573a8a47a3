//! Cut batch driver
//!
//! # State machine
//!
//! ```text
//! Idle ──begin──→ Processing(group 0) → … → Processing(group n-1) ──finish──→ Idle
//!   │                  │
//!   │                  ├─ facet ≠ 0 → add / replace
//!   │                  └─ facet = 0 → remove (swap-compact)
//!   └─ load header + trailing word into the cache
//! ```
//!
//! The session works against any [`SlotArray`]; the registry hands it a
//! staged overlay so an error anywhere leaves the real store untouched.
//! Entry updates are staged the same way.

use super::cache::SlotCache;
use super::cut::{CutAction, CutReport, FacetCut};
use crate::error::{Error, Result};
use crate::storage::{SlotArray, SlotHeader, SLOT_CAPACITY};
use crate::types::{Entry, FacetAddress, Selector};
use std::collections::HashMap;
use tracing::{debug, trace};

pub struct CutSession<'a, A: SlotArray + ?Sized> {
    slots: &'a mut A,
    base: &'a HashMap<Selector, Entry>,
    staged: HashMap<Selector, Option<Entry>>,
    immutable_facet: Option<FacetAddress>,
    initial: SlotHeader,
    num_full_slots: u64,
    // Widened so it can momentarily reach SLOT_CAPACITY
    last_slot_len: usize,
    cache: SlotCache,
    report: CutReport,
}

impl<'a, A: SlotArray + ?Sized> CutSession<'a, A> {
    /// Load the header and, if non-empty, the trailing group
    pub fn begin(
        slots: &'a mut A,
        base: &'a HashMap<Selector, Entry>,
        immutable_facet: Option<FacetAddress>,
    ) -> Result<Self> {
        let initial = slots.length();
        let cache = if initial.last_slot_len > 0 {
            SlotCache::loaded(slots.read_group(initial.num_full_slots)?)
        } else {
            SlotCache::empty()
        };

        Ok(Self {
            slots,
            base,
            staged: HashMap::new(),
            immutable_facet,
            initial,
            num_full_slots: initial.num_full_slots,
            last_slot_len: initial.last_slot_len as usize,
            cache,
            report: CutReport::default(),
        })
    }

    /// Current entry for `selector`, staged updates first
    fn lookup(&self, selector: Selector) -> Option<Entry> {
        match self.staged.get(&selector) {
            Some(staged) => *staged,
            None => self.base.get(&selector).copied(),
        }
    }

    fn stage(&mut self, selector: Selector, entry: Option<Entry>) {
        self.staged.insert(selector, entry);
    }

    fn check_mutable(&self, selector: Selector, entry: &Entry) -> Result<()> {
        if self.immutable_facet == Some(entry.facet) {
            return Err(Error::ImmutableSelector { selector });
        }
        Ok(())
    }

    /// Process one group of the batch
    pub fn apply_group(&mut self, index: usize, cut: &FacetCut) -> Result<()> {
        if cut.selectors.is_empty() {
            return Err(Error::MalformedGroup { index });
        }

        debug!(
            group = index,
            facet = %cut.facet,
            selectors = cut.selectors.len(),
            action = ?cut.action(),
            "Processing cut group"
        );

        match cut.action() {
            CutAction::AddOrReplace => {
                for &selector in &cut.selectors {
                    self.add_or_replace(cut.facet, selector)?;
                }
            }
            CutAction::Remove => {
                for &selector in &cut.selectors {
                    self.remove(selector)?;
                }
            }
        }

        self.report.groups += 1;
        Ok(())
    }

    fn add_or_replace(&mut self, facet: FacetAddress, selector: Selector) -> Result<()> {
        if let Some(entry) = self.lookup(selector) {
            if entry.facet == facet {
                return Err(Error::DuplicateFacet { selector, facet });
            }
            self.check_mutable(selector, &entry)?;

            // Location is untouched, so no slot write
            self.stage(selector, Some(Entry { facet, ..entry }));
            self.report.replaced += 1;
            trace!(%selector, from = %entry.facet, to = %facet, "Replaced selector");
            return Ok(());
        }

        let slot = self.num_full_slots;
        let position = self.last_slot_len;
        self.cache.word.set(position, selector);
        self.last_slot_len += 1;
        self.stage(selector, Some(Entry::new(facet, slot, position as u8)));

        self.cache.dirty = true;
        if self.last_slot_len == SLOT_CAPACITY {
            self.cache.flush(&mut *self.slots, slot)?;
            self.cache = SlotCache::empty();
            self.num_full_slots += 1;
            self.last_slot_len = 0;
        }

        self.report.added += 1;
        trace!(%selector, slot, position, "Added selector");
        Ok(())
    }

    fn remove(&mut self, selector: Selector) -> Result<()> {
        let entry = self
            .lookup(selector)
            .ok_or(Error::UnknownSelector { selector })?;
        self.check_mutable(selector, &entry)?;

        if self.last_slot_len == 0 {
            // Trailing group was emptied (or never loaded): pull in the last full one
            if self.num_full_slots == 0 {
                return Err(Error::Corrupt(format!(
                    "Selector {} has an entry but the slot array is empty",
                    selector
                )));
            }
            self.num_full_slots -= 1;
            self.cache = SlotCache::loaded(self.slots.read_group(self.num_full_slots)?);
            self.last_slot_len = SLOT_CAPACITY;
        }

        let trailing = self.num_full_slots;
        let last_position = self.last_slot_len - 1;
        let last_selector = self.cache.word.get(last_position);
        let (target_slot, target_position) = entry.location();
        let target_position = target_position as usize;

        if target_slot != trailing {
            let mut word = self.slots.read_group(target_slot)?;
            if word.get(target_position) != selector {
                return Err(Error::Corrupt(format!(
                    "Slot {} position {} does not hold {}",
                    target_slot, target_position, selector
                )));
            }
            word.set(target_position, last_selector);
            self.slots.write_group(target_slot, word)?;
        } else {
            if self.cache.word.get(target_position) != selector {
                return Err(Error::Corrupt(format!(
                    "Trailing slot {} position {} does not hold {}",
                    trailing, target_position, selector
                )));
            }
            self.cache.word.set(target_position, last_selector);
        }

        self.cache.word.clear(last_position);
        self.last_slot_len -= 1;

        if self.last_slot_len == 0 {
            if self.cache.stored {
                self.slots.delete_group(trailing)?;
            }
            self.cache = SlotCache::empty();
        } else {
            self.cache.dirty = true;
        }

        if last_selector != selector {
            let moved = self.lookup(last_selector).ok_or_else(|| {
                Error::Corrupt(format!(
                    "Selector {} occupies slot {} but has no entry",
                    last_selector, trailing
                ))
            })?;
            self.stage(
                last_selector,
                Some(Entry::new(moved.facet, target_slot, target_position as u8)),
            );
        }

        self.stage(selector, None);
        self.report.removed += 1;
        trace!(%selector, moved = %last_selector, slot = target_slot, "Removed selector");
        Ok(())
    }

    /// Flush the cache and header; returns the entry updates that differ from the base
    pub fn finish(mut self) -> Result<(Vec<(Selector, Option<Entry>)>, CutReport)> {
        if self.last_slot_len > 0 {
            self.cache.flush(&mut *self.slots, self.num_full_slots)?;
        }

        let header = SlotHeader::new(self.num_full_slots, self.last_slot_len as u8);
        if header != self.initial {
            self.slots.set_length(header)?;
            self.report.header_written = true;
        }

        let base = self.base;
        let mut updates: Vec<_> = self
            .staged
            .into_iter()
            .filter(|(selector, entry)| base.get(selector) != entry.as_ref())
            .collect();
        updates.sort_by_key(|(selector, _)| *selector);

        Ok((updates, self.report))
    }
}
