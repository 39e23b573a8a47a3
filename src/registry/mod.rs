//! Selector registry
//!
//! # Architecture
//!
//! ```text
//! SelectorRegistry
//!   ├─→ entries: selector → (facet, slot, position)     (in memory)
//!   └─→ store: RegistryStore
//!        ├─→ header (num_full_slots, last_slot_len)
//!        └─→ groups [s0..s7][s8..s15]…[trailing]
//! ```
//!
//! Every cut batch is staged against the store, then committed with one
//! [`RegistryStore::apply`] call. The entry map is only updated after the
//! store accepted the batch, so the two never disagree.

pub mod batch;
pub mod cache;
pub mod cut;
mod shared;

pub use batch::CutSession;
pub use cache::SlotCache;
pub use cut::{load_batch, parse_batch, validate_batch, CutAction, CutReport, FacetCut};
pub use shared::SharedRegistry;

pub use crate::types::Entry;

use crate::error::{Error, Result};
use crate::metrics;
use crate::storage::{
    merge_entries, ChangeSet, JournalStore, RegistryStore, SlotHeader, StagedSlots, SLOT_CAPACITY,
};
use crate::types::{FacetAddress, Selector};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Registry behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Selectors bound to this facet can be neither replaced nor removed
    pub immutable_facet: Option<FacetAddress>,
    /// Run [`SelectorRegistry::verify`] when opening
    pub verify_on_open: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            immutable_facet: None,
            verify_on_open: true,
        }
    }
}

/// A facet and the selectors bound to it, in slot order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    pub address: FacetAddress,
    pub selectors: Vec<Selector>,
}

/// Selector → facet registry over a slot-packed store
pub struct SelectorRegistry<S: RegistryStore> {
    store: S,
    entries: HashMap<Selector, Entry>,
    options: RegistryOptions,
}

impl<S: RegistryStore> SelectorRegistry<S> {
    /// Open a registry over `store` with default options
    pub fn open(store: S) -> Result<Self> {
        Self::with_options(store, RegistryOptions::default())
    }

    pub fn with_options(store: S, options: RegistryOptions) -> Result<Self> {
        let entries = store.load_entries()?;
        let registry = Self {
            store,
            entries,
            options,
        };

        if options.verify_on_open {
            registry.verify()?;
        }

        metrics::LIVE_SELECTORS.set(registry.len() as i64);
        info!(
            selectors = registry.len(),
            header = %registry.header(),
            "Opened selector registry"
        );
        Ok(registry)
    }

    /// Apply a cut batch; all groups commit or none do
    pub fn apply_cut(&mut self, cuts: &[FacetCut]) -> Result<CutReport> {
        let (changes, report) = match self.stage_cut(cuts) {
            Ok(staged) => staged,
            Err(e) => {
                metrics::record_failure();
                warn!(error = %e, groups = cuts.len(), "Cut batch rejected");
                return Err(e);
            }
        };

        if !changes.is_empty() {
            let updates = changes.entries.clone();
            if let Err(e) = self.store.apply(changes) {
                metrics::record_failure();
                warn!(error = %e, "Failed to commit cut batch");
                return Err(e);
            }
            merge_entries(&mut self.entries, &updates);
        }

        metrics::record_commit(&report, self.len());
        info!(
            groups = report.groups,
            added = report.added,
            replaced = report.replaced,
            removed = report.removed,
            word_reads = report.word_reads,
            word_writes = report.word_writes,
            "Committed cut batch"
        );
        Ok(report)
    }

    /// Run the batch against a staged view of the store
    fn stage_cut(&self, cuts: &[FacetCut]) -> Result<(ChangeSet, CutReport)> {
        validate_batch(cuts)?;

        let mut staged = StagedSlots::new(&self.store);
        let (entries, mut report) = {
            let mut session =
                CutSession::begin(&mut staged, &self.entries, self.options.immutable_facet)?;
            for (index, cut) in cuts.iter().enumerate() {
                session.apply_group(index, cut)?;
            }
            session.finish()?
        };

        let io = staged.stats();
        report.word_reads = io.word_reads;
        report.word_writes = io.word_writes;

        let changes = ChangeSet {
            ops: staged.into_ops(),
            entries,
        };
        debug!(ops = changes.ops.len(), entries = changes.entries.len(), "Staged cut batch");
        Ok((changes, report))
    }

    /// Facet bound to `selector`, `None` when not found
    pub fn resolve(&self, selector: Selector) -> Option<FacetAddress> {
        self.entries.get(&selector).map(|entry| entry.facet)
    }

    pub fn entry(&self, selector: Selector) -> Option<Entry> {
        self.entries.get(&selector).copied()
    }

    /// Number of live selectors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn header(&self) -> SlotHeader {
        self.store.length()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// All live selectors in slot order
    pub fn selectors(&self) -> Vec<Selector> {
        let mut located: Vec<_> = self
            .entries
            .iter()
            .map(|(selector, entry)| (entry.location(), *selector))
            .collect();
        located.sort_unstable();
        located.into_iter().map(|(_, selector)| selector).collect()
    }

    /// Facets with their selectors, ordered by first appearance in the slot array
    pub fn facets(&self) -> Vec<Facet> {
        let mut facets: Vec<Facet> = Vec::new();
        let mut index: HashMap<FacetAddress, usize> = HashMap::new();

        for selector in self.selectors() {
            let address = self.entries[&selector].facet;
            let i = *index.entry(address).or_insert_with(|| {
                facets.push(Facet {
                    address,
                    selectors: Vec::new(),
                });
                facets.len() - 1
            });
            facets[i].selectors.push(selector);
        }
        facets
    }

    /// Selectors bound to `address`, in slot order
    pub fn facet_selectors(&self, address: FacetAddress) -> Vec<Selector> {
        self.selectors()
            .into_iter()
            .filter(|selector| self.resolve(*selector) == Some(address))
            .collect()
    }

    /// Distinct facet addresses, ordered by first appearance
    pub fn facet_addresses(&self) -> Vec<FacetAddress> {
        self.facets().into_iter().map(|facet| facet.address).collect()
    }

    /// Check that the entry map and the slot array agree
    ///
    /// Reads every group. Fails with [`Error::Corrupt`] naming the first violation.
    pub fn verify(&self) -> Result<()> {
        let header = self.store.length();
        if header.last_slot_len as usize >= SLOT_CAPACITY {
            return Err(Error::Corrupt(format!(
                "Trailing slot length {} out of range",
                header.last_slot_len
            )));
        }

        if self.store.group_count() != header.group_count() {
            return Err(Error::Corrupt(format!(
                "Store holds {} groups but header ({}) needs {}",
                self.store.group_count(),
                header,
                header.group_count()
            )));
        }

        if self.entries.len() as u64 != header.selector_count() {
            return Err(Error::Corrupt(format!(
                "{} entries but header ({}) counts {}",
                self.entries.len(),
                header,
                header.selector_count()
            )));
        }

        let mut seen = HashSet::with_capacity(self.entries.len());
        for index in 0..header.group_count() {
            let word = self.store.read_group(index)?;
            let occupancy = header.occupancy(index);

            for position in 0..SLOT_CAPACITY {
                let selector = word.get(position);
                if position >= occupancy {
                    if !selector.is_zero() {
                        return Err(Error::Corrupt(format!(
                            "Stale selector {} past the end of slot {}",
                            selector, index
                        )));
                    }
                    continue;
                }

                let entry = self.entries.get(&selector).ok_or_else(|| {
                    Error::Corrupt(format!(
                        "Slot {} position {} holds {} which has no entry",
                        index, position, selector
                    ))
                })?;
                if entry.location() != (index, position as u8) {
                    return Err(Error::Corrupt(format!(
                        "Entry for {} points at {:?}, found at ({}, {})",
                        selector,
                        entry.location(),
                        index,
                        position
                    )));
                }
                if entry.facet.is_zero() {
                    return Err(Error::Corrupt(format!(
                        "Selector {} is bound to the zero facet",
                        selector
                    )));
                }
                if !seen.insert(selector) {
                    return Err(Error::Corrupt(format!(
                        "Selector {} appears in two cells",
                        selector
                    )));
                }
            }
        }

        Ok(())
    }
}

impl SelectorRegistry<JournalStore> {
    /// Rewrite the journal as a single snapshot of the current state
    pub fn compact(&mut self) -> Result<()> {
        self.store.compact()
    }
}
