//! Shared registry handle
//!
//! Lookups take the read lock and cut batches the write lock, so readers
//! only ever see the state between two batches.

use super::cut::{CutReport, FacetCut};
use super::{Entry, SelectorRegistry};
use crate::error::Result;
use crate::storage::RegistryStore;
use crate::types::{FacetAddress, Selector};
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

pub struct SharedRegistry<S: RegistryStore> {
    inner: Arc<RwLock<SelectorRegistry<S>>>,
}

impl<S: RegistryStore> Clone for SharedRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RegistryStore> SharedRegistry<S> {
    pub fn new(registry: SelectorRegistry<S>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    pub fn resolve(&self, selector: Selector) -> Option<FacetAddress> {
        self.inner.read().resolve(selector)
    }

    pub fn entry(&self, selector: Selector) -> Option<Entry> {
        self.inner.read().entry(selector)
    }

    /// Apply a batch while holding the write lock
    pub fn apply_cut(&self, cuts: &[FacetCut]) -> Result<CutReport> {
        self.inner.write().apply_cut(cuts)
    }

    /// Read access for loupe queries
    pub fn read(&self) -> RwLockReadGuard<'_, SelectorRegistry<S>> {
        self.inner.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::thread;

    #[test]
    fn test_readers_see_whole_batches() -> Result<()> {
        let shared = SharedRegistry::new(SelectorRegistry::open(MemoryStore::new())?);
        let facet = FacetAddress::repeat(0xaa);

        let writer = {
            let shared = shared.clone();
            thread::spawn(move || -> Result<()> {
                for round in 0..20u32 {
                    let selectors: Vec<_> = (0..10).map(|i| Selector::from(round * 100 + i)).collect();
                    shared.apply_cut(&[FacetCut::add(facet, selectors)])?;
                }
                Ok(())
            })
        };

        for _ in 0..50 {
            // Batches add ten selectors at a time
            assert_eq!(shared.read().len() % 10, 0);
        }

        writer.join().expect("writer thread panicked")?;
        assert_eq!(shared.read().len(), 200);
        assert_eq!(shared.resolve(Selector::from(1909)), Some(facet));
        Ok(())
    }
}
