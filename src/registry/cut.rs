//! Cut groups and batch reports

use crate::error::{Error, Result};
use crate::types::{FacetAddress, Selector};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a cut group does, derived from its facet address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutAction {
    /// Bind unknown selectors, rebind known ones
    AddOrReplace,
    /// Unbind selectors (facet is the zero sentinel)
    Remove,
}

/// One `(facet, selectors)` group of a cut batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCut {
    pub facet: FacetAddress,
    pub selectors: Vec<Selector>,
}

impl FacetCut {
    pub fn new(facet: FacetAddress, selectors: Vec<Selector>) -> Self {
        Self { facet, selectors }
    }

    /// Group binding `selectors` to `facet`
    pub fn add(facet: FacetAddress, selectors: impl IntoIterator<Item = Selector>) -> Self {
        Self::new(facet, selectors.into_iter().collect())
    }

    /// Group unbinding `selectors`
    pub fn remove(selectors: impl IntoIterator<Item = Selector>) -> Self {
        Self::new(FacetAddress::ZERO, selectors.into_iter().collect())
    }

    pub fn action(&self) -> CutAction {
        if self.facet.is_zero() {
            CutAction::Remove
        } else {
            CutAction::AddOrReplace
        }
    }
}

/// Reject batches containing a group with no selectors
pub fn validate_batch(cuts: &[FacetCut]) -> Result<()> {
    match cuts.iter().position(|cut| cut.selectors.is_empty()) {
        Some(index) => Err(Error::MalformedGroup { index }),
        None => Ok(()),
    }
}

/// Parse a JSON cut batch: `[{"facet": "0x…", "selectors": ["0x…"]}, …]`
pub fn parse_batch(json: &str) -> Result<Vec<FacetCut>> {
    serde_json::from_str(json)
        .map_err(|e| Error::InvalidArgument(format!("Invalid cut batch: {}", e)))
}

/// Read a JSON cut batch from a file
pub fn load_batch<P: AsRef<Path>>(path: P) -> Result<Vec<FacetCut>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| {
        Error::Storage(format!("Failed to read cut batch {}: {}", path.display(), e))
    })?;
    parse_batch(&json)
}

/// Outcome of a committed cut batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CutReport {
    pub groups: usize,
    pub added: usize,
    pub replaced: usize,
    pub removed: usize,
    /// Slot words read from the store (cache hits excluded)
    pub word_reads: u64,
    /// Slot words written, appended or deleted, plus the header write
    pub word_writes: u64,
    pub header_written: bool,
}

impl CutReport {
    pub fn changed(&self) -> usize {
        self.added + self.replaced + self.removed
    }
}
