// facetdb - Compact selector registry
// Maps 4-byte selectors to 20-byte facet addresses over a slot-packed array

#![warn(rust_2018_idioms)]

pub mod config;
pub mod metrics;
pub mod registry;
pub mod storage;
pub mod types;

// Re-exports for convenience
pub use config::RegistryConfig;
pub use registry::{
    CutAction, CutReport, Entry, Facet, FacetCut, RegistryOptions, SelectorRegistry,
    SharedRegistry,
};
pub use storage::{JournalStore, MemoryStore, RegistryStore, SlotArray, SlotHeader, SlotWord};
pub use types::{FacetAddress, Selector};

/// facetdb error types
pub mod error {
    use crate::types::{FacetAddress, Selector};
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Malformed cut group {index}: selector list is empty")]
        MalformedGroup { index: usize },

        #[error("Selector {selector} is already bound to facet {facet}")]
        DuplicateFacet {
            selector: Selector,
            facet: FacetAddress,
        },

        #[error("Unknown selector: {selector}")]
        UnknownSelector { selector: Selector },

        #[error("Selector {selector} is immutable")]
        ImmutableSelector { selector: Selector },

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Storage error: {0}")]
        Storage(String),

        #[error("Serialization error: {0}")]
        Serialization(String),

        #[error("Corrupt registry: {0}")]
        Corrupt(String),

        #[error("Configuration error: {0}")]
        Config(String),
    }

    impl Error {
        /// Caller errors reject the request itself; everything else is a fault of the store.
        pub fn is_caller_error(&self) -> bool {
            matches!(
                self,
                Error::MalformedGroup { .. }
                    | Error::DuplicateFacet { .. }
                    | Error::UnknownSelector { .. }
                    | Error::ImmutableSelector { .. }
                    | Error::InvalidArgument(_)
            )
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
