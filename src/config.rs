//! Registry configuration
//!
//! Sources, later ones win:
//! 1. built-in defaults
//! 2. a TOML file (`facetdb.toml` in the working directory, or `--config`)
//! 3. `FACETDB_*` environment variables, e.g. `FACETDB_COMPACT_AFTER=64`

use crate::error::{Error, Result};
use crate::registry::RegistryOptions;
use crate::storage::JournalOptions;
use crate::types::FacetAddress;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "facetdb.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory holding the journal
    pub data_dir: PathBuf,
    /// Directory for rolling log files
    pub log_dir: PathBuf,
    /// trace, debug, info, warn or error
    pub log_level: String,
    /// fsync every journal append
    pub sync_writes: bool,
    /// Compact the journal after this many batches (0 = never)
    pub compact_after: u64,
    /// Check registry invariants on open
    pub verify_on_open: bool,
    /// Selectors bound to this facet cannot be replaced or removed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub immutable_facet: Option<FacetAddress>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let journal = JournalOptions::default();
        Self {
            data_dir: PathBuf::from("data/facetdb"),
            log_dir: PathBuf::from("logs"),
            log_level: "info".to_string(),
            sync_writes: journal.sync_writes,
            compact_after: journal.compact_after,
            verify_on_open: true,
            immutable_facet: None,
        }
    }
}

impl RegistryConfig {
    /// Load configuration; an explicit `path` must exist
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("FACETDB").try_parsing(true))
            .build()
            .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))?;

        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Parse configuration from TOML text alone
    pub fn from_toml(text: &str) -> Result<Self> {
        let parsed: Self = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to render configuration: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(Error::Config(format!(
                "Unknown log level '{}'",
                self.log_level
            )));
        }
        if self.immutable_facet.is_some_and(|facet| facet.is_zero()) {
            return Err(Error::Config(
                "immutable_facet cannot be the zero address".to_string(),
            ));
        }
        Ok(())
    }

    pub fn journal_options(&self) -> JournalOptions {
        JournalOptions {
            sync_writes: self.sync_writes,
            compact_after: self.compact_after,
        }
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            immutable_facet: self.immutable_facet,
            verify_on_open: self.verify_on_open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_render_and_parse() -> Result<()> {
        let config = RegistryConfig::default();
        let text = config.to_toml()?;
        assert!(text.contains("compact_after = 1024"));
        assert!(!text.contains("immutable_facet"));

        assert_eq!(RegistryConfig::from_toml(&text)?, config);
        Ok(())
    }

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let text = format!(
            "sync_writes = false\nimmutable_facet = \"0x{}\"\n",
            "aa".repeat(20)
        );
        let config = RegistryConfig::from_toml(&text)?;

        assert!(!config.sync_writes);
        assert_eq!(config.immutable_facet, Some(FacetAddress::repeat(0xaa)));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.registry_options().immutable_facet, config.immutable_facet);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(RegistryConfig::from_toml("log_level = \"loud\"").is_err());
        let zero = format!("immutable_facet = \"0x{}\"", "00".repeat(20));
        assert!(RegistryConfig::from_toml(&zero).is_err());
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .map_err(|e| Error::Storage(e.to_string()))?;
        writeln!(file, "compact_after = 7\ndata_dir = \"/tmp/registry\"")
            .map_err(|e| Error::Storage(e.to_string()))?;

        let config = RegistryConfig::load(Some(file.path()))?;
        assert_eq!(config.compact_after, 7);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/registry"));
        assert_eq!(config.journal_options().compact_after, 7);
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let missing = Path::new("/nonexistent/facetdb-config.toml");
        assert!(RegistryConfig::load(Some(missing)).is_err());
    }
}
