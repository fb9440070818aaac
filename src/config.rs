//! Engine configuration
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (bpmodel.toml)
//! - Environment variables (BPMODEL_*)
//!
//! ## Example config file (bpmodel.toml):
//! ```toml
//! [loader]
//! cv_dir = "./cv"
//! skip_cv_parse = false
//!
//! [ingest]
//! batch_size = 20000
//!
//! [projection]
//! document_size_limit = 16777216
//! safety_margin = 65536
//! max_cv_terms = 256
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::load::LoadOptions;
use crate::project::document::{
    ProjectionConfig, DEFAULT_DOCUMENT_LIMIT, DEFAULT_SAFETY_MARGIN, MAX_SEGMENT_TERMS,
};
use crate::validate::DEFAULT_BATCH_SIZE;

/// Main configuration for the model engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Loader settings
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Bulk ingest settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Backend projection settings
    #[serde(default)]
    pub projection: ProjectionSection,
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoaderConfig {
    /// Directory external CV paths are resolved against
    #[serde(default)]
    pub cv_dir: Option<PathBuf>,

    /// Leave external-file CVs unresolved instead of reading them
    #[serde(default)]
    pub skip_cv_parse: bool,
}

/// Bulk ingest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Records per batch; ingest is cancellable between batches
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Projection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionSection {
    /// Backend per-document size limit in bytes
    #[serde(default = "default_document_limit")]
    pub document_size_limit: usize,

    /// Margin kept free below the limit
    #[serde(default = "default_safety_margin")]
    pub safety_margin: usize,

    /// Maximum terms per CV segment
    #[serde(default = "default_max_cv_terms")]
    pub max_cv_terms: usize,
}

// Default value functions
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_document_limit() -> usize {
    DEFAULT_DOCUMENT_LIMIT
}

fn default_safety_margin() -> usize {
    DEFAULT_SAFETY_MARGIN
}

fn default_max_cv_terms() -> usize {
    MAX_SEGMENT_TERMS
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ProjectionSection {
    fn default() -> Self {
        Self {
            document_size_limit: default_document_limit(),
            safety_margin: default_safety_margin(),
            max_cv_terms: default_max_cv_terms(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["bpmodel.toml", ".bpmodel.toml", "config/bpmodel.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("BPMODEL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// The loader options this configuration describes
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            cv_dir: self.loader.cv_dir.clone(),
            skip_cv_parse: self.loader.skip_cv_parse,
        }
    }

    /// The projection knobs this configuration describes
    pub fn projection_config(&self) -> ProjectionConfig {
        ProjectionConfig {
            document_size_limit: self.projection.document_size_limit,
            safety_margin: self.projection.safety_margin,
            max_cv_terms: self.projection.max_cv_terms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.ingest.batch_size, 20_000);
        assert_eq!(config.projection.max_cv_terms, 256);
        assert_eq!(config.projection.document_size_limit, 16 * 1024 * 1024);
        assert!(!config.loader.skip_cv_parse);
    }

    #[test]
    fn test_serialize_config() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[loader]"));
        assert!(toml_str.contains("[projection]"));
    }
}
