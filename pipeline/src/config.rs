//! Configuration for the pipeline
//!
//! This module provides the configuration surface the pipeline depends on
//! from its caller: source files, the table and column of interest, the
//! partition prefix length, output locations and concurrency limits.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Collection name the artifacts are published under
    pub collection: String,

    /// Dump files to extract digests from
    pub sources: Vec<PathBuf>,

    /// Table of interest within each dump
    pub table: String,

    /// Column holding the digests
    pub column: String,

    /// Partition prefix length in hex characters.
    ///
    /// Chosen so the largest partition stays within a practical artifact
    /// size; not computed adaptively.
    pub prefix_length: usize,

    /// Directory artifacts and proofs are written to
    pub output_dir: PathBuf,

    /// Base URL published artifacts are reachable under
    pub base_url: String,

    /// Timestamping authority submission endpoint
    pub authority_url: String,

    /// Bound on simultaneous file/network operations
    pub concurrency: usize,

    /// Scanner read chunk size in bytes
    pub chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            collection: String::new(),
            sources: Vec::new(),
            table: String::new(),
            column: "sha256".to_string(),
            prefix_length: 3,
            output_dir: PathBuf::from("out"),
            base_url: "https://arthuredelstein.github.io/timestamper".to_string(),
            authority_url: "https://a.pool.opentimestamps.org".to_string(),
            concurrency: 32,
            chunk_size: timestamper_core::scan::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.collection.is_empty() {
            return Err(PipelineError::Config("no collection name".to_string()));
        }
        if self.sources.is_empty() {
            return Err(PipelineError::Config("no source files".to_string()));
        }
        if self.table.is_empty() {
            return Err(PipelineError::Config("no table name".to_string()));
        }
        if self.prefix_length == 0 || self.prefix_length > 8 {
            return Err(PipelineError::Config(format!(
                "prefix length {} out of range 1..=8",
                self.prefix_length
            )));
        }
        if self.concurrency == 0 {
            return Err(PipelineError::Config("concurrency must be positive".to_string()));
        }
        Ok(())
    }
}
