//! Error types for the pipeline
//!
//! Extraction-stage errors are collected per unit of work and reported in
//! aggregate at the end of a run; commitment-stage errors block
//! publication of only the affected artifacts.

use thiserror::Error;
use std::io;
use timestamper_core::CoreError;

/// Result type for the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error type for the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error from the core scanning/transcoding/partitioning layer
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// External timestamping authority call failed or returned an
    /// unparsable proof; retryable, never corrupts written artifacts
    #[error("Authority error: {0}")]
    Authority(String),

    /// Artifact store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of one unit of work in a best-effort batch
#[derive(Debug)]
pub struct UnitFailure {
    /// Identifier of the failed unit (a source path, a prefix, an object key)
    pub unit: String,

    /// The failure itself
    pub error: PipelineError,
}

/// Aggregate report for a best-effort run
///
/// Individual failures never cancel sibling units of work; they are
/// collected here and surfaced at the end of the run, never dropped.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Units that completed
    pub succeeded: usize,

    /// Units that failed, with their errors
    pub failures: Vec<UnitFailure>,
}

impl RunReport {
    /// Record one successful unit
    pub fn success(&mut self) {
        self.succeeded += 1;
    }

    /// Record one failed unit
    pub fn failure(&mut self, unit: impl Into<String>, error: PipelineError) {
        self.failures.push(UnitFailure {
            unit: unit.into(),
            error,
        });
    }

    /// Whether every unit succeeded
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: RunReport) {
        self.succeeded += other.succeeded;
        self.failures.extend(other.failures);
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed",
            self.succeeded,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.unit, failure.error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_collects_failures() {
        let mut report = RunReport::default();
        report.success();
        report.failure("dump-a.sql", PipelineError::Authority("timeout".to_string()));
        assert!(!report.is_complete());
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);

        let rendered = report.to_string();
        assert!(rendered.contains("1 succeeded, 1 failed"));
        assert!(rendered.contains("dump-a.sql"));
    }

    #[test]
    fn test_report_merge() {
        let mut a = RunReport::default();
        a.success();
        let mut b = RunReport::default();
        b.success();
        b.failure("x", PipelineError::Store("gone".to_string()));
        a.merge(b);
        assert_eq!(a.succeeded, 2);
        assert_eq!(a.failures.len(), 1);
    }
}
