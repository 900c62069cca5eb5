//! Timestamper Pipeline
//!
//! This crate orchestrates the batch pipeline: extract digests from dump
//! files, partition them by prefix, commit each partition artifact to the
//! external timestamping authority and publish the resulting artifact and
//! proof pairs.

// Error types and result
pub mod error;
pub use error::{PipelineError, Result, RunReport};

// Configuration
pub mod config;
pub use config::PipelineConfig;

// Timestamping authority capability
pub mod authority;
pub use authority::{CalendarAuthority, DigestSubmission, TimestampAuthority};

// Digest extraction from dump files
pub mod extract;
pub use extract::ExtractOutcome;

// Commitment builder
pub mod commit;
pub use commit::CommitOutcome;

// Artifact store and publication
pub mod publish;
pub use publish::{ArtifactStore, FsStore};

// Full-run orchestration
pub mod run;
pub use run::stamp_collection;
