//! # Timestamper Core
//!
//! Core building blocks of the timestamping pipeline: the bounded-memory
//! byte-stream scanner, the dump-record transcoder, the digest model and
//! the prefix partitioner, plus the proof envelope shared between the
//! commitment builder and the verifier.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod digest;
pub mod dump;
pub mod error;
pub mod partition;
pub mod proof;
pub mod scan;

/// Re-export common types for ease of use
pub use digest::{Digest, DigestAlgorithm};
pub use dump::{DumpReader, Record, SqlValue};
pub use error::{CoreError, Result};
pub use partition::{Artifact, PartitionMap};
pub use proof::{ProofEnvelope, ProofStatus, PROOF_EXTENSION};
pub use scan::{ScanOptions, ScanResult, Scanner};

/// Version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
