//! Error types for the core crate
//!
//! This module provides the error taxonomy shared by the scanning,
//! transcoding and partitioning stages.

use thiserror::Error;
use std::io;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// IO error while reading a dump file or writing an artifact
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// An insert block failed structured parsing after rewriting
    #[error("Malformed row data: {reason}")]
    MalformedRow {
        /// Why the rewritten fragment failed to parse
        reason: String,
        /// The offending raw fragment, truncated for diagnosis
        raw: String,
        /// The rewritten fragment that was handed to the structured parser
        rewritten: String,
    },

    /// Column/value arity mismatch between a header and a tuple
    #[error("Schema mismatch: header has {expected} columns, row has {actual} values")]
    SchemaMismatch {
        /// Number of columns in the header
        expected: usize,
        /// Number of values in the offending tuple
        actual: usize,
    },

    /// A string is not a valid digest of any supported algorithm
    #[error("Invalid digest {0:?}: expected 40 or 64 hex characters")]
    InvalidDigest(String),

    /// Requested table was not found in the dump
    #[error("Table `{0}` not found in dump")]
    TableNotFound(String),

    /// Hex decoding error
    #[error("Hex decoding error: {0}")]
    HexError(#[from] hex::FromHexError),

    /// Proof envelope serialization error
    #[error("Proof envelope error: {0}")]
    ProofError(#[from] bincode::Error),
}

/// Result type for the core crate
pub type Result<T> = std::result::Result<T, CoreError>;

/// Maximum number of bytes of offending text carried inside a
/// `MalformedRow` error.
const EXCERPT_LIMIT: usize = 512;

fn excerpt(s: &str) -> String {
    if s.len() <= EXCERPT_LIMIT {
        return s.to_string();
    }
    let mut end = EXCERPT_LIMIT;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

impl CoreError {
    /// Build a `MalformedRow` error, truncating the carried fragments so a
    /// single bad multi-megabyte block cannot blow up log output.
    pub fn malformed_row(reason: impl Into<String>, raw: &str, rewritten: &str) -> Self {
        CoreError::MalformedRow {
            reason: reason.into(),
            raw: excerpt(raw),
            rewritten: excerpt(rewritten),
        }
    }
}
