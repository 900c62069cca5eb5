//! Commitment proof envelope
//!
//! A proof envelope binds one artifact's digest to an opaque attestation
//! issued by the external timestamping authority. The envelope format is
//! this project's own; the attestation body is treated as a black box and
//! never interpreted here. Envelopes have a `Pending → Confirmed`
//! lifecycle and are immutable once confirmed.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::DigestAlgorithm;
use crate::error::Result;

/// File extension for serialized proof envelopes
pub const PROOF_EXTENSION: &str = "ots";

/// Lifecycle state of a proof
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofStatus {
    /// Submitted to the authority, awaiting a stronger confirmation
    Pending,

    /// Fully confirmed; the envelope is immutable from here on
    Confirmed,
}

/// Serializable proof envelope for one artifact or digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofEnvelope {
    /// Raw bytes of the digest the authority attested to
    pub file_digest: Vec<u8>,

    /// Algorithm of `file_digest`
    pub algorithm: DigestAlgorithm,

    /// Lifecycle state
    pub status: ProofStatus,

    /// Opaque attestation bytes returned by the authority
    pub attestation: Vec<u8>,

    /// When the digest was submitted to the authority
    pub stamped_at: DateTime<Utc>,
}

impl ProofEnvelope {
    /// Create a pending envelope for a freshly submitted digest
    pub fn pending(file_digest: Vec<u8>, algorithm: DigestAlgorithm, attestation: Vec<u8>) -> Self {
        ProofEnvelope {
            file_digest,
            algorithm,
            status: ProofStatus::Pending,
            attestation,
            stamped_at: Utc::now(),
        }
    }

    /// Whether the proof has been confirmed
    pub fn is_confirmed(&self) -> bool {
        self.status == ProofStatus::Confirmed
    }

    /// Strengthen a pending proof with an upgraded attestation.
    ///
    /// Idempotent: upgrading an already-confirmed envelope leaves it
    /// untouched, including its original attestation bytes.
    pub fn upgrade(&mut self, attestation: Vec<u8>) {
        if self.is_confirmed() {
            return;
        }
        self.attestation = attestation;
        self.status = ProofStatus::Confirmed;
    }

    /// Serialize the envelope to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize an envelope from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Write the envelope next to its artifact
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Read an envelope from a file
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}
