//! Timestamping authority capability
//!
//! The external trusted-timestamping authority is a black box behind a
//! narrow interface: submit a batch of digests, receive one opaque proof
//! per digest, and later upgrade pending proofs to confirmed ones. The
//! partition and verification logic is independent of which authority
//! backs this interface, so implementations are pluggable and the
//! boundary is mockable in tests.

use async_trait::async_trait;
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use timestamper_core::{DigestAlgorithm, ProofEnvelope};

use crate::error::{PipelineError, Result};

/// One digest handed to the authority
#[derive(Debug, Clone)]
pub struct DigestSubmission {
    /// Raw digest bytes
    pub digest: Vec<u8>,

    /// Algorithm that produced the digest
    pub algorithm: DigestAlgorithm,
}

/// Capability interface to the external timestamping authority
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TimestampAuthority: Send + Sync {
    /// Submit a batch of digests in one run, returning one pending proof
    /// envelope per digest, in submission order.
    async fn submit(&self, batch: Vec<DigestSubmission>) -> Result<Vec<ProofEnvelope>>;

    /// Strengthen a pending proof.
    ///
    /// Must tolerate being invoked on an already-confirmed proof as a
    /// no-op.
    async fn upgrade(&self, proof: &mut ProofEnvelope) -> Result<()>;
}

/// HTTP calendar-backed authority
///
/// Each digest is posted to the calendar's `digest` endpoint; the
/// response body is kept verbatim as the opaque attestation. Pending
/// attestations are posted to the `upgrade` endpoint to obtain the
/// confirmed form.
#[derive(Debug, Clone)]
pub struct CalendarAuthority {
    client: Client,
    base_url: String,
}

impl CalendarAuthority {
    /// Create an authority client for the calendar at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        CalendarAuthority {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, endpoint: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self.client.post(&url).body(body).send().await?;
        if !response.status().is_success() {
            return Err(PipelineError::Authority(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(PipelineError::Authority(format!(
                "{} returned an empty attestation",
                url
            )));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TimestampAuthority for CalendarAuthority {
    async fn submit(&self, batch: Vec<DigestSubmission>) -> Result<Vec<ProofEnvelope>> {
        info!(
            "submitting {} digests to calendar {}",
            batch.len(),
            self.base_url
        );
        let mut proofs = Vec::with_capacity(batch.len());
        for submission in batch {
            let attestation = self.post("digest", submission.digest.clone()).await?;
            debug!(
                "received {} byte attestation for {}",
                attestation.len(),
                hex::encode(&submission.digest)
            );
            proofs.push(ProofEnvelope::pending(
                submission.digest,
                submission.algorithm,
                attestation,
            ));
        }
        Ok(proofs)
    }

    async fn upgrade(&self, proof: &mut ProofEnvelope) -> Result<()> {
        if proof.is_confirmed() {
            return Ok(());
        }
        let attestation = self.post("upgrade", proof.attestation.clone()).await?;
        proof.upgrade(attestation);
        Ok(())
    }
}
