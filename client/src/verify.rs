//! Verification of published artifacts
//!
//! Given a digest and a collection, the verifier fetches the published
//! partition artifact and its sibling proof, confirms the digest occurs
//! as an offset-aligned entry of the artifact, and confirms the
//! artifact's SHA-256 matches the digest embedded in the proof envelope.
//! Verification runs against untrusted third-party claims, so every
//! failure is a typed result, never a panic.

use std::collections::HashMap;

use log::debug;
use reqwest::Client;
use sha2::{Digest as _, Sha256};
use thiserror::Error;

use timestamper_core::{Digest, ProofEnvelope, PROOF_EXTENSION};

/// Error type for verification
#[derive(Debug, Error)]
pub enum VerifyError {
    /// No prefix length is configured for the named collection
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// The queried digest is not a well-formed SHA-1 or SHA-256 hex value
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Network or HTTP failure while fetching published artifacts
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// The digest is absent from the fetched artifact
    #[error("Digest not found in partition artifact")]
    NotFound,

    /// The digest is present but the artifact bytes disagree with the
    /// proof, or the proof itself cannot be decoded
    #[error("Artifact inconsistent with its proof: {0}")]
    ArtifactTampered(String),
}

/// Result type for verification
pub type Result<T> = std::result::Result<T, VerifyError>;

/// Client for verifying digests against published collections
#[derive(Debug, Clone)]
pub struct VerifyClient {
    client: Client,
    base_url: String,
    collections: HashMap<String, usize>,
}

impl VerifyClient {
    /// Create a verifier for artifacts published under `base_url`,
    /// preconfigured with the standard collections.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut collections = HashMap::new();
        collections.insert("libgen_fiction".to_string(), 3);
        collections.insert("libgen_nonfiction".to_string(), 3);
        VerifyClient {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collections,
        }
    }

    /// Register a collection and its partition prefix length
    pub fn with_collection(mut self, name: impl Into<String>, prefix_length: usize) -> Self {
        self.collections.insert(name.into(), prefix_length);
        self
    }

    /// Verify that `digest_hex` is committed in `collection`.
    ///
    /// On success the validated proof envelope is returned; the caller
    /// can read the attested time bound from it. All failures are typed.
    /// The artifact is checked against its proof before the inclusion
    /// check runs: a tampered artifact is `ArtifactTampered` whether or
    /// not the queried digest still appears in it, and `NotFound` is
    /// only ever reported for a proof-consistent artifact.
    pub async fn verify(&self, collection: &str, digest_hex: &str) -> Result<ProofEnvelope> {
        let prefix_length = *self
            .collections
            .get(collection)
            .ok_or_else(|| VerifyError::UnknownCollection(collection.to_string()))?;
        let digest = Digest::parse(digest_hex)
            .map_err(|e| VerifyError::InvalidDigest(e.to_string()))?;

        let prefix = digest.prefix(prefix_length);
        let artifact_url = format!("{}/{}/{}", self.base_url, collection, prefix);
        let artifact = self.fetch(&artifact_url).await?;
        debug!(
            "fetched artifact {} ({} bytes) for digest {}",
            artifact_url,
            artifact.len(),
            digest
        );

        let proof_url = format!("{}.{}", artifact_url, PROOF_EXTENSION);
        let proof_bytes = self.fetch(&proof_url).await?;
        let proof = ProofEnvelope::from_bytes(&proof_bytes)
            .map_err(|e| VerifyError::ArtifactTampered(format!("undecodable proof: {}", e)))?;

        let artifact_digest = sha256(&artifact);
        if proof.file_digest != artifact_digest {
            return Err(VerifyError::ArtifactTampered(
                "artifact hash disagrees with proof digest".to_string(),
            ));
        }

        if !contains_aligned(&artifact, &digest.raw_bytes()) {
            return Err(VerifyError::NotFound);
        }
        Ok(proof)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| VerifyError::FetchFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VerifyError::FetchFailed(format!(
                "{} {}",
                response.status(),
                url
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| VerifyError::FetchFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Whether `needle` occurs in `artifact` aligned to its own byte width.
///
/// Partition artifacts are plain concatenations of fixed-width digests,
/// so a coincidental match straddling two entries must not count as
/// inclusion.
fn contains_aligned(artifact: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return false;
    }
    artifact
        .chunks_exact(needle.len())
        .any(|entry| entry == needle)
}

fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use timestamper_core::DigestAlgorithm;

    const HASH: &str = "aa11223344556677889900aabbccddeeff00112233445566778899aabbccddee";
    const OTHER: &str = "aa99887766554433221100ffeeddccbbaa99887766554433221100ffeeddccbb";

    fn artifact_bytes() -> Vec<u8> {
        let mut bytes = hex::decode(HASH).unwrap();
        bytes.extend(hex::decode(OTHER).unwrap());
        bytes
    }

    fn proof_for(artifact: &[u8]) -> Vec<u8> {
        ProofEnvelope::pending(sha256(artifact), DigestAlgorithm::Sha256, b"att".to_vec())
            .to_bytes()
            .unwrap()
    }

    #[test]
    fn test_contains_aligned_rejects_straddling_match() {
        // The digest's bytes appear contiguously but offset by half an
        // entry, which must not count as inclusion.
        let needle = hex::decode(HASH).unwrap();
        let mut artifact = vec![0u8; 16];
        artifact.extend_from_slice(&needle);
        artifact.extend(vec![0u8; 16]);
        assert!(!contains_aligned(&artifact, &needle));

        let mut aligned = needle.clone();
        aligned.extend(vec![0u8; 32]);
        assert!(contains_aligned(&aligned, &needle));
    }

    #[tokio::test]
    async fn test_verify_succeeds_for_committed_digest() {
        let artifact = artifact_bytes();
        let proof = proof_for(&artifact);

        let mut server = mockito::Server::new_async().await;
        let _artifact_mock = server
            .mock("GET", "/libgen_fiction/AA1")
            .with_body(artifact)
            .create_async()
            .await;
        let _proof_mock = server
            .mock("GET", "/libgen_fiction/AA1.ots")
            .with_body(proof)
            .create_async()
            .await;

        let client = VerifyClient::new(server.url());
        let envelope = client.verify("libgen_fiction", HASH).await.unwrap();
        assert_eq!(envelope.algorithm, DigestAlgorithm::Sha256);
    }

    #[tokio::test]
    async fn test_verify_not_found_for_absent_digest() {
        let artifact = hex::decode(OTHER).unwrap();
        let proof = proof_for(&artifact);
        let mut server = mockito::Server::new_async().await;
        let _artifact_mock = server
            .mock("GET", "/libgen_fiction/AA1")
            .with_body(artifact)
            .create_async()
            .await;
        let _proof_mock = server
            .mock("GET", "/libgen_fiction/AA1.ots")
            .with_body(proof)
            .create_async()
            .await;

        let client = VerifyClient::new(server.url());
        let err = client.verify("libgen_fiction", HASH).await.unwrap_err();
        assert!(matches!(err, VerifyError::NotFound));
    }

    #[tokio::test]
    async fn test_verify_detects_tampered_artifact() {
        // Flip one byte of the sibling entry: the queried digest is still
        // present and aligned, so this must surface as ArtifactTampered,
        // never NotFound or a false success.
        let mut artifact = artifact_bytes();
        let proof = proof_for(&artifact);
        let last = artifact.len() - 1;
        artifact[last] ^= 0x01;

        let mut server = mockito::Server::new_async().await;
        let _artifact_mock = server
            .mock("GET", "/libgen_fiction/AA1")
            .with_body(artifact)
            .create_async()
            .await;
        let _proof_mock = server
            .mock("GET", "/libgen_fiction/AA1.ots")
            .with_body(proof)
            .create_async()
            .await;

        let client = VerifyClient::new(server.url());
        let err = client.verify("libgen_fiction", HASH).await.unwrap_err();
        assert!(matches!(err, VerifyError::ArtifactTampered(_)));
    }

    #[tokio::test]
    async fn test_verify_detects_tampering_inside_queried_entry() {
        // Flip a byte of the queried digest's own entry: the digest no
        // longer appears in the artifact, but the artifact also disagrees
        // with its proof, and that takes precedence over NotFound.
        let mut artifact = artifact_bytes();
        let proof = proof_for(&artifact);
        artifact[5] ^= 0x01;

        let mut server = mockito::Server::new_async().await;
        let _artifact_mock = server
            .mock("GET", "/libgen_fiction/AA1")
            .with_body(artifact)
            .create_async()
            .await;
        let _proof_mock = server
            .mock("GET", "/libgen_fiction/AA1.ots")
            .with_body(proof)
            .create_async()
            .await;

        let client = VerifyClient::new(server.url());
        let err = client.verify("libgen_fiction", HASH).await.unwrap_err();
        assert!(matches!(err, VerifyError::ArtifactTampered(_)));
    }

    #[tokio::test]
    async fn test_verify_unknown_collection() {
        let client = VerifyClient::new("http://127.0.0.1:1");
        let err = client.verify("no_such_collection", HASH).await.unwrap_err();
        assert!(matches!(err, VerifyError::UnknownCollection(_)));
    }

    #[tokio::test]
    async fn test_verify_invalid_digest() {
        let client = VerifyClient::new("http://127.0.0.1:1");
        let err = client.verify("libgen_fiction", "zzzz").await.unwrap_err();
        assert!(matches!(err, VerifyError::InvalidDigest(_)));
    }

    #[tokio::test]
    async fn test_verify_fetch_failure_on_missing_artifact() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/libgen_fiction/AA1")
            .with_status(404)
            .create_async()
            .await;

        let client = VerifyClient::new(server.url());
        let err = client.verify("libgen_fiction", HASH).await.unwrap_err();
        assert!(matches!(err, VerifyError::FetchFailed(_)));
    }

    #[tokio::test]
    async fn test_verify_custom_collection_prefix_length() {
        let artifact = hex::decode(HASH).unwrap();
        let proof = proof_for(&artifact);

        let mut server = mockito::Server::new_async().await;
        let _artifact_mock = server
            .mock("GET", "/tpb/AA")
            .with_body(artifact)
            .create_async()
            .await;
        let _proof_mock = server
            .mock("GET", "/tpb/AA.ots")
            .with_body(proof)
            .create_async()
            .await;

        let client = VerifyClient::new(server.url()).with_collection("tpb", 2);
        assert!(client.verify("tpb", HASH).await.is_ok());
    }
}
