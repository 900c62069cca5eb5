//! Digest model
//!
//! A digest is a fixed-length cryptographic hash value represented as
//! lowercase hex. The hex length implies the algorithm unambiguously:
//! 40 characters is SHA-1, 64 characters is SHA-256.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Hash algorithm of a digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-1 (20 raw bytes, 40 hex characters)
    Sha1,

    /// SHA-256 (32 raw bytes, 64 hex characters)
    Sha256,
}

impl DigestAlgorithm {
    /// Width of a digest in raw bytes
    pub fn byte_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
        }
    }

    /// Width of a digest in hex characters
    pub fn hex_len(&self) -> usize {
        self.byte_len() * 2
    }

    /// Infer the algorithm from a hex string length
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(DigestAlgorithm::Sha1),
            64 => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }
}

/// A validated, lowercase-hex digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    hex: String,
    algorithm: DigestAlgorithm,
}

impl Digest {
    /// Parse a digest from a hex string.
    ///
    /// The input is case-normalized to lowercase; the algorithm is
    /// inferred from the length. Anything that is not 40 or 64 hex
    /// characters is rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let algorithm = DigestAlgorithm::from_hex_len(s.len())
            .ok_or_else(|| CoreError::InvalidDigest(s.to_string()))?;
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidDigest(s.to_string()));
        }
        Ok(Digest {
            hex: s.to_ascii_lowercase(),
            algorithm,
        })
    }

    /// The lowercase hex representation
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// The hash algorithm implied by this digest's length
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Decode the digest to raw bytes
    pub fn raw_bytes(&self) -> Vec<u8> {
        // Validated at construction, so decoding cannot fail.
        hex::decode(&self.hex).unwrap_or_default()
    }

    /// The partition prefix for this digest: the first `prefix_length`
    /// hex characters, uppercased by convention for the artifact name.
    pub fn prefix(&self, prefix_length: usize) -> String {
        self.hex[..prefix_length.min(self.hex.len())].to_ascii_uppercase()
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hex)
    }
}

impl std::str::FromStr for Digest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SHA256_HEX: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434daaf4c61ddcc5e8a2dabede0f";
    const SHA1_HEX: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

    #[test]
    fn test_algorithm_from_length() {
        assert_eq!(
            Digest::parse(SHA256_HEX).unwrap().algorithm(),
            DigestAlgorithm::Sha256
        );
        assert_eq!(
            Digest::parse(SHA1_HEX).unwrap().algorithm(),
            DigestAlgorithm::Sha1
        );
    }

    #[test]
    fn test_case_normalization() {
        let digest = Digest::parse(&SHA1_HEX.to_ascii_uppercase()).unwrap();
        assert_eq!(digest.hex(), SHA1_HEX);
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("zzf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")]
    #[case("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d0")]
    fn test_rejects_invalid_input(#[case] input: &str) {
        assert!(Digest::parse(input).is_err());
    }

    #[test]
    fn test_raw_bytes_round_trip() {
        let digest = Digest::parse(SHA256_HEX).unwrap();
        let raw = digest.raw_bytes();
        assert_eq!(raw.len(), 32);
        assert_eq!(hex::encode(&raw), SHA256_HEX);
    }

    #[test]
    fn test_prefix_is_uppercased() {
        let digest = Digest::parse(SHA256_HEX).unwrap();
        assert_eq!(digest.prefix(2), "AA");
        assert_eq!(digest.prefix(3), "AAF");
    }
}
