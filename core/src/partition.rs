//! Prefix partitioning of digest collections
//!
//! Digests are grouped by a fixed-length uppercase hex prefix and each
//! group is serialized into one addressable binary artifact: the
//! concatenation of the group's raw digest bytes in first-seen order.
//! Duplicate digests are preserved positionally; deduplicating would
//! change artifact bytes and invalidate previously published proofs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use sha2::{Digest as _, Sha256};

use crate::digest::Digest;
use crate::error::Result;

/// A prefix-keyed partition map over a digest collection
///
/// Buckets preserve first-seen insertion order, both across prefixes and
/// within each prefix.
#[derive(Debug, Clone, Default)]
pub struct PartitionMap {
    prefix_length: usize,
    order: Vec<String>,
    buckets: HashMap<String, Vec<Digest>>,
}

impl PartitionMap {
    /// Group `digests` by their first `prefix_length` hex characters.
    ///
    /// The prefix length is a caller-supplied configuration parameter,
    /// chosen so the largest partition stays within a practical artifact
    /// size; it is not computed adaptively.
    pub fn build(digests: impl IntoIterator<Item = Digest>, prefix_length: usize) -> Self {
        let mut map = PartitionMap {
            prefix_length,
            order: Vec::new(),
            buckets: HashMap::new(),
        };
        for digest in digests {
            let prefix = digest.prefix(prefix_length);
            match map.buckets.get_mut(&prefix) {
                Some(bucket) => bucket.push(digest),
                None => {
                    map.order.push(prefix.clone());
                    map.buckets.insert(prefix, vec![digest]);
                }
            }
        }
        map
    }

    /// The configured prefix length
    pub fn prefix_length(&self) -> usize {
        self.prefix_length
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the map holds no partitions
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The digests of one partition, in first-seen order
    pub fn bucket(&self, prefix: &str) -> Option<&[Digest]> {
        self.buckets.get(prefix).map(Vec::as_slice)
    }

    /// Iterate partitions in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Digest])> {
        self.order
            .iter()
            .map(|prefix| (prefix.as_str(), self.buckets[prefix].as_slice()))
    }

    /// Total number of digest entries across all partitions
    pub fn total_entries(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// One written partition artifact
#[derive(Debug, Clone)]
pub struct Artifact {
    /// The partition prefix, which is also the artifact file name
    pub prefix: String,

    /// Path of the written artifact file
    pub path: PathBuf,

    /// SHA-256 content address of the artifact bytes
    pub sha256: [u8; 32],

    /// Number of digest entries serialized into the artifact
    pub entries: usize,
}

/// Serialize each partition into one artifact file under `dir`.
///
/// The artifact named `<PREFIX>` holds the partition's digests decoded
/// from hex to raw bytes and concatenated in partition order. Artifacts
/// are immutable for a given run; a later run with additional digests
/// writes a superseding artifact rather than mutating the old one in
/// place, preserving the binding between a published proof and its exact
/// artifact bytes.
pub fn write_artifacts(map: &PartitionMap, dir: impl AsRef<Path>) -> Result<Vec<Artifact>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut artifacts = Vec::with_capacity(map.len());
    for (prefix, digests) in map.iter() {
        let mut data = Vec::new();
        for digest in digests {
            data.extend_from_slice(&digest.raw_bytes());
        }
        let path = dir.join(prefix);
        fs::write(&path, &data)?;
        let sha256 = sha256_digest(&data);
        info!(
            "wrote artifact {} ({} entries, {} bytes)",
            path.display(),
            digests.len(),
            data.len()
        );
        artifacts.push(Artifact {
            prefix: prefix.to_string(),
            path,
            sha256,
            entries: digests.len(),
        });
    }
    Ok(artifacts)
}

/// SHA-256 of a byte slice
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}
