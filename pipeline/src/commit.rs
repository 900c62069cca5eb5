//! Commitment builder
//!
//! Computes the content address of each partition artifact, submits the
//! whole run to the timestamping authority as one batch, and persists the
//! returned proof envelopes next to their artifacts. Because artifacts
//! are content-addressed and written before any authority call, a failed
//! or partially-failed commitment can be re-run for the affected
//! artifacts without re-deriving partitions.

use std::path::{Path, PathBuf};

use log::{info, warn};
use timestamper_core::{
    partition, Artifact, Digest, DigestAlgorithm, PartitionMap, ProofEnvelope, PROOF_EXTENSION,
};

use crate::authority::{DigestSubmission, TimestampAuthority};
use crate::error::{PipelineError, Result, RunReport};

/// Artifact/proof pairs plus the per-unit report for one commitment run
#[derive(Debug, Default)]
pub struct CommitOutcome {
    /// Each committed artifact with its persisted proof
    pub proofs: Vec<(Artifact, ProofEnvelope)>,

    /// Per-artifact successes and failures
    pub report: RunReport,
}

/// Path of the proof file that sits next to an artifact
pub fn proof_path(artifact_path: &Path) -> PathBuf {
    let mut path = artifact_path.as_os_str().to_owned();
    path.push(format!(".{}", PROOF_EXTENSION));
    PathBuf::from(path)
}

/// Commit a set of written artifacts.
///
/// All artifact digests go to the authority in one batched submission;
/// the returned proofs are then persisted individually. A proof that
/// fails to persist blocks publication of that artifact only.
pub async fn commit_artifacts(
    artifacts: Vec<Artifact>,
    authority: &dyn TimestampAuthority,
) -> Result<CommitOutcome> {
    if artifacts.is_empty() {
        return Ok(CommitOutcome::default());
    }

    let batch: Vec<DigestSubmission> = artifacts
        .iter()
        .map(|artifact| DigestSubmission {
            digest: artifact.sha256.to_vec(),
            algorithm: DigestAlgorithm::Sha256,
        })
        .collect();

    let proofs = authority.submit(batch).await?;
    if proofs.len() != artifacts.len() {
        return Err(PipelineError::Authority(format!(
            "authority returned {} proofs for {} artifacts",
            proofs.len(),
            artifacts.len()
        )));
    }

    let mut outcome = CommitOutcome::default();
    for (artifact, proof) in artifacts.into_iter().zip(proofs) {
        if proof.file_digest != artifact.sha256 {
            outcome.report.failure(
                artifact.prefix.clone(),
                PipelineError::Authority("proof digest disagrees with artifact".to_string()),
            );
            continue;
        }
        let path = proof_path(&artifact.path);
        match proof.write_to(&path) {
            Ok(()) => {
                info!("committed {} -> {}", artifact.prefix, path.display());
                outcome.report.success();
                outcome.proofs.push((artifact, proof));
            }
            Err(e) => {
                outcome
                    .report
                    .failure(artifact.prefix.clone(), PipelineError::Core(e));
            }
        }
    }
    Ok(outcome)
}

/// Partition a digest collection, write its artifacts and commit them in
/// one step.
pub async fn make_partitions(
    digests: Vec<Digest>,
    prefix_length: usize,
    dir: impl AsRef<Path>,
    authority: &dyn TimestampAuthority,
) -> Result<CommitOutcome> {
    let map = PartitionMap::build(digests, prefix_length);
    info!(
        "partitioned {} digests into {} partitions",
        map.total_entries(),
        map.len()
    );
    let artifacts = partition::write_artifacts(&map, dir)?;
    commit_artifacts(artifacts, authority).await
}

/// Stamp a flat list of digests directly, one proof per digest, written
/// as `<dir>/<digest>.ots`. The algorithm is inferred from each digest's
/// hex length.
pub async fn stamp_digests(
    digests: &[Digest],
    dir: impl AsRef<Path>,
    authority: &dyn TimestampAuthority,
) -> Result<RunReport> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let batch: Vec<DigestSubmission> = digests
        .iter()
        .map(|digest| DigestSubmission {
            digest: digest.raw_bytes(),
            algorithm: digest.algorithm(),
        })
        .collect();
    let proofs = authority.submit(batch).await?;
    if proofs.len() != digests.len() {
        return Err(PipelineError::Authority(format!(
            "authority returned {} proofs for {} digests",
            proofs.len(),
            digests.len()
        )));
    }

    let mut report = RunReport::default();
    for (digest, proof) in digests.iter().zip(proofs) {
        let path = dir.join(format!("{}.{}", digest.hex(), PROOF_EXTENSION));
        match proof.write_to(&path) {
            Ok(()) => report.success(),
            Err(e) => report.failure(digest.hex().to_string(), PipelineError::Core(e)),
        }
    }
    Ok(report)
}

/// Upgrade every pending proof file in `dir`.
///
/// Already-confirmed proofs are left untouched; a proof that fails to
/// upgrade is reported and retried on the next run.
pub async fn upgrade_proofs(
    dir: impl AsRef<Path>,
    authority: &dyn TimestampAuthority,
) -> Result<RunReport> {
    let mut report = RunReport::default();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(PROOF_EXTENSION) {
            continue;
        }
        let name = path.display().to_string();
        let mut proof = match ProofEnvelope::read_from(&path) {
            Ok(proof) => proof,
            Err(e) => {
                warn!("{}: unreadable proof: {}", name, e);
                report.failure(name, PipelineError::Core(e));
                continue;
            }
        };
        if proof.is_confirmed() {
            report.success();
            continue;
        }
        match authority.upgrade(&mut proof).await {
            Ok(()) => match proof.write_to(&path) {
                Ok(()) => report.success(),
                Err(e) => report.failure(name, PipelineError::Core(e)),
            },
            Err(e) => {
                warn!("{}: upgrade failed: {}", name, e);
                report.failure(name, e);
            }
        }
    }
    Ok(report)
}
