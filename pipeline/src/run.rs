//! Full-run orchestration
//!
//! One stamping run: extract digests from every configured source,
//! partition them, commit the artifacts to the authority and publish the
//! results. Each stage is best-effort; the merged report carries every
//! per-unit failure for the caller to surface.

use std::sync::Arc;

use log::info;

use crate::authority::TimestampAuthority;
use crate::commit;
use crate::config::PipelineConfig;
use crate::error::{Result, RunReport};
use crate::extract;
use crate::publish::{self, ArtifactStore};

/// Run the whole pipeline for one collection.
///
/// Artifacts and proofs land under `<output_dir>/<collection>/` and are
/// then uploaded through `store` under the same collection-keyed layout.
pub async fn stamp_collection(
    config: &PipelineConfig,
    authority: &dyn TimestampAuthority,
    store: Arc<dyn ArtifactStore>,
) -> Result<RunReport> {
    config.validate()?;

    let outcome = extract::extract_all(
        &config.sources,
        &config.table,
        &config.column,
        config.chunk_size,
        config.concurrency,
    )
    .await;
    let mut report = outcome.report;
    info!(
        "extraction finished: {} digests, {}",
        outcome.digests.len(),
        report
    );

    let artifact_dir = config.output_dir.join(&config.collection);
    let mut committed = commit::make_partitions(
        outcome.digests,
        config.prefix_length,
        &artifact_dir,
        authority,
    )
    .await?;

    let published = publish::publish_run(
        store,
        &config.collection,
        &committed,
        config.concurrency,
    )
    .await?;
    report.merge(std::mem::take(&mut committed.report));
    report.merge(published);

    info!("run finished: {}", report);
    Ok(report)
}
