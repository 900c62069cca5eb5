//! Artifact publication
//!
//! Publishes committed artifacts and their proofs under a stable base
//! path keyed by collection name. The object store is an external
//! collaborator behind a narrow capability interface; batch operations
//! run with bounded concurrency and per-item failure tolerance, so one
//! failed transfer never aborts the rest of the batch.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
#[cfg(test)]
use mockall::automock;
use tokio::sync::Semaphore;

use crate::commit::{proof_path, CommitOutcome};
use crate::error::{PipelineError, Result, RunReport};

/// Capability interface to the object store artifacts are published to
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `body` under `key`
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Copy the object at `from` to `to`
    async fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Delete the object at `key`
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all keys starting with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Local-filesystem store rooted at a directory
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsStore { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ArtifactStore for FsStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, body).await?;
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let to_path = self.resolve(to);
        if let Some(parent) = to_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(self.resolve(from), to_path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        tokio::fs::remove_file(self.resolve(key)).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative.to_string_lossy().replace('\\', "/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Store each `(key, body)` pair with bounded concurrency, collecting
/// per-item failures.
pub async fn put_all(
    store: Arc<dyn ArtifactStore>,
    items: Vec<(String, Vec<u8>)>,
    concurrency: usize,
) -> RunReport {
    run_batch(items, concurrency, move |(key, body)| {
        let store = Arc::clone(&store);
        async move {
            let result = store.put(&key, body).await;
            (key, result)
        }
    })
    .await
}

/// Copy each `(from, to)` pair with bounded concurrency
pub async fn copy_all(
    store: Arc<dyn ArtifactStore>,
    pairs: Vec<(String, String)>,
    concurrency: usize,
) -> RunReport {
    run_batch(pairs, concurrency, move |(from, to)| {
        let store = Arc::clone(&store);
        async move {
            let result = store.copy(&from, &to).await;
            (from, result)
        }
    })
    .await
}

/// Delete each key with bounded concurrency
pub async fn delete_all(
    store: Arc<dyn ArtifactStore>,
    keys: Vec<String>,
    concurrency: usize,
) -> RunReport {
    run_batch(keys, concurrency, move |key| {
        let store = Arc::clone(&store);
        async move {
            let result = store.delete(&key).await;
            (key, result)
        }
    })
    .await
}

/// Upload a commitment run's artifacts and proofs under
/// `<collection>/<PREFIX>` and `<collection>/<PREFIX>.<ext>`.
pub async fn publish_run(
    store: Arc<dyn ArtifactStore>,
    collection: &str,
    outcome: &CommitOutcome,
    concurrency: usize,
) -> Result<RunReport> {
    let mut items = Vec::with_capacity(outcome.proofs.len() * 2);
    for (artifact, _proof) in &outcome.proofs {
        let artifact_bytes = tokio::fs::read(&artifact.path).await?;
        items.push((format!("{}/{}", collection, artifact.prefix), artifact_bytes));

        let proof_bytes = tokio::fs::read(proof_path(&artifact.path)).await?;
        items.push((
            format!(
                "{}/{}.{}",
                collection,
                artifact.prefix,
                timestamper_core::PROOF_EXTENSION
            ),
            proof_bytes,
        ));
    }
    info!(
        "publishing {} objects to collection {}",
        items.len(),
        collection
    );
    Ok(put_all(store, items, concurrency).await)
}

/// Run `task` over `items` under a semaphore, never cancelling siblings.
async fn run_batch<T, F, Fut>(items: Vec<T>, concurrency: usize, task: F) -> RunReport
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: std::future::Future<Output = (String, Result<()>)> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let future = task(item);
        handles.push(tokio::spawn(async move {
            // Semaphore closes only on drop, so acquire cannot fail here.
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            future.await
        }));
    }

    let mut report = RunReport::default();
    for handle in handles {
        match handle.await {
            Ok((_, Ok(()))) => report.success(),
            Ok((unit, Err(e))) => {
                warn!("{}: transfer failed: {}", unit, e);
                report.failure(unit, e);
            }
            Err(join_error) => {
                report.failure(
                    "<task>",
                    PipelineError::Store(format!("transfer task panicked: {}", join_error)),
                );
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fs_store_put_and_list() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());

        store
            .put("libgen_fiction/AAA", vec![1, 2, 3])
            .await
            .unwrap();
        store
            .put("libgen_fiction/AAA.ots", vec![4, 5])
            .await
            .unwrap();
        store.put("other/BBB", vec![6]).await.unwrap();

        let keys = store.list("libgen_fiction/").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "libgen_fiction/AAA".to_string(),
                "libgen_fiction/AAA.ots".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_fs_store_copy_and_delete() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.put("a/one", vec![9]).await.unwrap();
        store.copy("a/one", "b/two").await.unwrap();
        store.delete("a/one").await.unwrap();

        let keys = store.list("").await.unwrap();
        assert_eq!(keys, vec!["b/two".to_string()]);
    }

    #[tokio::test]
    async fn test_put_all_tolerates_partial_failure() {
        let mut store = MockArtifactStore::new();
        store
            .expect_put()
            .returning(|key, _| {
                if key.ends_with("bad") {
                    Err(PipelineError::Store("denied".to_string()))
                } else {
                    Ok(())
                }
            });

        let items = vec![
            ("c/good".to_string(), vec![1]),
            ("c/bad".to_string(), vec![2]),
            ("c/also-good".to_string(), vec![3]),
        ];
        let report = put_all(Arc::new(store), items, 2).await;
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit, "c/bad");
    }

    #[tokio::test]
    async fn test_publish_run_uploads_artifact_and_proof() {
        use timestamper_core::partition::write_artifacts;
        use timestamper_core::{Digest, DigestAlgorithm, PartitionMap, ProofEnvelope};

        let local = tempdir().unwrap();
        let digests = vec![Digest::parse(&"aa".repeat(32)).unwrap()];
        let map = PartitionMap::build(digests, 2);
        let mut artifacts = write_artifacts(&map, local.path()).unwrap();
        let artifact = artifacts.remove(0);
        let proof = ProofEnvelope::pending(
            artifact.sha256.to_vec(),
            DigestAlgorithm::Sha256,
            b"att".to_vec(),
        );
        proof.write_to(proof_path(&artifact.path)).unwrap();
        let outcome = CommitOutcome {
            proofs: vec![(artifact, proof)],
            report: RunReport::default(),
        };

        let remote = tempdir().unwrap();
        let store = Arc::new(FsStore::new(remote.path()));
        let report = publish_run(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            "libgen_fiction",
            &outcome,
            4,
        )
        .await
        .unwrap();
        assert!(report.is_complete());
        assert_eq!(
            store.list("libgen_fiction/").await.unwrap(),
            vec![
                "libgen_fiction/AA".to_string(),
                "libgen_fiction/AA.ots".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_all_continues_past_missing_keys() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FsStore::new(dir.path()));
        store.put("x/keep", vec![1]).await.unwrap();
        store.put("x/drop", vec![2]).await.unwrap();

        let report = delete_all(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            vec!["x/drop".to_string(), "x/missing".to_string()],
            4,
        )
        .await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(store.list("x/").await.unwrap(), vec!["x/keep".to_string()]);
    }
}
