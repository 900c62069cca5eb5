//! Digest extraction stage
//!
//! Couples the core scanner and transcoder to project the digest column
//! out of one or more dump files. Scanning within a file is strictly
//! sequential (each insert block depends on the previous cursor
//! position), but independent source files run with bounded worker
//! concurrency; a failure in one source degrades that source only.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Semaphore;

use timestamper_core::{Digest, DumpReader, Scanner};

use crate::error::{PipelineError, Result, RunReport};

/// Digests and per-unit failures from one extraction run
#[derive(Debug, Default)]
pub struct ExtractOutcome {
    /// Extracted digests across all sources, in source order
    pub digests: Vec<Digest>,

    /// Aggregate success/failure report
    pub report: RunReport,
}

/// Extract the digest column of `table` from a single dump file.
///
/// Rows whose digest column is NULL or not a well-formed digest
/// contribute nothing; malformed insert blocks are skipped and their
/// errors collected (best-effort policy, reported in aggregate).
pub fn extract_from_dump(
    path: impl AsRef<Path>,
    table: &str,
    column: &str,
    chunk_size: usize,
) -> Result<ExtractOutcome> {
    let path = path.as_ref();
    let reader =
        DumpReader::new(path, table).with_scanner(Scanner::with_chunk_size(chunk_size));

    let mut outcome = ExtractOutcome::default();
    let records = reader.records()?;
    for item in records {
        match item {
            Ok(record) => {
                if let Some(text) = record.get_text(column) {
                    match Digest::parse(text) {
                        Ok(digest) => outcome.digests.push(digest),
                        Err(e) => {
                            warn!("{}: ignoring non-digest value: {}", path.display(), e);
                        }
                    }
                }
            }
            Err(e) => {
                warn!("{}: skipping insert block: {}", path.display(), e);
                outcome
                    .report
                    .failure(path.display().to_string(), PipelineError::Core(e));
            }
        }
    }
    outcome.report.success();
    info!(
        "{}: extracted {} digests from table `{}`",
        path.display(),
        outcome.digests.len(),
        table
    );
    Ok(outcome)
}

/// Write a projected column to the sidecar file `<dump>_<column>.txt`,
/// one value per line, returning the sidecar path.
pub fn write_column_file(
    dump_path: impl AsRef<Path>,
    column: &str,
    values: &[Digest],
) -> Result<PathBuf> {
    let dump_path = dump_path.as_ref();
    let mut sidecar = dump_path.as_os_str().to_owned();
    sidecar.push(format!("_{}.txt", column));
    let sidecar = PathBuf::from(sidecar);

    let mut writer = BufWriter::new(File::create(&sidecar)?);
    for value in values {
        writeln!(writer, "{}", value.hex())?;
    }
    writer.flush()?;
    Ok(sidecar)
}

/// Read digests back from a sidecar file, keeping only lines that are
/// well-formed digests.
pub fn read_digests(path: impl AsRef<Path>) -> Result<Vec<Digest>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut digests = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Ok(digest) = Digest::parse(line.trim()) {
            digests.push(digest);
        }
    }
    Ok(digests)
}

/// Extract digests from several independent dump files with bounded
/// worker concurrency.
///
/// Each source runs as its own blocking task under a semaphore; a failed
/// source contributes a failure to the report without cancelling its
/// siblings. Results are reassembled in source order, so workers never
/// contend over shared keys.
pub async fn extract_all(
    sources: &[PathBuf],
    table: &str,
    column: &str,
    chunk_size: usize,
    concurrency: usize,
) -> ExtractOutcome {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(sources.len());

    for source in sources {
        let semaphore = Arc::clone(&semaphore);
        let source = source.clone();
        let table = table.to_string();
        let column = column.to_string();
        handles.push(tokio::spawn(async move {
            // Semaphore closes only on drop, so acquire cannot fail here.
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let path = source.clone();
            let result = tokio::task::spawn_blocking(move || {
                extract_from_dump(&source, &table, &column, chunk_size)
            })
            .await;
            (path, result)
        }));
    }

    let mut outcome = ExtractOutcome::default();
    for handle in handles {
        match handle.await {
            Ok((_, Ok(Ok(source_outcome)))) => {
                outcome.digests.extend(source_outcome.digests);
                outcome.report.merge(source_outcome.report);
            }
            Ok((path, Ok(Err(e)))) => {
                outcome.report.failure(path.display().to_string(), e);
            }
            Ok((path, Err(join_error))) => {
                outcome.report.failure(
                    path.display().to_string(),
                    PipelineError::Store(format!("extraction task panicked: {}", join_error)),
                );
            }
            Err(join_error) => {
                outcome.report.failure(
                    "<unknown source>",
                    PipelineError::Store(format!("extraction task panicked: {}", join_error)),
                );
            }
        }
    }
    outcome
}
