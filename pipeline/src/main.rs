use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{error, info};

use timestamper_pipeline::authority::CalendarAuthority;
use timestamper_pipeline::commit;
use timestamper_pipeline::config::PipelineConfig;
use timestamper_pipeline::extract;
use timestamper_pipeline::publish::FsStore;
use timestamper_pipeline::run::stamp_collection;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Trusted timestamping for digests extracted from database dumps")]
struct Args {
    /// Config file path
    #[clap(short, long, env = "TIMESTAMPER_CONFIG")]
    config: Option<PathBuf>,

    /// Timestamping authority URL
    #[clap(long, env = "TIMESTAMPER_AUTHORITY")]
    authority: Option<String>,

    /// Output directory for artifacts and proofs
    #[clap(short, long)]
    output_dir: Option<PathBuf>,

    /// Bound on simultaneous file/network operations
    #[clap(long)]
    concurrency: Option<usize>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the digest column from dump files into sidecar .txt files
    Extract {
        /// Dump files to scan
        #[clap(required = true)]
        sources: Vec<PathBuf>,

        /// Table of interest
        #[clap(short, long)]
        table: String,

        /// Digest column name
        #[clap(long, default_value = "sha256")]
        column: String,
    },

    /// Run the whole pipeline: extract, partition, commit and publish
    Stamp,

    /// Stamp a flat list of digests read from a sidecar file, one proof each
    StampList {
        /// Sidecar file with one digest per line
        file: PathBuf,
    },

    /// Upgrade every pending proof in the output directory
    Upgrade,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    // Override config with command-line arguments
    if let Some(authority) = args.authority {
        config.authority_url = authority;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }

    let authority = CalendarAuthority::new(config.authority_url.clone());

    match args.command {
        Command::Extract {
            sources,
            table,
            column,
        } => {
            for source in sources {
                let outcome =
                    extract::extract_from_dump(&source, &table, &column, config.chunk_size)?;
                let sidecar = extract::write_column_file(&source, &column, &outcome.digests)?;
                info!(
                    "{}: wrote {} digests to {}",
                    source.display(),
                    outcome.digests.len(),
                    sidecar.display()
                );
                if !outcome.report.is_complete() {
                    error!("{}: {}", source.display(), outcome.report);
                }
            }
        }
        Command::Stamp => {
            let store = Arc::new(FsStore::new(config.output_dir.join("published")));
            let report = stamp_collection(&config, &authority, store).await?;
            info!("{}", report);
            if !report.is_complete() {
                bail!("run finished with {} failures", report.failures.len());
            }
        }
        Command::StampList { file } => {
            let digests = extract::read_digests(&file)?;
            info!("stamping {} digests from {}", digests.len(), file.display());
            let out_dir = config.output_dir.join("ots");
            let report = commit::stamp_digests(&digests, &out_dir, &authority).await?;
            info!("{}", report);
            if !report.is_complete() {
                bail!("stamping finished with {} failures", report.failures.len());
            }
        }
        Command::Upgrade => {
            let dir = config.output_dir.join(&config.collection);
            let report = commit::upgrade_proofs(&dir, &authority).await?;
            info!("{}", report);
            if !report.is_complete() {
                bail!("upgrade finished with {} failures", report.failures.len());
            }
        }
    }

    Ok(())
}
