use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error, warn};

use wordmill::config::Config;
use wordmill::master::Master;
use wordmill::worker::Worker;

/// Count word frequencies across distributed worker nodes
#[derive(Parser)]
#[command(name = "wordmill")]
#[command(about = "Distributed word-frequency pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Staging root holding the pipeline stage directories
    #[arg(long, default_value = "data", global = true)]
    staging_root: PathBuf,

    /// Path of the running-total file (default: <staging-root>/total.json)
    #[arg(long, global = true)]
    total_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch documents into the local staging tree
    Get {
        /// Document URIs (http(s) URLs or local paths)
        uris: Vec<String>,
    },
    /// Process ready documents into exported artifacts
    Worker,
    /// Synchronize worker exports and merge them into the running total
    Master {
        /// Worker addresses (local staging roots or [user@]host:path);
        /// with none given, only the already-imported artifacts are merged
        workers: Vec<String>,
    },
    /// Print the highest-count words from the running total
    Report {
        /// Number of words to print
        #[arg(default_value_t = 10)]
        count: usize,
    },
    /// Remove all documents and artifacts from the staging tree
    Clean,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .init();

    let config = Config::new(cli.staging_root, cli.verbose, cli.total_file);
    debug!("wordmill started, staging root {}", config.staging_root.display());

    if let Err(e) = run(cli.command, &config).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Get { uris } => {
            let worker = Worker::new(config)?;
            for uri in uris {
                // one bad document never aborts the batch
                if let Err(err) = worker.ingest(&uri).await {
                    warn!("ingest of {} failed: {:#}", uri, err);
                }
            }
            Ok(())
        }
        Commands::Worker => {
            let worker = Worker::new(config)?;
            let published = worker.process_ready()?;
            println!("published {published} artifacts");
            Ok(())
        }
        Commands::Master { workers } => {
            let master = Master::new(config, &workers)?;
            let fetched = master.synch_all().await?;
            let merged = master.merge_all()?;
            println!("fetched {fetched} artifacts, merged {merged}");
            Ok(())
        }
        Commands::Report { count } => {
            let master = Master::new(config, &[])?;
            for line in master.report(count) {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Clean => {
            let worker = Worker::new(config)?;
            let removed = worker.clean()?;
            println!("removed {removed} files");
            Ok(())
        }
    }
}
