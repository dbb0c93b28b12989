use clap::{Parser, Subcommand};
use mailwise::cache::{CacheConfig, QueryCache};
use mailwise::checkpoint::CheckpointStore;
use std::path::PathBuf;
use tracing::{debug, error};

/// Maintenance surface for mailwise checkpoints and caches. Analysis jobs
/// themselves are driven through the library API.
#[derive(Parser)]
#[command(name = "mailwise")]
#[command(about = "Resumable, cached LLM analysis jobs over large email sets", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or remove job checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Maintain the query result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CheckpointCommands {
    /// Show a checkpoint's progress summary
    Info {
        /// Path to the checkpoint file
        path: PathBuf,
    },
    /// Delete a checkpoint file
    Clear {
        /// Path to the checkpoint file
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Delete every cached entry
    Clear {
        /// Cache directory (default: temp-scoped)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Remove expired and unreadable entries
    Cleanup {
        /// Cache directory (default: temp-scoped)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Entry time-to-live in hours
        #[arg(long, default_value = "24")]
        ttl_hours: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("mailwise started with verbosity level: {}", cli.verbose);

    let result = match cli.command {
        Commands::Checkpoint { command } => run_checkpoint_command(command).await,
        Commands::Cache { command } => run_cache_command(command),
    };

    if let Err(e) = result {
        error!("Fatal error: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_checkpoint_command(command: CheckpointCommands) -> anyhow::Result<()> {
    let store = CheckpointStore::new();

    match command {
        CheckpointCommands::Info { path } => match store.info(&path).await {
            Some(info) => {
                println!("{}", serde_json::to_string_pretty(&info)?);
            }
            None => {
                println!("No readable checkpoint at {}", path.display());
            }
        },
        CheckpointCommands::Clear { path } => {
            if store.clear(&path).await? {
                println!("Removed checkpoint at {}", path.display());
            } else {
                println!("No checkpoint at {}", path.display());
            }
        }
    }

    Ok(())
}

fn run_cache_command(command: CacheCommands) -> anyhow::Result<()> {
    match command {
        CacheCommands::Clear { dir } => {
            let cache = QueryCache::with_config(cache_config(dir, 24))?;
            let removed = cache.clear()?;
            println!("Removed {removed} cached entries");
        }
        CacheCommands::Cleanup { dir, ttl_hours } => {
            let cache = QueryCache::with_config(cache_config(dir, ttl_hours))?;
            let removed = cache.cleanup_expired()?;
            println!("Removed {removed} expired entries");
        }
    }

    Ok(())
}

fn cache_config(dir: Option<PathBuf>, ttl_hours: i64) -> CacheConfig {
    let mut config = CacheConfig {
        ttl_hours,
        ..Default::default()
    };
    if let Some(dir) = dir {
        config.cache_dir = dir;
    }
    config
}
