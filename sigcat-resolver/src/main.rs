//! sigcat-resolver - signature catalog resolution service
//!
//! `run` starts the background scheduler (metadata sweeps, vote tally, link
//! backfill) until Ctrl+C. The other subcommands run one catalog operation and
//! print its result as JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sigcat_common::config::resolve_config;
use sigcat_common::db::init_database;
use sigcat_common::logging::init_logging;
use sigcat_resolver::models::{HashQuery, MetadataSource, ObjectType};
use sigcat_resolver::scheduler::{default_jobs, Scheduler};
use sigcat_resolver::services::{VotePair, VoteTarget};
use sigcat_resolver::{Catalog, RunContext};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Command-line arguments for sigcat-resolver
#[derive(Parser, Debug)]
#[command(name = "sigcat-resolver")]
#[command(about = "Signature catalog resolution core")]
#[command(version)]
struct Cli {
    /// Config file (overrides SIGCAT_CONFIG and default locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides SIGCAT_DATABASE and the config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the background scheduler until interrupted
    Run,

    /// Resolve ROM hashes to their canonical game
    Lookup(HashArgs),

    /// Search providers for one object, or sweep stale objects of a type
    SearchMetadata {
        /// Company, Platform or Game
        object_type: ObjectType,

        /// Object id; omitted runs a bulk sweep
        #[arg(long)]
        id: Option<i64>,

        /// Ignore the search cooldown
        #[arg(long)]
        force: bool,
    },

    /// Submit provider id votes for an object
    Vote {
        #[arg(long)]
        user: String,

        /// Canonical object id; otherwise hashes identify the game
        #[arg(long, conflicts_with_all = ["md5", "sha1", "sha256", "crc"])]
        object: Option<i64>,

        #[command(flatten)]
        hashes: HashArgs,

        /// SOURCE=ID, repeatable
        #[arg(long = "link", value_parser = parse_vote_pair, required = true)]
        links: Vec<VotePair>,
    },

    /// Tally votes and promote winners
    Tally,

    /// Merge a duplicate object into a survivor
    Merge {
        source: i64,
        target: i64,

        /// Apply the merge; without it only a preview is printed
        #[arg(long)]
        commit: bool,
    },

    /// Create missing metadata links
    BackfillLinks,
}

#[derive(Args, Debug, Default)]
struct HashArgs {
    #[arg(long)]
    md5: Option<String>,
    #[arg(long)]
    sha1: Option<String>,
    #[arg(long)]
    sha256: Option<String>,
    #[arg(long)]
    crc: Option<String>,
}

impl From<HashArgs> for HashQuery {
    fn from(args: HashArgs) -> Self {
        HashQuery {
            md5: args.md5,
            sha1: args.sha1,
            sha256: args.sha256,
            crc: args.crc,
        }
    }
}

fn parse_vote_pair(raw: &str) -> std::result::Result<VotePair, String> {
    let (source, id) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SOURCE=ID, got '{}'", raw))?;
    let source: MetadataSource = source.parse().map_err(|e| format!("{}", e))?;
    Ok(VotePair::new(source, id.trim()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = resolve_config(cli.config.as_deref(), cli.database.as_deref())
        .context("Failed to resolve configuration")?;
    init_logging(&config.logging).context("Failed to initialize logging")?;

    info!("Starting sigcat-resolver");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;
    let catalog = Catalog::from_config(pool, &config);

    match cli.command {
        Command::Run => {
            let scheduler = Scheduler::new(Duration::from_secs(config.scheduler.tick_seconds.max(1)));
            for job in default_jobs(&catalog, &config.scheduler) {
                scheduler.register(job).await;
            }

            let cancel = CancellationToken::new();
            let handle = tokio::spawn({
                let scheduler = scheduler.clone();
                let cancel = cancel.clone();
                async move { scheduler.run(cancel).await }
            });

            shutdown_signal().await;
            cancel.cancel();
            handle.await.context("Scheduler task failed")?;
            info!("Shutdown complete");
        }
        Command::Lookup(hashes) => {
            let ctx = RunContext::new("lookup");
            let result = catalog.lookup_by_hash(&ctx, &hashes.into()).await;
            print_outcome(&ctx, result)?;
        }
        Command::SearchMetadata {
            object_type,
            id,
            force,
        } => {
            let ctx = RunContext::new("search_metadata");
            let result = catalog.search_metadata(&ctx, object_type, id, force).await;
            print_outcome(&ctx, result)?;
        }
        Command::Vote {
            user,
            object,
            hashes,
            links,
        } => {
            let ctx = RunContext::new("vote").with_user(&user);
            let target = match object {
                Some(id) => VoteTarget::Object(id),
                None => VoteTarget::Hashes(hashes.into()),
            };
            let result = catalog.submit_vote(&ctx, &user, &target, &links).await;
            print_outcome(&ctx, result)?;
        }
        Command::Tally => {
            let ctx = RunContext::new("tally");
            let result = catalog.tally_votes(&ctx).await;
            print_outcome(&ctx, result)?;
        }
        Command::Merge {
            source,
            target,
            commit,
        } => {
            let ctx = RunContext::new("merge");
            let result = catalog.merge_objects(&ctx, source, target, commit).await;
            print_outcome(&ctx, result)?;
        }
        Command::BackfillLinks => {
            let ctx = RunContext::new("backfill_links");
            let result = catalog.backfill_links(&ctx).await;
            print_outcome(&ctx, result)?;
        }
    }

    Ok(())
}

/// Print a result as JSON, or turn the error into a classified failure
fn print_outcome<T: Serialize>(ctx: &RunContext, result: sigcat_resolver::Result<T>) -> Result<()> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!(
                correlation_id = %ctx.correlation_id,
                process = %ctx.process,
                status = e.status_code(),
                error = %e,
                "Operation failed"
            );
            Err(anyhow::anyhow!(
                "{} (status {}, correlation id {})",
                e,
                e.status_code(),
                ctx.correlation_id
            ))
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
