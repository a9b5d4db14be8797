//! Referral CLI - Admin Command Line Interface
//!
//! Runs rank and metrics operations directly against the configured KV
//! store and prints the results as JSON.

mod seed;
mod settings;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use referral_common::{Order, StoreBackend};
use referral_metrics::MetricsAggregator;
use referral_store::{KvStore, MemoryKvStore, RedbKvStore, Repository};
use seed::SeedFile;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "referral-cli")]
#[command(about = "Referral metrics admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "REFERRAL_CONFIG")]
    config: Option<PathBuf>,

    /// Store backend, overrides the configuration file
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// redb database path, overrides the configuration file
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Import this JSON file before running the command
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Memory,
    Redb,
}

impl From<Backend> for StoreBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Memory => Self::Memory,
            Backend::Redb => Self::Redb,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import partners and orders from a JSON file
    Import {
        /// File with `partners` and `orders` arrays
        file: PathBuf,
    },
    /// Show a partner's rank
    Rank {
        /// Partner ID
        id: String,
        /// Recompute instead of reading the rank cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Recompute and persist ranks from a partner up its sponsor chain
    UpdateUpline {
        /// Partner ID
        id: String,
    },
    /// Show a partner's metrics snapshot
    Metrics {
        /// Partner ID
        id: String,
        /// Recompute even if a fresh snapshot is cached
        #[arg(long)]
        force: bool,
    },
    /// Recompute metrics for every partner
    Recompute,
    /// Drop cached values
    Invalidate {
        #[command(subcommand)]
        target: InvalidateCommands,
    },
    /// Add a recruit to a sponsor's team
    Recruit {
        /// Sponsor ID
        sponsor: String,
        /// Recruit ID
        recruit: String,
    },
    /// Remove a recruit from a sponsor's team
    Unrecruit {
        /// Sponsor ID
        sponsor: String,
        /// Recruit ID
        recruit: String,
    },
    /// Record an order
    Order {
        /// Order ID
        id: String,
        /// Buying partner ID
        buyer: String,
        /// Order total
        total: f64,
        /// Placement time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand, Debug)]
enum InvalidateCommands {
    /// Cached rank of a partner and its upline
    Rank {
        /// Partner ID
        id: String,
    },
    /// Cached metrics snapshot of a partner
    Metrics {
        /// Partner ID
        id: String,
    },
    /// Cached user list pages
    Pages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the JSON result
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(
            args.json_logs
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!args.json_logs)
                .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    let mut config = settings::load(args.config.as_deref())?;
    if let Some(backend) = args.backend {
        config.store.backend = backend.into();
    }
    if let Some(path) = args.db_path.clone() {
        config.store.path = path;
    }
    debug!("Configuration: {:?}", config);

    referral_metrics::telemetry::describe();

    let kv: Arc<dyn KvStore> = match config.store.backend {
        StoreBackend::Memory => {
            if args.seed.is_none() && !matches!(args.command, Commands::Import { .. }) {
                warn!("Memory backend is empty on start; pass --seed or use --backend redb");
            }
            Arc::new(MemoryKvStore::new())
        }
        StoreBackend::Redb => {
            info!("Opening KV store at {}", config.store.path.display());
            Arc::new(
                RedbKvStore::open(&config.store.path).with_context(|| {
                    format!("Failed to open '{}'", config.store.path.display())
                })?,
            )
        }
    };

    let repo = Repository::new(kv);
    if let Some(path) = &args.seed {
        SeedFile::read(path)?.apply(&repo).await?;
    }
    let engine = MetricsAggregator::new(repo.clone(), config.metrics);

    match args.command {
        Commands::Import { file } => {
            let summary = SeedFile::read(&file)?.apply(&repo).await?;
            print_json(&summary)
        }
        Commands::Rank { id, no_cache } => {
            let rank = engine.ranks().get_user_rank(&id, !no_cache).await;
            print_json(&json!({ "partnerId": id, "rank": rank }))
        }
        Commands::UpdateUpline { id } => {
            let updated = engine.ranks().update_upline_ranks(&id).await;
            print_json(&json!({ "partnerId": id, "updated": updated }))
        }
        Commands::Metrics { id, force } => {
            let snapshot = if force {
                engine.calculate_and_cache_user_metrics(&id, None).await?
            } else {
                engine.get_user_metrics(&id).await?
            };
            print_json(&snapshot)
        }
        Commands::Recompute => {
            let summary = engine.recalculate_all_metrics().await;
            print_json(&summary)?;
            if !summary.success {
                anyhow::bail!("Bulk recomputation did not complete");
            }
            Ok(())
        }
        Commands::Invalidate { target } => match target {
            InvalidateCommands::Rank { id } => {
                let chain = engine.ranks().invalidate_rank_cache(&id).await;
                print_json(&json!({ "invalidated": chain }))
            }
            InvalidateCommands::Metrics { id } => {
                engine.invalidate_user_metrics(&id).await?;
                print_json(&json!({ "invalidated": [id] }))
            }
            InvalidateCommands::Pages => {
                let removed = engine.invalidate_page_cache().await?;
                print_json(&json!({ "removed": removed }))
            }
        },
        Commands::Recruit { sponsor, recruit } => {
            let previous = repo.add_recruit(&sponsor, &recruit).await?;
            engine.on_team_changed(&sponsor).await?;
            if let Some(previous) = previous.as_deref().filter(|p| *p != sponsor) {
                engine.on_team_changed(previous).await?;
            }
            print_json(&json!({
                "sponsorId": sponsor,
                "recruitId": recruit,
                "previousSponsorId": previous,
            }))
        }
        Commands::Unrecruit { sponsor, recruit } => {
            repo.remove_recruit(&sponsor, &recruit).await?;
            engine.on_team_changed(&sponsor).await?;
            print_json(&json!({ "sponsorId": sponsor, "removed": recruit }))
        }
        Commands::Order {
            id,
            buyer,
            total,
            at,
        } => {
            let order = Order::new(id, buyer, total, at.unwrap_or_else(Utc::now));
            repo.put_order(&order).await?;
            engine.on_order_recorded(&order.buyer_id).await?;
            print_json(&order)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
