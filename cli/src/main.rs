//! `scalectl`: operator CLI for the managed-scaling control loop. Grounded
//! on the teacher's `polis-cli` clap-derive binary — nested `Subcommand`
//! enums dispatched from a single `match`, no generated subcommand tables.

mod collector;
mod commands;
mod config;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use scalectl_core::ports::{ClusterServiceClient, ClusterStore};
use scalectl_core::scheduler::Scheduler;
use scalectl_eventbus::LapinEventQueueClient;
use scalectl_provider::HttpClusterServiceClient;
use scalectl_store::RedisStore;
use scalectl_telemetry::instance_types::Catalog;

use collector::Collector;
use commands::cluster::{AddArgs, ModifyArgs};
use commands::start::StartArgs;
use commands::test_job::{KillTestJobArgs, RunTestJobArgs};

#[derive(Parser)]
#[command(name = "scalectl")]
#[command(about = "Managed-scaling control loop for YARN/Hadoop clusters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a cluster to be managed by this tool.
    AddCluster(AddArgs),
    /// Modify a managed cluster's configuration.
    ModifyCluster(ModifyArgs),
    /// List all managed clusters.
    ListClusters,
    /// Describe a managed cluster by id.
    DescribeCluster {
        #[arg(long)]
        cluster_id: String,
    },
    /// Remove a cluster from management.
    DeleteCluster {
        #[arg(long)]
        cluster_id: String,
    },
    /// Enable a managed cluster (or all of them).
    EnableCluster {
        #[arg(long)]
        cluster_id: Option<String>,
        #[arg(short = 'a', long = "all-clusters")]
        all: bool,
    },
    /// Disable a managed cluster (or all of them).
    DisableCluster {
        #[arg(long)]
        cluster_id: Option<String>,
        #[arg(short = 'a', long = "all-clusters")]
        all: bool,
    },
    /// Reset a cluster (or all of them) to its initial max capacity.
    Reset {
        #[arg(long)]
        cluster_id: Option<String>,
        #[arg(short = 'a', long = "all-clusters")]
        all: bool,
    },
    /// Run the collection + reconciliation loop.
    Start(StartArgs),
    /// Submit a SparkPi smoke-test job.
    RunTestJob(RunTestJobArgs),
    /// Kill running applications on a managed cluster.
    KillTestJob(KillTestJobArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = config::Config::load();

    let conn = scalectl_store::connect(&config.redis_url).await?;
    let store: Arc<dyn ClusterStore> = Arc::new(RedisStore::new(conn));
    let provider: Arc<dyn ClusterServiceClient> =
        Arc::new(HttpClusterServiceClient::new(config.provider_base_url.clone()));

    let result = match cli.command {
        Commands::AddCluster(args) => commands::cluster::add(store.as_ref(), provider.as_ref(), args).await,
        Commands::ModifyCluster(args) => commands::cluster::modify(store.as_ref(), args).await,
        Commands::ListClusters => commands::cluster::list(store.as_ref()).await,
        Commands::DescribeCluster { cluster_id } => commands::cluster::describe(store.as_ref(), &cluster_id).await,
        Commands::DeleteCluster { cluster_id } => commands::cluster::delete(store.as_ref(), &cluster_id).await,
        Commands::EnableCluster { cluster_id, all } => {
            commands::cluster::set_active(store.as_ref(), &cluster_id, all, true).await
        }
        Commands::DisableCluster { cluster_id, all } => {
            commands::cluster::set_active(store.as_ref(), &cluster_id, all, false).await
        }
        Commands::Reset { cluster_id, all } => {
            commands::cluster::reset(store.as_ref(), provider.as_ref(), &cluster_id, all).await
        }
        Commands::Start(args) => {
            let needed_types = Vec::new();
            let catalog = Catalog::load_or_fetch(&config.instance_type_cache, provider.as_ref(), &needed_types).await?;

            let event_queue = match (&args.event_queue, &config.amqp_addr) {
                (Some(queue), Some(addr)) => Some(Arc::new(
                    LapinEventQueueClient::connect(addr.as_str(), queue.clone()).await?,
                ) as Arc<dyn scalectl_core::ports::EventQueueClient>),
                _ => None,
            };

            let scheduler = Arc::new(Scheduler {
                provider: provider.clone(),
                store: store.clone(),
                event_queue,
                vcpu_catalog: Arc::new(catalog),
                dry_run: args.dry_run,
            });
            let collector = Arc::new(Collector {
                store: store.clone(),
                provider: provider.clone(),
                http: reqwest::Client::new(),
                proxy_base: config.proxy_base.clone(),
            });

            commands::start::run(scheduler, collector, args).await;
            Ok(())
        }
        Commands::RunTestJob(args) => commands::test_job::run_test_job(provider.as_ref(), args).await,
        Commands::KillTestJob(args) => commands::test_job::kill_test_job(store.as_ref(), args).await,
    };

    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
    Ok(())
}
