//! `start`: runs the collector + reconciliation scheduler, either once or on
//! a fixed interval until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use scalectl_core::scheduler::Scheduler;

use crate::collector::Collector;

#[derive(Debug, Args)]
pub struct StartArgs {
    #[arg(short = 's', long = "schedule-interval")]
    pub schedule_interval: u64,
    #[arg(long)]
    pub dry_run: bool,
    #[arg(long)]
    pub run_once: bool,
    #[arg(long)]
    pub event_queue: Option<String>,
}

pub async fn run(scheduler: Arc<Scheduler>, collector: Arc<Collector>, args: StartArgs) {
    if args.run_once {
        collector.collect_once().await;
        if let Err(err) = scheduler.run_once().await {
            tracing::error!(error = %err, "reconciliation tick failed");
        }
        if let Err(err) = scheduler.drain_lifecycle_events().await {
            tracing::error!(error = %err, "lifecycle event drain failed");
        }
        return;
    }

    let interval = Duration::from_secs(args.schedule_interval);
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                collector.collect_once().await;
                if let Err(err) = scheduler.run_once().await {
                    tracing::error!(error = %err, "reconciliation tick failed");
                }
                if let Err(err) = scheduler.drain_lifecycle_events().await {
                    tracing::error!(error = %err, "lifecycle event drain failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Scheduler shutdown successfully.");
                break;
            }
        }
    }
}
