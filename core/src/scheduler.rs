//! The reconciliation loop: one tick per active cluster, on a fixed
//! interval, until shut down. Grounded on the teacher's
//! `AutoscalerManager`/`HorizontalPodAutoscaler::start_controller` poll loop,
//! generalized to poll an injected store instead of a `watch::Receiver`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;

use crate::aggregate::{self, AggregateError};
use crate::decision;
use crate::execute::{self, ExecuteError};
use crate::model::{Cluster, ClusterState};
use crate::ports::{ClusterServiceClient, ClusterStore, EventQueueClient, StoreError, VcpuCatalog};

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Execute(#[from] ExecuteError),
}

/// Injected dependencies for one scheduler instance. All four ports are
/// `Arc<dyn _>` so the same scheduler can be cloned across the lifecycle
/// consumer task and the tick loop.
pub struct Scheduler {
    pub provider: Arc<dyn ClusterServiceClient>,
    pub store: Arc<dyn ClusterStore>,
    pub event_queue: Option<Arc<dyn EventQueueClient>>,
    pub vcpu_catalog: Arc<dyn VcpuCatalog>,
    pub dry_run: bool,
}

impl Scheduler {
    /// Runs one reconciliation pass over every active cluster in the
    /// registry. A failure on one cluster is logged and does not prevent the
    /// others in the same tick from being reconciled.
    pub async fn run_once(&self) -> Result<(), StoreError> {
        let now = Utc::now();
        self.store.sweep_retention(now).await?;

        let ids = self.store.active_cluster_ids().await?;
        for id in ids {
            if let Err(err) = self.reconcile_one(&id, now).await {
                tracing::error!(cluster_id = %id, error = %err, "tick failed for cluster");
            }
        }
        Ok(())
    }

    async fn reconcile_one(&self, cluster_id: &str, now: chrono::DateTime<Utc>) -> Result<(), TickError> {
        let Some(mut cluster) = self.store.get_cluster(cluster_id).await? else {
            return Ok(());
        };
        if !cluster.active {
            return Ok(());
        }

        if let Err(err) = self.refresh_shape(&mut cluster).await {
            tracing::warn!(cluster_id, error = %err, "could not refresh instance shape this tick");
        }

        if !matches!(cluster.state, ClusterState::Running | ClusterState::Waiting) {
            tracing::debug!(cluster_id, state = ?cluster.state, "skipping tick: cluster not in RUNNING/WAITING state");
            self.store.save_cluster(&cluster).await?;
            return Ok(());
        }

        let since = now - chrono::Duration::minutes(cluster.lookback_minutes);
        let samples = self.store.metric_samples_since(cluster_id, since).await?;
        let cpu_samples = self.store.cpu_samples_since(cluster_id, since).await?;
        let fresh_cpu = latest_per_instance(&cpu_samples);

        let avg = match aggregate::aggregate(&cluster, &samples, &cpu_samples, &fresh_cpu) {
            Ok(avg) => avg,
            Err(AggregateError::InsufficientSamples) => {
                tracing::debug!(cluster_id, "skipping tick: insufficient samples in lookback window");
                return Ok(());
            }
        };

        let target = decision::decide(&cluster, &avg);
        let event = execute::execute(
            self.provider.as_ref(),
            self.vcpu_catalog.as_ref(),
            &mut cluster,
            target,
            self.dry_run,
            now,
        )
        .await?;

        self.store.append_resize_event(&event).await?;
        self.store.save_cluster(&cluster).await?;
        Ok(())
    }

    async fn refresh_shape(&self, cluster: &mut Cluster) -> Result<(), crate::ports::ProviderError> {
        let description = self.provider.describe_cluster(&cluster.id).await?;
        cluster.state = description.state;

        let policy = self.provider.get_policy(&cluster.id).await?;
        if let Some(current) = cluster.current_policy.as_mut() {
            current.min_capacity_units = policy.min_capacity_units;
            current.max_core_capacity_units = policy.max_core_capacity_units;
            current.max_on_demand_capacity_units = policy.max_on_demand_capacity_units;
            current.unit_type = policy.unit_type;
        }

        match policy.unit_type {
            crate::model::UnitType::InstanceFleetUnits => {
                let fleets = self.provider.list_fleets(&cluster.id).await?;
                cluster.instance_shape = Some(crate::model::InstanceShape::Fleets(fleets));
            }
            crate::model::UnitType::Instances | crate::model::UnitType::Vcpu => {
                let groups = self.provider.list_groups(&cluster.id).await?;
                cluster.instance_shape = Some(crate::model::InstanceShape::Groups(groups));
            }
        }
        Ok(())
    }

    /// Drains one batch of inbound lifecycle events and mirrors them into
    /// the time-series log, independent of the resize tick.
    pub async fn drain_lifecycle_events(&self) -> Result<(), crate::ports::EventBusError> {
        let Some(queue) = &self.event_queue else {
            return Ok(());
        };
        for message in queue.receive_batch().await? {
            if let Some(event) = parse_lifecycle_event(&message.body) {
                if let Err(err) = self.store.append_lifecycle_event(&event).await {
                    tracing::error!(error = %err, "failed to persist lifecycle event");
                    continue;
                }
            }
            queue.delete(&message.receipt).await?;
        }
        Ok(())
    }

    /// Runs `run_once` on a fixed interval until ctrl-c is received.
    pub async fn run_periodic(self: Arc<Self>, interval: StdDuration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        tracing::error!(error = %err, "reconciliation tick failed");
                    }
                    if let Err(err) = self.drain_lifecycle_events().await {
                        tracing::error!(error = %err, "lifecycle event drain failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }
    }
}

/// Picks the newest sample per instance out of the lookback window, used as
/// the "fresh" half of the CPU utilisation delta (the other half being each
/// instance's oldest sample still in the window).
fn latest_per_instance(
    window: &std::collections::HashMap<String, Vec<crate::model::CpuUsageSample>>,
) -> std::collections::HashMap<String, crate::model::CpuUsageSample> {
    window
        .iter()
        .filter_map(|(instance_id, history)| {
            history
                .iter()
                .max_by_key(|s| s.event_time)
                .map(|s| (instance_id.clone(), *s))
        })
        .collect()
}

fn parse_lifecycle_event(body: &serde_json::Value) -> Option<crate::model::ClusterLifecycleEvent> {
    Some(crate::model::ClusterLifecycleEvent {
        detail_type: body.get("detail-type")?.as_str()?.to_string(),
        event_time: body
            .get("time")
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
        source: body.get("source").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        cluster_id: body
            .get("detail")
            .and_then(|d| d.get("clusterId"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        state: body
            .get("detail")
            .and_then(|d| d.get("state"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        message: body
            .get("detail")
            .and_then(|d| d.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        raw_message: body.clone(),
    })
}
