//! Per-tick telemetry collection: refreshes each active cluster's master
//! endpoint, scrapes YARN cluster metrics and per-instance CPU counters, and
//! appends both into the store. Lives in the binary rather than
//! `scalectl-core` because `scalectl-core` never depends on
//! `scalectl-telemetry` — the control loop only consumes what's already in
//! the store.

use std::sync::Arc;
use std::time::Duration;

use scalectl_core::ports::{ClusterServiceClient, ClusterStore};
use scalectl_telemetry::{discovery, node_exporter, yarn};

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Collector {
    pub store: Arc<dyn ClusterStore>,
    pub provider: Arc<dyn ClusterServiceClient>,
    pub http: reqwest::Client,
    pub proxy_base: Option<String>,
}

impl Collector {
    pub async fn collect_once(&self) {
        let ids = match self.store.active_cluster_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                tracing::error!(error = %err, "could not list active clusters for collection");
                return;
            }
        };
        for id in ids {
            self.collect_one(&id).await;
        }
    }

    async fn collect_one(&self, cluster_id: &str) {
        let Ok(Some(mut cluster)) = self.store.get_cluster(cluster_id).await else {
            return;
        };

        match self.provider.describe_cluster(cluster_id).await {
            Ok(desc) => {
                cluster.state = desc.state;
                if let Some(dns) = &desc.master_public_dns {
                    cluster.master_endpoint = Some(format!("http://{dns}:8088"));
                }
            }
            Err(err) => {
                tracing::warn!(cluster_id, error = %err, "could not describe cluster for collection");
                return;
            }
        }

        let Some(base_url) = cluster.master_endpoint.clone() else {
            tracing::debug!(cluster_id, "no master endpoint yet, skipping collection");
            return;
        };

        match yarn::fetch_cluster_metrics(&self.http, &base_url, SCRAPE_TIMEOUT).await {
            Ok(sample) => {
                if let Err(err) = self.store.append_metric_sample(cluster_id, &sample).await {
                    tracing::error!(cluster_id, error = %err, "failed to persist metric sample");
                }
            }
            Err(err) => tracing::warn!(cluster_id, error = %err, "yarn metrics scrape failed"),
        }

        match discovery::list_instances(&self.http, self.provider.as_ref(), cluster_id, self.proxy_base.as_deref())
            .await
        {
            Ok(instances) => {
                let cpu_samples = node_exporter::scrape_many(&self.http, &instances, SCRAPE_TIMEOUT).await;
                for sample in cpu_samples {
                    if let Err(err) = self.store.append_cpu_usage_sample(cluster_id, &sample).await {
                        tracing::error!(cluster_id, error = %err, "failed to persist cpu sample");
                    }
                }
            }
            Err(err) => tracing::warn!(cluster_id, error = %err, "instance discovery failed"),
        }

        if let Err(err) = self.store.save_cluster(&cluster).await {
            tracing::error!(cluster_id, error = %err, "failed to persist refreshed cluster");
        }
    }
}
