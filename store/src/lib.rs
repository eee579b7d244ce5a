//! Redis-backed `ClusterStore`: a typed registry plus an append-only
//! time-series log, grounded on the teacher's `db.rs` connection helper and
//! `redis::AsyncCommands` usage in `services/health-check`/`principal::stats`.

pub mod registry;
pub mod test_support;
pub mod timeseries;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use scalectl_core::model::{Cluster, ClusterLifecycleEvent, CpuUsageSample, MetricSample, ResizeEvent};
use scalectl_core::ports::{ClusterStore, StoreError};

/// Opens a reconnecting redis connection. `url` follows the same shape as
/// the teacher's `MASTER_REDIS_CONNECTION_URL`, read at runtime rather than
/// baked in via `dotenv_codegen::dotenv!` so the daemon stays configurable
/// per deployment.
pub async fn connect(url: &str) -> Result<ConnectionManager, StoreError> {
    let client = redis::Client::open(url).map_err(|e| StoreError::Database(e.to_string()))?;
    client
        .get_tokio_connection_manager()
        .await
        .map_err(|e| StoreError::Database(e.to_string()))
}

/// The production `ClusterStore`: one shared `ConnectionManager` backing
/// both the registry and the time-series log.
#[derive(Clone)]
pub struct RedisStore {
    pub(crate) conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ClusterStore for RedisStore {
    async fn active_cluster_ids(&self) -> Result<Vec<String>, StoreError> {
        registry::active_cluster_ids(&mut self.conn.clone()).await
    }

    async fn all_cluster_ids(&self) -> Result<Vec<String>, StoreError> {
        registry::all_cluster_ids(&mut self.conn.clone()).await
    }

    async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>, StoreError> {
        registry::get_cluster(&mut self.conn.clone(), id).await
    }

    async fn save_cluster(&self, cluster: &Cluster) -> Result<(), StoreError> {
        registry::save_cluster(&mut self.conn.clone(), cluster).await
    }

    async fn delete_cluster(&self, id: &str) -> Result<(), StoreError> {
        registry::delete_cluster(&mut self.conn.clone(), id).await
    }

    async fn append_metric_sample(&self, cluster_id: &str, sample: &MetricSample) -> Result<(), StoreError> {
        timeseries::append_metric_sample(&mut self.conn.clone(), cluster_id, sample).await
    }

    async fn append_cpu_usage_sample(&self, cluster_id: &str, sample: &CpuUsageSample) -> Result<(), StoreError> {
        timeseries::append_cpu_usage_sample(&mut self.conn.clone(), cluster_id, sample).await
    }

    async fn metric_samples_since(
        &self,
        cluster_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, StoreError> {
        timeseries::metric_samples_since(&mut self.conn.clone(), cluster_id, since).await
    }

    async fn cpu_samples_since(
        &self,
        cluster_id: &str,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<CpuUsageSample>>, StoreError> {
        timeseries::cpu_samples_since(&mut self.conn.clone(), cluster_id, since).await
    }

    async fn append_resize_event(&self, event: &ResizeEvent) -> Result<(), StoreError> {
        timeseries::append_resize_event(&mut self.conn.clone(), event).await
    }

    async fn append_lifecycle_event(&self, event: &ClusterLifecycleEvent) -> Result<(), StoreError> {
        timeseries::append_lifecycle_event(&mut self.conn.clone(), event).await
    }

    async fn sweep_retention(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        timeseries::sweep_retention(&mut self.conn.clone(), now).await
    }
}
