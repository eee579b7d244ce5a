//! Capability traits the control loop is injected with. Modelled on the
//! teacher's "injected provider" redesign note: no global mutable SDK
//! clients, tests pass fakes instead of hitting the network.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{
    Cluster, ClusterLifecycleEvent, ClusterState, CpuUsageSample, InstanceFleet, InstanceGroup,
    Instance, ManagedScalingPolicy, MetricSample, ResizeEvent,
};

#[derive(Debug, Clone)]
pub struct ClusterDescription {
    pub state: ClusterState,
    pub name: String,
    pub master_public_dns: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transient error calling the cluster service: {0}")]
    Transient(String),
    #[error("cluster service rejected the request: {0}")]
    Validation(String),
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),
}

/// Abstraction over the managed cluster service's control-plane SDK.
/// `describe_instance_types` backs the process-wide vcpu catalog.
#[async_trait]
pub trait ClusterServiceClient: Send + Sync {
    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterDescription, ProviderError>;
    async fn get_policy(&self, cluster_id: &str) -> Result<ManagedScalingPolicy, ProviderError>;
    async fn put_policy(&self, cluster_id: &str, policy: &ManagedScalingPolicy) -> Result<(), ProviderError>;
    async fn list_fleets(&self, cluster_id: &str) -> Result<Vec<InstanceFleet>, ProviderError>;
    async fn list_groups(&self, cluster_id: &str) -> Result<Vec<InstanceGroup>, ProviderError>;
    async fn list_instances(&self, cluster_id: &str) -> Result<Vec<Instance>, ProviderError>;
    async fn modify_fleet(
        &self,
        cluster_id: &str,
        fleet_id: &str,
        target_on_demand: i64,
        target_spot: i64,
    ) -> Result<(), ProviderError>;
    async fn modify_groups(&self, cluster_id: &str, changes: &[(String, i64)]) -> Result<(), ProviderError>;
    async fn describe_instance_types(&self, types: &[String]) -> Result<HashMap<String, i64>, ProviderError>;
    async fn add_job_flow_steps(&self, cluster_id: &str, steps: serde_json::Value) -> Result<(), ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("cluster {0} not found in the registry")]
    ClusterNotFound(String),
}

/// Abstraction over the persistence layer: typed registry rows plus the
/// append-only time-series log. A single implementation (redis-backed) backs
/// production; `scalectl-core`'s own tests use an in-memory fake so the
/// control loop's tests never touch a real database.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn active_cluster_ids(&self) -> Result<Vec<String>, StoreError>;
    /// Every registered cluster id, active or not. Backs `list-clusters`.
    async fn all_cluster_ids(&self) -> Result<Vec<String>, StoreError>;
    async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>, StoreError>;
    async fn save_cluster(&self, cluster: &Cluster) -> Result<(), StoreError>;
    async fn delete_cluster(&self, id: &str) -> Result<(), StoreError>;

    async fn append_metric_sample(&self, cluster_id: &str, sample: &MetricSample) -> Result<(), StoreError>;
    async fn append_cpu_usage_sample(&self, cluster_id: &str, sample: &CpuUsageSample) -> Result<(), StoreError>;
    async fn metric_samples_since(
        &self,
        cluster_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, StoreError>;
    /// Every `CpuUsageSample` still inside the window, grouped by instance.
    async fn cpu_samples_since(
        &self,
        cluster_id: &str,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<CpuUsageSample>>, StoreError>;

    async fn append_resize_event(&self, event: &ResizeEvent) -> Result<(), StoreError>;
    async fn append_lifecycle_event(&self, event: &ClusterLifecycleEvent) -> Result<(), StoreError>;

    async fn sweep_retention(&self, now: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("event queue error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct RawMessage {
    pub receipt: String,
    pub body: serde_json::Value,
}

/// Abstraction over the inbound cluster-lifecycle event queue.
#[async_trait]
pub trait EventQueueClient: Send + Sync {
    async fn receive_batch(&self) -> Result<Vec<RawMessage>, EventBusError>;
    async fn delete(&self, receipt: &str) -> Result<(), EventBusError>;
}

/// Process-wide, file-cached `InstanceType -> vcpu count` lookup, built once
/// via `ClusterServiceClient::describe_instance_types` on first miss.
pub trait VcpuCatalog: Send + Sync {
    fn vcpu(&self, instance_type: &str) -> Option<i64>;
}
