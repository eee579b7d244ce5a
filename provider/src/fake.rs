//! In-memory `ClusterServiceClient`, seeded by tests instead of hitting a
//! network. Mirrors `HttpClusterServiceClient`'s surface exactly.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use scalectl_core::model::{Instance, InstanceFleet, InstanceGroup, ManagedScalingPolicy};
use scalectl_core::ports::{ClusterDescription, ClusterServiceClient, ProviderError};

#[derive(Default)]
pub struct FakeClusterServiceClient {
    pub descriptions: Mutex<HashMap<String, ClusterDescription>>,
    pub policies: Mutex<HashMap<String, ManagedScalingPolicy>>,
    pub fleets: Mutex<HashMap<String, Vec<InstanceFleet>>>,
    pub groups: Mutex<HashMap<String, Vec<InstanceGroup>>>,
    pub instances: Mutex<HashMap<String, Vec<Instance>>>,
    pub instance_types: Mutex<HashMap<String, i64>>,
    pub put_policy_calls: Mutex<Vec<(String, ManagedScalingPolicy)>>,
    pub modify_fleet_calls: Mutex<Vec<(String, String, i64, i64)>>,
    pub modify_groups_calls: Mutex<Vec<(String, Vec<(String, i64)>)>>,
    pub added_steps: Mutex<Vec<(String, serde_json::Value)>>,
}

impl FakeClusterServiceClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterServiceClient for FakeClusterServiceClient {
    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterDescription, ProviderError> {
        self.descriptions
            .lock()
            .unwrap()
            .get(cluster_id)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownCluster(cluster_id.to_string()))
    }

    async fn get_policy(&self, cluster_id: &str) -> Result<ManagedScalingPolicy, ProviderError> {
        self.policies
            .lock()
            .unwrap()
            .get(cluster_id)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownCluster(cluster_id.to_string()))
    }

    async fn put_policy(&self, cluster_id: &str, policy: &ManagedScalingPolicy) -> Result<(), ProviderError> {
        self.policies
            .lock()
            .unwrap()
            .insert(cluster_id.to_string(), policy.clone());
        self.put_policy_calls
            .lock()
            .unwrap()
            .push((cluster_id.to_string(), policy.clone()));
        Ok(())
    }

    async fn list_fleets(&self, cluster_id: &str) -> Result<Vec<InstanceFleet>, ProviderError> {
        Ok(self.fleets.lock().unwrap().get(cluster_id).cloned().unwrap_or_default())
    }

    async fn list_groups(&self, cluster_id: &str) -> Result<Vec<InstanceGroup>, ProviderError> {
        Ok(self.groups.lock().unwrap().get(cluster_id).cloned().unwrap_or_default())
    }

    async fn list_instances(&self, cluster_id: &str) -> Result<Vec<Instance>, ProviderError> {
        Ok(self
            .instances
            .lock()
            .unwrap()
            .get(cluster_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn modify_fleet(
        &self,
        cluster_id: &str,
        fleet_id: &str,
        target_on_demand: i64,
        target_spot: i64,
    ) -> Result<(), ProviderError> {
        self.modify_fleet_calls.lock().unwrap().push((
            cluster_id.to_string(),
            fleet_id.to_string(),
            target_on_demand,
            target_spot,
        ));
        Ok(())
    }

    async fn modify_groups(&self, cluster_id: &str, changes: &[(String, i64)]) -> Result<(), ProviderError> {
        self.modify_groups_calls
            .lock()
            .unwrap()
            .push((cluster_id.to_string(), changes.to_vec()));
        Ok(())
    }

    async fn describe_instance_types(&self, types: &[String]) -> Result<HashMap<String, i64>, ProviderError> {
        let known = self.instance_types.lock().unwrap();
        Ok(types
            .iter()
            .filter_map(|t| known.get(t).map(|v| (t.clone(), *v)))
            .collect())
    }

    async fn add_job_flow_steps(&self, cluster_id: &str, steps: serde_json::Value) -> Result<(), ProviderError> {
        self.added_steps.lock().unwrap().push((cluster_id.to_string(), steps));
        Ok(())
    }
}
