//! REST-backed `ClusterServiceClient`. Grounded on the teacher's
//! `reqwest::Client` + manual JSON request/response pattern
//! (`services/health-check/src/health_check.rs`), with calls wrapped in
//! `backoff`'s exponential retry since the cluster service's control plane
//! is expected to throttle under load.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use scalectl_core::model::{ClusterState, Instance, InstanceFleet, InstanceGroup, ManagedScalingPolicy};
use scalectl_core::ports::{ClusterDescription, ClusterServiceClient, ProviderError};

const MAX_ATTEMPTS: u32 = 10;

pub struct HttpClusterServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClusterServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with static config"),
            base_url: base_url.into(),
        }
    }

    async fn retry<T, F, Fut>(&self, op_name: &str, mut f: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::from_secs(30)))
            .build();

        let mut attempt: u32 = 0;
        backoff::future::retry(backoff, || {
            attempt += 1;
            let op_name = op_name.to_string();
            async move {
                match f().await {
                    Ok(v) => Ok(v),
                    Err(ProviderError::Transient(msg)) if attempt < MAX_ATTEMPTS => {
                        tracing::warn!(op = %op_name, attempt, error = %msg, "transient error, retrying");
                        Err(backoff::Error::transient(ProviderError::Transient(msg)))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            }
        })
        .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn to_provider_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() {
        ProviderError::Transient(err.to_string())
    } else if let Some(status) = err.status() {
        if status.is_server_error() {
            ProviderError::Transient(err.to_string())
        } else {
            ProviderError::Validation(err.to_string())
        }
    } else {
        ProviderError::Transient(err.to_string())
    }
}

#[async_trait]
impl ClusterServiceClient for HttpClusterServiceClient {
    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterDescription, ProviderError> {
        self.retry("describe_cluster", || async {
            #[derive(serde::Deserialize)]
            struct Resp {
                state: String,
                name: String,
                master_public_dns: Option<String>,
            }
            let resp: Resp = self
                .client
                .get(self.url(&format!("/clusters/{cluster_id}")))
                .send()
                .await
                .map_err(to_provider_error)?
                .error_for_status()
                .map_err(to_provider_error)?
                .json()
                .await
                .map_err(to_provider_error)?;
            let state = match resp.state.as_str() {
                "RUNNING" => ClusterState::Running,
                "WAITING" => ClusterState::Waiting,
                _ => ClusterState::Other,
            };
            Ok(ClusterDescription {
                state,
                name: resp.name,
                master_public_dns: resp.master_public_dns,
            })
        })
        .await
    }

    async fn get_policy(&self, cluster_id: &str) -> Result<ManagedScalingPolicy, ProviderError> {
        self.retry("get_policy", || async {
            self.client
                .get(self.url(&format!("/clusters/{cluster_id}/managed-scaling-policy")))
                .send()
                .await
                .map_err(to_provider_error)?
                .error_for_status()
                .map_err(to_provider_error)?
                .json()
                .await
                .map_err(to_provider_error)
        })
        .await
    }

    async fn put_policy(&self, cluster_id: &str, policy: &ManagedScalingPolicy) -> Result<(), ProviderError> {
        self.retry("put_policy", || async {
            self.client
                .put(self.url(&format!("/clusters/{cluster_id}/managed-scaling-policy")))
                .json(policy)
                .send()
                .await
                .map_err(to_provider_error)?
                .error_for_status()
                .map_err(to_provider_error)?;
            Ok(())
        })
        .await
    }

    async fn list_fleets(&self, cluster_id: &str) -> Result<Vec<InstanceFleet>, ProviderError> {
        self.retry("list_fleets", || async {
            self.client
                .get(self.url(&format!("/clusters/{cluster_id}/instance-fleets")))
                .send()
                .await
                .map_err(to_provider_error)?
                .error_for_status()
                .map_err(to_provider_error)?
                .json()
                .await
                .map_err(to_provider_error)
        })
        .await
    }

    async fn list_groups(&self, cluster_id: &str) -> Result<Vec<InstanceGroup>, ProviderError> {
        self.retry("list_groups", || async {
            self.client
                .get(self.url(&format!("/clusters/{cluster_id}/instance-groups")))
                .send()
                .await
                .map_err(to_provider_error)?
                .error_for_status()
                .map_err(to_provider_error)?
                .json()
                .await
                .map_err(to_provider_error)
        })
        .await
    }

    async fn list_instances(&self, cluster_id: &str) -> Result<Vec<Instance>, ProviderError> {
        self.retry("list_instances", || async {
            let mut all = Vec::new();
            let mut marker: Option<String> = None;
            loop {
                let mut url = self.url(&format!("/clusters/{cluster_id}/instances?max_items=100"));
                if let Some(m) = &marker {
                    url.push_str(&format!("&marker={m}"));
                }
                #[derive(serde::Deserialize)]
                struct Page {
                    instances: Vec<Instance>,
                    marker: Option<String>,
                }
                let page: Page = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(to_provider_error)?
                    .error_for_status()
                    .map_err(to_provider_error)?
                    .json()
                    .await
                    .map_err(to_provider_error)?;
                all.extend(page.instances);
                marker = page.marker;
                if marker.is_none() {
                    break;
                }
            }
            Ok(all)
        })
        .await
    }

    async fn modify_fleet(
        &self,
        cluster_id: &str,
        fleet_id: &str,
        target_on_demand: i64,
        target_spot: i64,
    ) -> Result<(), ProviderError> {
        self.retry("modify_fleet", || async {
            self.client
                .post(self.url(&format!("/clusters/{cluster_id}/instance-fleets/{fleet_id}/modify")))
                .json(&serde_json::json!({
                    "targetOnDemandCapacity": target_on_demand,
                    "targetSpotCapacity": target_spot,
                }))
                .send()
                .await
                .map_err(to_provider_error)?
                .error_for_status()
                .map_err(to_provider_error)?;
            Ok(())
        })
        .await
    }

    async fn modify_groups(&self, cluster_id: &str, changes: &[(String, i64)]) -> Result<(), ProviderError> {
        self.retry("modify_groups", || async {
            let body: Vec<_> = changes
                .iter()
                .map(|(id, count)| serde_json::json!({"instanceGroupId": id, "instanceCount": count}))
                .collect();
            self.client
                .post(self.url(&format!("/clusters/{cluster_id}/instance-groups/modify")))
                .json(&serde_json::json!({ "instanceGroups": body }))
                .send()
                .await
                .map_err(to_provider_error)?
                .error_for_status()
                .map_err(to_provider_error)?;
            Ok(())
        })
        .await
    }

    async fn describe_instance_types(&self, types: &[String]) -> Result<HashMap<String, i64>, ProviderError> {
        self.retry("describe_instance_types", || async {
            self.client
                .post(self.url("/instance-types/describe"))
                .json(&serde_json::json!({ "types": types }))
                .send()
                .await
                .map_err(to_provider_error)?
                .error_for_status()
                .map_err(to_provider_error)?
                .json()
                .await
                .map_err(to_provider_error)
        })
        .await
    }

    async fn add_job_flow_steps(&self, cluster_id: &str, steps: serde_json::Value) -> Result<(), ProviderError> {
        self.retry("add_job_flow_steps", || async {
            self.client
                .post(self.url(&format!("/clusters/{cluster_id}/steps")))
                .json(&steps)
                .send()
                .await
                .map_err(to_provider_error)?
                .error_for_status()
                .map_err(to_provider_error)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_policy_parses_response() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/clusters/j-1/managed-scaling-policy")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"min_capacity_units":10,"max_capacity_units":100,
                     "max_core_capacity_units":20,"max_on_demand_capacity_units":0,
                     "unit_type":"InstanceFleetUnits"}"#,
            )
            .create_async()
            .await;

        let client = HttpClusterServiceClient::new(server.url());
        let policy = client.get_policy("j-1").await.unwrap();
        assert_eq!(policy.max_capacity_units, 100);
    }

    #[tokio::test]
    async fn server_error_surfaces_as_provider_error_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/clusters/j-1/managed-scaling-policy")
            .with_status(503)
            .expect_at_least(1)
            .create_async()
            .await;

        let client = HttpClusterServiceClient::new(server.url());
        let err = client.get_policy("j-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Transient(_)));
    }
}
