//! Instance discovery: the operator's own proxy endpoint first, falling
//! back to the cluster service's own (paginated) instance listing.

use scalectl_core::model::Instance;
use scalectl_core::ports::ClusterServiceClient;

use crate::TelemetryError;

/// Tries `<proxy_base>/clusters/<cluster_id>/instances` first; any error
/// (network, non-200, parse) falls back to the injected SDK client.
pub async fn list_instances(
    client: &reqwest::Client,
    provider: &dyn ClusterServiceClient,
    cluster_id: &str,
    proxy_base: Option<&str>,
) -> Result<Vec<Instance>, TelemetryError> {
    if let Some(base) = proxy_base {
        match fetch_from_proxy(client, base, cluster_id).await {
            Ok(instances) => return Ok(instances),
            Err(err) => {
                tracing::warn!(cluster_id, error = %err, "instance discovery proxy failed, falling back to SDK");
            }
        }
    }

    provider
        .list_instances(cluster_id)
        .await
        .map_err(|e| TelemetryError::Fetch(cluster_id.to_string(), e.to_string()))
}

async fn fetch_from_proxy(
    client: &reqwest::Client,
    proxy_base: &str,
    cluster_id: &str,
) -> Result<Vec<Instance>, TelemetryError> {
    let url = format!("{proxy_base}/clusters/{cluster_id}/instances");
    client
        .get(&url)
        .send()
        .await
        .map_err(|e| TelemetryError::Fetch(url.clone(), e.to_string()))?
        .error_for_status()
        .map_err(|e| TelemetryError::Fetch(url.clone(), e.to_string()))?
        .json()
        .await
        .map_err(|e| TelemetryError::Parse(url.clone(), e.to_string()))
}
