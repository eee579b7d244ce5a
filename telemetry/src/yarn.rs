//! YARN ResourceManager REST collector. Grounded on the teacher's
//! `reqwest::Client` usage in `services/health-check`/`services/builder` —
//! a plain GET, `.json()`/manual parse, no generated client.

use std::collections::HashMap;
use std::time::Duration;

use scalectl_core::model::MetricSample;

use crate::TelemetryError;

const FIELD_MAP: &[(&str, fn(&mut MetricSample, f64))] = &[
    ("appsRunning", |m, v| m.apps_running = v),
    ("appsPending", |m, v| m.apps_pending = v),
    ("reservedMB", |m, v| m.mem_reserved_mb = v),
    ("pendingMB", |m, v| m.mem_pending_mb = v),
    ("allocatedMB", |m, v| m.mem_allocated_mb = v),
    ("availableMB", |m, v| m.mem_available_mb = v),
    ("totalMB", |m, v| m.mem_total_mb = v),
    ("reservedVirtualCores", |m, v| m.vcore_reserved = v),
    ("pendingVirtualCores", |m, v| m.vcore_pending = v),
    ("allocatedVirtualCores", |m, v| m.vcore_allocated = v),
    ("availableVirtualCores", |m, v| m.vcore_available = v),
    ("totalVirtualCores", |m, v| m.vcore_total = v),
    ("activeNodes", |m, v| m.active_nodes = v),
];

/// GETs `<base_url>/ws/v1/cluster/metrics` and maps the `clusterMetrics`
/// object onto `MetricSample`. Fields ending in `AcrossPartition` are
/// present on some YARN versions and are ignored — they are per-partition
/// duplicates of fields we already read. `base_url` is the cluster's
/// resource manager endpoint, normally `http://<master>:8088`.
pub async fn fetch_cluster_metrics(
    client: &reqwest::Client,
    base_url: &str,
    timeout: Duration,
) -> Result<MetricSample, TelemetryError> {
    let url = format!("{base_url}/ws/v1/cluster/metrics");
    let body: serde_json::Value = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| TelemetryError::Fetch(url.clone(), e.to_string()))?
        .error_for_status()
        .map_err(|e| TelemetryError::Fetch(url.clone(), e.to_string()))?
        .json()
        .await
        .map_err(|e| TelemetryError::Parse(url.clone(), e.to_string()))?;

    let metrics = body
        .get("clusterMetrics")
        .ok_or_else(|| TelemetryError::Parse(url.clone(), "missing clusterMetrics".into()))?;

    let mut fields: HashMap<&str, f64> = HashMap::new();
    if let Some(obj) = metrics.as_object() {
        for (key, value) in obj {
            if key.ends_with("AcrossPartition") {
                continue;
            }
            if let Some(n) = value.as_f64() {
                fields.insert(key.as_str(), n);
            }
        }
    }

    let mut sample = MetricSample {
        event_time: Some(chrono::Utc::now()),
        ..Default::default()
    };
    for (key, setter) in FIELD_MAP {
        if let Some(v) = fields.get(key) {
            setter(&mut sample, *v);
        }
    }
    Ok(sample)
}

/// GETs `<base_url>/ws/v1/cluster/apps?states=RUNNING` and returns the
/// running application ids. Backs the `kill-test-job` CLI command.
pub async fn list_running_apps(client: &reqwest::Client, base_url: &str) -> Result<Vec<String>, TelemetryError> {
    let url = format!("{base_url}/ws/v1/cluster/apps?states=RUNNING");
    let body: serde_json::Value = client
        .get(&url)
        .send()
        .await
        .map_err(|e| TelemetryError::Fetch(url.clone(), e.to_string()))?
        .error_for_status()
        .map_err(|e| TelemetryError::Fetch(url.clone(), e.to_string()))?
        .json()
        .await
        .map_err(|e| TelemetryError::Parse(url.clone(), e.to_string()))?;

    let apps = body
        .get("apps")
        .and_then(|v| v.get("app"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    Ok(apps
        .iter()
        .filter_map(|app| app.get("id").and_then(|v| v.as_str()).map(str::to_string))
        .collect())
}

/// PUTs `{"state":"KILLED"}` to `<base_url>/ws/v1/cluster/apps/{app_id}/state`,
/// returning the response body text the way the original tool echoed
/// `requests.put(...).text` back to the operator.
pub async fn kill_app(client: &reqwest::Client, base_url: &str, app_id: &str) -> Result<String, TelemetryError> {
    let url = format!("{base_url}/ws/v1/cluster/apps/{app_id}/state");
    client
        .put(&url)
        .json(&serde_json::json!({ "state": "KILLED" }))
        .send()
        .await
        .map_err(|e| TelemetryError::Fetch(url.clone(), e.to_string()))?
        .error_for_status()
        .map_err(|e| TelemetryError::Fetch(url.clone(), e.to_string()))?
        .text()
        .await
        .map_err(|e| TelemetryError::Parse(url, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_cluster_metrics_and_drops_across_partition_fields() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/ws/v1/cluster/metrics")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"clusterMetrics":{"appsRunning":3,"appsPending":1,"totalMB":2048,
                     "allocatedMBAcrossPartition":999,"activeNodes":4}}"#,
            )
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let sample = fetch_cluster_metrics(&client, &server.url(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(sample.apps_running, 3.0);
        assert_eq!(sample.apps_pending, 1.0);
        assert_eq!(sample.mem_total_mb, 2048.0);
        assert_eq!(sample.active_nodes, 4.0);
    }

    #[tokio::test]
    async fn non_200_is_a_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/ws/v1/cluster/metrics").with_status(500).create_async().await;

        let client = reqwest::Client::new();
        let err = fetch_cluster_metrics(&client, &server.url(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Fetch(_, _)));
    }

    #[tokio::test]
    async fn list_running_apps_extracts_ids() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/ws/v1/cluster/apps?states=RUNNING")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"apps":{"app":[{"id":"application_1_0001"},{"id":"application_1_0002"}]}}"#)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let apps = list_running_apps(&client, &server.url()).await.unwrap();
        assert_eq!(apps, vec!["application_1_0001", "application_1_0002"]);
    }

    #[tokio::test]
    async fn kill_app_puts_killed_state() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("PUT", "/ws/v1/cluster/apps/application_1_0001/state")
            .match_body(mockito::Matcher::Json(serde_json::json!({"state": "KILLED"})))
            .with_status(200)
            .with_body("killed")
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let resp = kill_app(&client, &server.url(), "application_1_0001").await.unwrap();
        assert_eq!(resp, "killed");
    }
}
