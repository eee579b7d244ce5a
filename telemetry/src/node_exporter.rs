//! Per-instance CPU scraper against a node-exporter `/metrics` endpoint.
//! Fans out with `buffer_unordered`, the corpus's standard pattern for
//! bounded-concurrency fetches (mirrors `discovery`'s instance listing).

use std::time::Duration;

use futures::stream::{self, StreamExt};
use scalectl_core::model::{CpuUsageSample, Instance};

use crate::TelemetryError;

const MAX_CONCURRENT_SCRAPES: usize = 16;

/// Scrapes one host's `/metrics` page and sums `node_cpu_seconds_total`
/// lines into total/idle CPU-seconds. Lines are plain Prometheus exposition
/// format: `node_cpu_seconds_total{cpu="0",mode="idle"} 1234.5`. `base_url`
/// is normally `http://<host_name>:9100`.
async fn scrape_one_at(
    client: &reqwest::Client,
    instance_id: &str,
    base_url: &str,
    timeout: Duration,
) -> Result<CpuUsageSample, TelemetryError> {
    let url = format!("{base_url}/metrics");
    let body = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| TelemetryError::Fetch(url.clone(), e.to_string()))?
        .error_for_status()
        .map_err(|e| TelemetryError::Fetch(url.clone(), e.to_string()))?
        .text()
        .await
        .map_err(|e| TelemetryError::Parse(url.clone(), e.to_string()))?;

    let mut total = 0.0;
    let mut idle = 0.0;
    for line in body.lines() {
        if line.starts_with('#') || !line.starts_with("node_cpu_seconds_total") {
            continue;
        }
        let Some(value_str) = line.rsplit(' ').next() else {
            continue;
        };
        let Ok(value) = value_str.parse::<f64>() else {
            continue;
        };
        total += value;
        if line.contains("mode=\"idle\"") {
            idle += value;
        }
    }

    Ok(CpuUsageSample {
        instance_id: instance_id.to_string(),
        event_time: chrono::Utc::now(),
        total_cpu_seconds: total,
        idle_cpu_seconds: idle,
    })
}

/// Scrapes `http://<instance.host_name>:9100/metrics`.
pub async fn scrape_one(
    client: &reqwest::Client,
    instance: &Instance,
    timeout: Duration,
) -> Result<CpuUsageSample, TelemetryError> {
    let base_url = format!("http://{}:9100", instance.host_name);
    scrape_one_at(client, &instance.instance_id, &base_url, timeout).await
}

/// Scrapes every instance concurrently; a per-instance failure is logged
/// and dropped rather than failing the whole tick.
pub async fn scrape_many(
    client: &reqwest::Client,
    instances: &[Instance],
    timeout: Duration,
) -> Vec<CpuUsageSample> {
    stream::iter(instances)
        .map(|instance| {
            let client = client.clone();
            async move { (instance.instance_id.clone(), scrape_one(&client, instance, timeout).await) }
        })
        .buffer_unordered(MAX_CONCURRENT_SCRAPES)
        .filter_map(|(instance_id, result)| async move {
            match result {
                Ok(sample) => Some(sample),
                Err(err) => {
                    tracing::warn!(instance_id, error = %err, "cpu scrape failed, dropping instance this tick");
                    None
                }
            }
        })
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sums_total_and_idle_cpu_seconds_across_cores() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/metrics")
            .with_status(200)
            .with_body(
                "node_cpu_seconds_total{cpu=\"0\",mode=\"idle\"} 100.0\n\
                 node_cpu_seconds_total{cpu=\"0\",mode=\"user\"} 50.0\n\
                 node_cpu_seconds_total{cpu=\"1\",mode=\"idle\"} 90.0\n\
                 node_memory_MemTotal_bytes 123456\n",
            )
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let sample = scrape_one_at(&client, "i-1", &server.url(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(sample.total_cpu_seconds, 240.0);
        assert_eq!(sample.idle_cpu_seconds, 190.0);
        assert_eq!(sample.busy(), 50.0);
    }

    #[tokio::test]
    async fn scrape_many_drops_unreachable_instances() {
        let instances = vec![Instance {
            instance_id: "i-unreachable".into(),
            host_name: "127.0.0.1".into(), // nothing listens on :9100 here
        }];
        let client = reqwest::Client::new();
        let results = scrape_many(&client, &instances, Duration::from_millis(200)).await;
        assert!(results.is_empty());
    }
}
