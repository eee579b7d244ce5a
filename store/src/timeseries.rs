//! Append-only time-series log: sorted sets scored by `event_time`, queried
//! with `ZRANGEBYSCORE` and trimmed with `ZREMRANGEBYSCORE`. Retention
//! bounds are spec.md's: two days for `MetricSample`/`ResizeEvent`/
//! `ClusterLifecycleEvent`, one day for `CpuUsageSample`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use scalectl_core::model::{ClusterLifecycleEvent, CpuUsageSample, MetricSample, ResizeEvent};
use scalectl_core::ports::StoreError;

const METRIC_RETENTION_DAYS: i64 = 2;
const CPU_RETENTION_DAYS: i64 = 1;
const EVENT_RETENTION_DAYS: i64 = 2;

fn metrics_key(cluster_id: &str) -> String {
    format!("scalectl:metrics:{cluster_id}")
}

fn cpu_key(cluster_id: &str, instance_id: &str) -> String {
    format!("scalectl:cpu:{cluster_id}:{instance_id}")
}

fn cpu_instances_key(cluster_id: &str) -> String {
    format!("scalectl:cpu:instances:{cluster_id}")
}

fn resize_events_key(cluster_id: &str) -> String {
    format!("scalectl:events:resize:{cluster_id}")
}

fn lifecycle_events_key(cluster_id: &str) -> String {
    format!("scalectl:events:lifecycle:{cluster_id}")
}

const TRACKED_CLUSTERS_KEY: &str = "scalectl:clusters:with_timeseries";

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

fn score_of(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 1000.0
}

pub async fn append_metric_sample(
    conn: &mut ConnectionManager,
    cluster_id: &str,
    sample: &MetricSample,
) -> Result<(), StoreError> {
    let score = score_of(sample.event_time.unwrap_or_else(Utc::now));
    let json = serde_json::to_string(sample).map_err(db_err)?;
    conn.zadd(metrics_key(cluster_id), json, score).await.map_err(db_err)?;
    conn.sadd(TRACKED_CLUSTERS_KEY, cluster_id).await.map_err(db_err)?;
    Ok(())
}

pub async fn append_cpu_usage_sample(
    conn: &mut ConnectionManager,
    cluster_id: &str,
    sample: &CpuUsageSample,
) -> Result<(), StoreError> {
    let score = score_of(sample.event_time);
    let json = serde_json::to_string(sample).map_err(db_err)?;
    conn.zadd(cpu_key(cluster_id, &sample.instance_id), json, score)
        .await
        .map_err(db_err)?;
    conn.sadd(cpu_instances_key(cluster_id), &sample.instance_id)
        .await
        .map_err(db_err)?;
    conn.sadd(TRACKED_CLUSTERS_KEY, cluster_id).await.map_err(db_err)?;
    Ok(())
}

pub async fn metric_samples_since(
    conn: &mut ConnectionManager,
    cluster_id: &str,
    since: DateTime<Utc>,
) -> Result<Vec<MetricSample>, StoreError> {
    let raw: Vec<String> = conn
        .zrangebyscore(metrics_key(cluster_id), score_of(since), "+inf")
        .await
        .map_err(db_err)?;
    raw.iter()
        .map(|s| serde_json::from_str(s).map_err(db_err))
        .collect()
}

pub async fn cpu_samples_since(
    conn: &mut ConnectionManager,
    cluster_id: &str,
    since: DateTime<Utc>,
) -> Result<HashMap<String, Vec<CpuUsageSample>>, StoreError> {
    let instance_ids: Vec<String> = conn
        .smembers(cpu_instances_key(cluster_id))
        .await
        .map_err(db_err)?;

    let mut out = HashMap::new();
    for instance_id in instance_ids {
        let raw: Vec<String> = conn
            .zrangebyscore(cpu_key(cluster_id, &instance_id), score_of(since), "+inf")
            .await
            .map_err(db_err)?;
        let samples: Vec<CpuUsageSample> = raw
            .iter()
            .map(|s| serde_json::from_str(s).map_err(db_err))
            .collect::<Result<_, _>>()?;
        if !samples.is_empty() {
            out.insert(instance_id, samples);
        }
    }
    Ok(out)
}

pub async fn append_resize_event(conn: &mut ConnectionManager, event: &ResizeEvent) -> Result<(), StoreError> {
    let score = score_of(event.event_time);
    let json = serde_json::to_string(event).map_err(db_err)?;
    conn.zadd(resize_events_key(&event.cluster_id), json, score)
        .await
        .map_err(db_err)?;
    conn.sadd(TRACKED_CLUSTERS_KEY, &event.cluster_id).await.map_err(db_err)?;
    Ok(())
}

pub async fn append_lifecycle_event(
    conn: &mut ConnectionManager,
    event: &ClusterLifecycleEvent,
) -> Result<(), StoreError> {
    let score = score_of(event.event_time);
    let json = serde_json::to_string(event).map_err(db_err)?;
    conn.zadd(lifecycle_events_key(&event.cluster_id), json, score)
        .await
        .map_err(db_err)?;
    conn.sadd(TRACKED_CLUSTERS_KEY, &event.cluster_id).await.map_err(db_err)?;
    Ok(())
}

/// Trims every tracked cluster's sorted sets to their retention bound. Runs
/// once at the start of every outer tick.
pub async fn sweep_retention(conn: &mut ConnectionManager, now: DateTime<Utc>) -> Result<(), StoreError> {
    let cluster_ids: Vec<String> = conn.smembers(TRACKED_CLUSTERS_KEY).await.map_err(db_err)?;
    let metric_cutoff = score_of(now - chrono::Duration::days(METRIC_RETENTION_DAYS));
    let cpu_cutoff = score_of(now - chrono::Duration::days(CPU_RETENTION_DAYS));
    let event_cutoff = score_of(now - chrono::Duration::days(EVENT_RETENTION_DAYS));

    for cluster_id in cluster_ids {
        conn.zrembyscore::<_, f64, f64, ()>(metrics_key(&cluster_id), f64::NEG_INFINITY, metric_cutoff)
            .await
            .map_err(db_err)?;
        conn.zrembyscore::<_, f64, f64, ()>(resize_events_key(&cluster_id), f64::NEG_INFINITY, event_cutoff)
            .await
            .map_err(db_err)?;
        conn.zrembyscore::<_, f64, f64, ()>(lifecycle_events_key(&cluster_id), f64::NEG_INFINITY, event_cutoff)
            .await
            .map_err(db_err)?;

        let instance_ids: Vec<String> = conn
            .smembers(cpu_instances_key(&cluster_id))
            .await
            .map_err(db_err)?;
        for instance_id in instance_ids {
            conn.zrembyscore::<_, f64, f64, ()>(cpu_key(&cluster_id, &instance_id), f64::NEG_INFINITY, cpu_cutoff)
                .await
                .map_err(db_err)?;
        }
    }
    Ok(())
}
