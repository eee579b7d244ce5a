//! In-memory `ClusterStore` fake, shared across the workspace's tests so
//! `scalectl-core`/`scalectl-cli` tests never need a running redis.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scalectl_core::model::{Cluster, ClusterLifecycleEvent, CpuUsageSample, MetricSample, ResizeEvent};
use scalectl_core::ports::{ClusterStore, StoreError};

#[derive(Default)]
pub struct FakeStore {
    clusters: Mutex<HashMap<String, Cluster>>,
    metrics: Mutex<HashMap<String, Vec<MetricSample>>>,
    cpu: Mutex<HashMap<String, HashMap<String, Vec<CpuUsageSample>>>>,
    resize_events: Mutex<Vec<ResizeEvent>>,
    lifecycle_events: Mutex<Vec<ClusterLifecycleEvent>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, cluster: Cluster) {
        self.clusters.lock().unwrap().insert(cluster.id.clone(), cluster);
    }
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn active_cluster_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .clusters
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.active)
            .map(|c| c.id.clone())
            .collect())
    }

    async fn all_cluster_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.clusters.lock().unwrap().keys().cloned().collect())
    }

    async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>, StoreError> {
        Ok(self.clusters.lock().unwrap().get(id).cloned())
    }

    async fn save_cluster(&self, cluster: &Cluster) -> Result<(), StoreError> {
        self.clusters
            .lock()
            .unwrap()
            .insert(cluster.id.clone(), cluster.clone());
        Ok(())
    }

    async fn delete_cluster(&self, id: &str) -> Result<(), StoreError> {
        self.clusters.lock().unwrap().remove(id);
        Ok(())
    }

    async fn append_metric_sample(&self, cluster_id: &str, sample: &MetricSample) -> Result<(), StoreError> {
        self.metrics
            .lock()
            .unwrap()
            .entry(cluster_id.to_string())
            .or_default()
            .push(*sample);
        Ok(())
    }

    async fn append_cpu_usage_sample(&self, cluster_id: &str, sample: &CpuUsageSample) -> Result<(), StoreError> {
        self.cpu
            .lock()
            .unwrap()
            .entry(cluster_id.to_string())
            .or_default()
            .entry(sample.instance_id.clone())
            .or_default()
            .push(*sample);
        Ok(())
    }

    async fn metric_samples_since(
        &self,
        cluster_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, StoreError> {
        Ok(self
            .metrics
            .lock()
            .unwrap()
            .get(cluster_id)
            .map(|samples| {
                samples
                    .iter()
                    .copied()
                    .filter(|s| s.event_time.map(|t| t >= since).unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn cpu_samples_since(
        &self,
        cluster_id: &str,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<CpuUsageSample>>, StoreError> {
        Ok(self
            .cpu
            .lock()
            .unwrap()
            .get(cluster_id)
            .map(|by_instance| {
                by_instance
                    .iter()
                    .map(|(id, samples)| {
                        (
                            id.clone(),
                            samples.iter().copied().filter(|s| s.event_time >= since).collect(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_resize_event(&self, event: &ResizeEvent) -> Result<(), StoreError> {
        self.resize_events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn append_lifecycle_event(&self, event: &ClusterLifecycleEvent) -> Result<(), StoreError> {
        self.lifecycle_events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn sweep_retention(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        let cutoff = now - chrono::Duration::days(2);
        let cpu_cutoff = now - chrono::Duration::days(1);
        for samples in self.metrics.lock().unwrap().values_mut() {
            samples.retain(|s| s.event_time.map(|t| t >= cutoff).unwrap_or(true));
        }
        for by_instance in self.cpu.lock().unwrap().values_mut() {
            for samples in by_instance.values_mut() {
                samples.retain(|s| s.event_time >= cpu_cutoff);
            }
        }
        self.resize_events.lock().unwrap().retain(|e| e.event_time >= cutoff);
        self.lifecycle_events.lock().unwrap().retain(|e| e.event_time >= cutoff);
        Ok(())
    }
}
