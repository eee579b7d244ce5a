//! Sliding-window aggregation over `MetricSample`/`CpuUsageSample` rows.
//! Pure over its inputs — the caller is responsible for fetching the window
//! from the store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{AvgMetric, Cluster, CpuUsageSample, MetricSample};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("fewer than 2 metric samples in the lookback window")]
    InsufficientSamples,
}

/// Computes `AvgMetric` from the samples already fetched for the lookback
/// window. `samples` must already be filtered to `event_time > now -
/// lookback`; `cpu_samples` must contain, for every instance with fresh CPU
/// data this tick, every sample for that instance still inside the window
/// (oldest first is not required — we take the min by `event_time`).
pub fn aggregate(
    cluster: &Cluster,
    samples: &[MetricSample],
    cpu_samples: &HashMap<String, Vec<CpuUsageSample>>,
    fresh_cpu: &HashMap<String, CpuUsageSample>,
) -> Result<AvgMetric, AggregateError> {
    let _ = cluster;
    if samples.len() < 2 {
        return Err(AggregateError::InsufficientSamples);
    }

    let n = samples.len() as f64;
    let mut sum = MetricSample::default();
    for s in samples {
        sum.apps_running += s.apps_running;
        sum.apps_pending += s.apps_pending;
        sum.mem_reserved_mb += s.mem_reserved_mb;
        sum.mem_pending_mb += s.mem_pending_mb;
        sum.mem_allocated_mb += s.mem_allocated_mb;
        sum.mem_available_mb += s.mem_available_mb;
        sum.mem_total_mb += s.mem_total_mb;
        sum.vcore_reserved += s.vcore_reserved;
        sum.vcore_pending += s.vcore_pending;
        sum.vcore_allocated += s.vcore_allocated;
        sum.vcore_available += s.vcore_available;
        sum.vcore_total += s.vcore_total;
        sum.active_nodes += s.active_nodes;
    }

    Ok(AvgMetric {
        apps_running: sum.apps_running / n,
        apps_pending: sum.apps_pending / n,
        mem_reserved_mb: sum.mem_reserved_mb / n,
        mem_pending_mb: sum.mem_pending_mb / n,
        mem_allocated_mb: sum.mem_allocated_mb / n,
        mem_available_mb: sum.mem_available_mb / n,
        mem_total_mb: sum.mem_total_mb / n,
        vcore_reserved: sum.vcore_reserved / n,
        vcore_pending: sum.vcore_pending / n,
        vcore_allocated: sum.vcore_allocated / n,
        vcore_available: sum.vcore_available / n,
        vcore_total: sum.vcore_total / n,
        active_nodes: sum.active_nodes / n,
        cpu_utilisation: cpu_utilisation(cpu_samples, fresh_cpu),
    })
}

/// `(new_busy - old_busy) / (new_total - old_total)`, summed over instances
/// present in both the fresh sample set and the window's oldest sample for
/// that instance. `None` when the summed denominator is non-positive.
fn cpu_utilisation(
    window: &HashMap<String, Vec<CpuUsageSample>>,
    fresh: &HashMap<String, CpuUsageSample>,
) -> Option<f64> {
    let mut old_total = 0.0;
    let mut old_busy = 0.0;
    let mut new_total = 0.0;
    let mut new_busy = 0.0;

    for (instance_id, new_sample) in fresh {
        let Some(history) = window.get(instance_id) else {
            continue;
        };
        let Some(oldest) = history.iter().min_by_key(|s| s.event_time) else {
            continue;
        };
        old_total += oldest.total_cpu_seconds;
        old_busy += oldest.busy();
        new_total += new_sample.total_cpu_seconds;
        new_busy += new_sample.busy();
    }

    let denom = new_total - old_total;
    if denom <= 0.0 {
        None
    } else {
        Some((new_busy - old_busy) / denom)
    }
}

/// Narrows a raw sample slice to the trailing `lookback_minutes` window.
pub fn window_since(samples: &[MetricSample], now: DateTime<Utc>, lookback_minutes: i64) -> Vec<MetricSample> {
    let cutoff = now - chrono::Duration::minutes(lookback_minutes);
    samples
        .iter()
        .copied()
        .filter(|s| s.event_time.map(|t| t > cutoff).unwrap_or(false))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewCluster, ResizePolicy};

    fn cluster() -> Cluster {
        let policy = crate::model::ManagedScalingPolicy {
            min_capacity_units: 10,
            max_capacity_units: 100,
            max_core_capacity_units: 20,
            max_on_demand_capacity_units: 0,
            unit_type: crate::model::UnitType::InstanceFleetUnits,
        };
        Cluster::new(
            NewCluster {
                id: "j-1".into(),
                name: "n".into(),
                group: "g".into(),
                cpu_lower: 0.4,
                cpu_upper: 0.6,
                lookback_minutes: 15,
                cooldown_minutes: 5,
                scale_in_factor: 1.0,
                scale_out_factor: 1.0,
                max_capacity_limit: None,
                resize_policy: ResizePolicy::CpuBased,
            },
            policy,
        )
        .unwrap()
    }

    fn sample(t: DateTime<Utc>, mem_pending: f64) -> MetricSample {
        MetricSample {
            event_time: Some(t),
            mem_pending_mb: mem_pending,
            ..Default::default()
        }
    }

    #[test]
    fn fewer_than_two_samples_is_insufficient() {
        let now = Utc::now();
        let samples = vec![sample(now, 10.0)];
        let err = aggregate(&cluster(), &samples, &HashMap::new(), &HashMap::new()).unwrap_err();
        assert_eq!(err, AggregateError::InsufficientSamples);
    }

    #[test]
    fn averages_yarn_fields_arithmetically() {
        let now = Utc::now();
        let samples = vec![sample(now, 10.0), sample(now, 20.0)];
        let avg = aggregate(&cluster(), &samples, &HashMap::new(), &HashMap::new()).unwrap();
        assert_eq!(avg.mem_pending_mb, 15.0);
        assert_eq!(avg.cpu_utilisation, None);
    }

    #[test]
    fn cpu_utilisation_is_none_when_denominator_non_positive() {
        let t0 = Utc::now() - chrono::Duration::minutes(10);
        let t1 = Utc::now();
        let old = CpuUsageSample {
            instance_id: "i-1".into(),
            event_time: t0,
            total_cpu_seconds: 1000.0,
            idle_cpu_seconds: 500.0,
        };
        let new = CpuUsageSample {
            instance_id: "i-1".into(),
            event_time: t1,
            total_cpu_seconds: 1000.0, // no progress
            idle_cpu_seconds: 600.0,
        };
        let mut window = HashMap::new();
        window.insert("i-1".to_string(), vec![old]);
        let mut fresh = HashMap::new();
        fresh.insert("i-1".to_string(), new);

        let samples = vec![sample(t0, 1.0), sample(t1, 1.0)];
        let avg = aggregate(&cluster(), &samples, &window, &fresh).unwrap();
        assert_eq!(avg.cpu_utilisation, None);
    }

    #[test]
    fn cpu_utilisation_sums_busy_and_total_deltas_across_instances() {
        let t0 = Utc::now() - chrono::Duration::minutes(10);
        let t1 = Utc::now();
        let mut window = HashMap::new();
        let mut fresh = HashMap::new();

        // instance 1: total 1000->1100 (+100), idle 500->520 (+20) => busy +80
        window.insert(
            "i-1".to_string(),
            vec![CpuUsageSample {
                instance_id: "i-1".into(),
                event_time: t0,
                total_cpu_seconds: 1000.0,
                idle_cpu_seconds: 500.0,
            }],
        );
        fresh.insert(
            "i-1".to_string(),
            CpuUsageSample {
                instance_id: "i-1".into(),
                event_time: t1,
                total_cpu_seconds: 1100.0,
                idle_cpu_seconds: 520.0,
            },
        );

        // instance 2: total 2000->2100 (+100), idle 1000->1000 (+0) => busy +100
        window.insert(
            "i-2".to_string(),
            vec![CpuUsageSample {
                instance_id: "i-2".into(),
                event_time: t0,
                total_cpu_seconds: 2000.0,
                idle_cpu_seconds: 1000.0,
            }],
        );
        fresh.insert(
            "i-2".to_string(),
            CpuUsageSample {
                instance_id: "i-2".into(),
                event_time: t1,
                total_cpu_seconds: 2100.0,
                idle_cpu_seconds: 1000.0,
            },
        );

        let samples = vec![sample(t0, 1.0), sample(t1, 1.0)];
        let avg = aggregate(&cluster(), &samples, &window, &fresh).unwrap();
        // total delta = 200, busy delta = 180
        assert_eq!(avg.cpu_utilisation, Some(180.0 / 200.0));
    }
}
