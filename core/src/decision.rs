//! Computes the target `MaximumCapacityUnits` for a cluster from its policy
//! inputs and the current window's averages. Pure — no I/O, no clock reads —
//! so it is exercised directly by the scenario tests in spec.md §8.

use crate::model::{AvgMetric, Cluster, ResizePolicy};

/// Raw (unrounded) step for the CPU_BASED policy.
fn cpu_based_step(cluster: &Cluster, avg: &AvgMetric) -> f64 {
    let Some(util) = avg.cpu_utilisation else {
        return 0.0;
    };
    let current = cluster.current_max_units() as f64;
    if util < cluster.cpu_lower {
        -(1.0 - util / cluster.cpu_upper) * current
    } else if util > cluster.cpu_upper {
        (util / cluster.cpu_upper - 1.0) * current
    } else {
        0.0
    }
}

/// Raw (unrounded) step for the RESOURCE_BASED policy.
fn resource_based_step(cluster: &Cluster, avg: &AvgMetric) -> f64 {
    let current = cluster.current_max_units() as f64;
    let pending_vcore = avg.vcore_pending;
    let pending_mem = avg.mem_pending_mb;

    if pending_vcore > 0.0 || pending_mem > 0.0 {
        let vcore_ratio = if avg.vcore_total > 0.0 {
            pending_vcore / avg.vcore_total
        } else {
            0.0
        };
        let mem_ratio = if avg.mem_total_mb > 0.0 {
            pending_mem / avg.mem_total_mb
        } else {
            0.0
        };
        vcore_ratio.max(mem_ratio).max(0.0) * current
    } else {
        let mem_free_ratio = if avg.mem_total_mb > 0.0 {
            -(1.0 - (avg.mem_allocated_mb + avg.mem_reserved_mb) / avg.mem_total_mb)
        } else {
            0.0
        };
        let vcore_free_ratio = if avg.vcore_total > 0.0 {
            -(1.0 - (avg.vcore_allocated + avg.vcore_reserved) / avg.vcore_total)
        } else {
            0.0
        };
        (mem_free_ratio.max(vcore_free_ratio) * current).min(0.0)
    }
}

fn apply_factor(step: f64, cluster: &Cluster) -> i64 {
    if step > 0.0 {
        (step * cluster.scale_out_factor).ceil() as i64
    } else if step < 0.0 {
        (step * cluster.scale_in_factor).floor() as i64
    } else {
        0
    }
}

/// Computes the target `MaximumCapacityUnits`, applying the five-stage
/// clamp chain from spec.md §4.5 in order. Returns the target even when it
/// equals `current_max_units` — whether to act is the executor's call.
pub fn decide(cluster: &Cluster, avg: &AvgMetric) -> i64 {
    let raw_step = match cluster.resize_policy {
        ResizePolicy::CpuBased => cpu_based_step(cluster, avg),
        ResizePolicy::ResourceBased => resource_based_step(cluster, avg),
    };
    let step = apply_factor(raw_step, cluster);

    let mut target = cluster.current_max_units() + step;
    target = target.min(cluster.max_capacity_limit);
    target = target.max(cluster.current_min_units() + 1);
    target = target.max(cluster.current_max_core_units());
    target = target.max(cluster.current_max_od_units());
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ManagedScalingPolicy, NewCluster, UnitType};

    fn base_cluster(resize_policy: ResizePolicy) -> Cluster {
        let policy = ManagedScalingPolicy {
            min_capacity_units: 10,
            max_capacity_units: 100,
            max_core_capacity_units: 20,
            max_on_demand_capacity_units: 0,
            unit_type: UnitType::InstanceFleetUnits,
        };
        let mut cluster = Cluster::new(
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
                max_capacity_limit: Some(1000),
                resize_policy,
            },
            policy,
        )
        .unwrap();
        cluster.current_policy.as_mut().unwrap().min_capacity_units = 10;
        cluster.current_policy.as_mut().unwrap().max_core_capacity_units = 20;
        cluster.current_policy.as_mut().unwrap().max_on_demand_capacity_units = 0;
        cluster
    }

    fn avg_with_cpu(util: f64) -> AvgMetric {
        AvgMetric {
            apps_running: 0.0,
            apps_pending: 0.0,
            mem_reserved_mb: 0.0,
            mem_pending_mb: 0.0,
            mem_allocated_mb: 0.0,
            mem_available_mb: 0.0,
            mem_total_mb: 0.0,
            vcore_reserved: 0.0,
            vcore_pending: 0.0,
            vcore_allocated: 0.0,
            vcore_available: 0.0,
            vcore_total: 0.0,
            active_nodes: 0.0,
            cpu_utilisation: Some(util),
        }
    }

    /// Scenario 1: CPU overload, factor 1, CPU_BASED.
    #[test]
    fn scenario_cpu_overload_scale_out() {
        let mut cluster = base_cluster(ResizePolicy::CpuBased);
        cluster.current_policy.as_mut().unwrap().max_capacity_units = 100;
        let avg = avg_with_cpu(0.9);
        assert_eq!(decide(&cluster, &avg), 150);
    }

    /// Scenario 2: CPU under-load, fleet scale-in target computation.
    #[test]
    fn scenario_cpu_underload_scale_in_target() {
        let mut cluster = base_cluster(ResizePolicy::CpuBased);
        cluster.current_policy.as_mut().unwrap().max_capacity_units = 200;
        let avg = avg_with_cpu(0.1);
        assert_eq!(decide(&cluster, &avg), 33);
    }

    /// Scenario 6: resource-based, pending work.
    #[test]
    fn scenario_resource_based_pending_scale_out() {
        let mut cluster = base_cluster(ResizePolicy::ResourceBased);
        cluster.current_policy.as_mut().unwrap().max_capacity_units = 50;
        cluster.scale_out_factor = 2.0;
        let mut avg = avg_with_cpu(0.0);
        avg.cpu_utilisation = None;
        avg.vcore_pending = 30.0;
        avg.vcore_total = 100.0;
        avg.mem_pending_mb = 0.0;
        assert_eq!(decide(&cluster, &avg), 80);
    }

    /// Invariant 6: step = 0 exactly when cpu_lower <= util <= cpu_upper.
    #[test]
    fn step_is_zero_inside_the_band() {
        let cluster = base_cluster(ResizePolicy::CpuBased);
        for util in [0.4, 0.5, 0.6] {
            let avg = avg_with_cpu(util);
            assert_eq!(decide(&cluster, &avg), cluster.current_max_units());
        }
    }

    /// Invariant 1: target is always within the clamp bounds.
    #[test]
    fn target_is_always_within_clamp_bounds() {
        let cluster = base_cluster(ResizePolicy::CpuBased);
        for util in [0.0, 0.1, 0.39, 0.61, 0.9, 1.0] {
            let avg = avg_with_cpu(util);
            let target = decide(&cluster, &avg);
            let floor = (cluster.current_min_units() + 1)
                .max(cluster.current_max_core_units())
                .max(cluster.current_max_od_units());
            assert!(target >= floor, "target {target} below floor {floor} for util {util}");
            assert!(target <= cluster.max_capacity_limit);
        }
    }

    #[test]
    fn indeterminate_cpu_utilisation_yields_zero_step() {
        let cluster = base_cluster(ResizePolicy::CpuBased);
        let mut avg = avg_with_cpu(0.9);
        avg.cpu_utilisation = None;
        assert_eq!(decide(&cluster, &avg), cluster.current_max_units());
    }
}
