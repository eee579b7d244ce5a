//! Translates a decided target into a policy push plus, on scale-in, a
//! TASK fleet/group capacity reduction — preferring to remove spot before
//! on-demand. Gating (`is_resizing`, cool-down) is checked against state
//! refreshed earlier in the same tick.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::model::{Cluster, InstanceGroupType, InstanceShape, Market, ResizeAction, ResizeEvent, UnitType};
use crate::ports::{ClusterServiceClient, ProviderError, VcpuCatalog};

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("cluster has no instance_shape to resize")]
    MissingInstanceShape,
    #[error("cluster has no TASK fleet to resize")]
    MissingTaskFleet,
}

/// Runs gating, dispatches scale-in/scale-out/nothing, and returns the
/// `ResizeEvent` to append. Mutates `cluster`'s control state
/// (`last_scale_in_ts`/`last_scale_out_ts`, `current_policy`,
/// `instance_shape`) in place — the caller persists the cluster afterward.
pub async fn execute(
    provider: &dyn ClusterServiceClient,
    vcpu_catalog: &dyn VcpuCatalog,
    cluster: &mut Cluster,
    target: i64,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<ResizeEvent, ExecuteError> {
    let current = cluster.current_max_units();
    let is_resizing = cluster.is_resizing();
    let is_cooling_down = cluster.is_cooling_down(now);

    if is_resizing || is_cooling_down {
        if dry_run {
            tracing::info!(
                cluster_id = %cluster.id,
                is_resizing,
                is_cooling_down,
                "dry-run: gating would block action"
            );
        }
        return Ok(ResizeEvent {
            cluster_id: cluster.id.clone(),
            event_time: now,
            action: ResizeAction::Nothing,
            current_max_units: current,
            target_max_units: target,
            is_resizing,
            is_cooling_down,
            data: json!({}),
        });
    }

    let (action, data) = match target.cmp(&current) {
        std::cmp::Ordering::Less => {
            let data = scale_in(provider, vcpu_catalog, cluster, target, dry_run, now).await?;
            (ResizeAction::ScaleIn, data)
        }
        std::cmp::Ordering::Greater => {
            let data = scale_out(provider, cluster, target, dry_run, now).await?;
            (ResizeAction::ScaleOut, data)
        }
        std::cmp::Ordering::Equal => (ResizeAction::Nothing, json!({})),
    };

    Ok(ResizeEvent {
        cluster_id: cluster.id.clone(),
        event_time: now,
        action,
        current_max_units: current,
        target_max_units: target,
        is_resizing: false,
        is_cooling_down: false,
        data,
    })
}

fn push_max_units(cluster: &mut Cluster, target: i64) {
    if let Some(policy) = cluster.current_policy.as_mut() {
        policy.max_capacity_units = target;
    }
}

async fn scale_out(
    provider: &dyn ClusterServiceClient,
    cluster: &mut Cluster,
    target: i64,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<serde_json::Value, ExecuteError> {
    push_max_units(cluster, target);
    if !dry_run {
        let policy = cluster.current_policy.clone().expect("current_policy set before scale_out");
        provider.put_policy(&cluster.id, &policy).await?;
    } else {
        tracing::info!(cluster_id = %cluster.id, target, "dry-run: would push new MaximumCapacityUnits");
    }
    cluster.last_scale_out_ts = now;
    Ok(json!({ "new_max_units": target }))
}

async fn scale_in(
    provider: &dyn ClusterServiceClient,
    vcpu_catalog: &dyn VcpuCatalog,
    cluster: &mut Cluster,
    target: i64,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<serde_json::Value, ExecuteError> {
    push_max_units(cluster, target);
    if !dry_run {
        let policy = cluster.current_policy.clone().expect("current_policy set before scale_in");
        provider.put_policy(&cluster.id, &policy).await?;
    } else {
        tracing::info!(cluster_id = %cluster.id, target, "dry-run: would push new MaximumCapacityUnits");
    }

    let delta = cluster.current_max_units() - target;
    let unit_type = cluster
        .current_policy
        .as_ref()
        .map(|p| p.unit_type)
        .unwrap_or(UnitType::InstanceFleetUnits);

    let data = match cluster.instance_shape.as_mut() {
        Some(InstanceShape::Fleets(fleets)) => {
            let fleet = fleets
                .iter_mut()
                .find(|f| f.fleet_type == InstanceGroupType::Task)
                .ok_or(ExecuteError::MissingTaskFleet)?;

            let old_spot = fleet.target_spot_capacity;
            let old_od = fleet.target_on_demand_capacity;
            let mut delta_remaining = delta;
            let mut new_spot = old_spot;
            let mut new_od = old_od;
            if new_spot >= delta_remaining {
                new_spot -= delta_remaining;
            } else {
                delta_remaining -= new_spot;
                new_spot = 0;
                new_od = (new_od - delta_remaining).max(0);
            }

            if !dry_run {
                provider
                    .modify_fleet(&cluster.id, &fleet.id, new_od, new_spot)
                    .await?;
            } else {
                tracing::info!(
                    cluster_id = %cluster.id, fleet_id = %fleet.id, new_od, new_spot,
                    "dry-run: would modify TASK fleet spot/on-demand targets"
                );
            }

            fleet.target_on_demand_capacity = new_od;
            fleet.target_spot_capacity = new_spot;

            json!({
                "fleet_id": fleet.id,
                "old_on_demand": old_od,
                "old_spot": old_spot,
                "new_on_demand": new_od,
                "new_spot": new_spot,
            })
        }
        Some(InstanceShape::Groups(groups)) => {
            let mut task_indices: Vec<usize> = groups
                .iter()
                .enumerate()
                .filter(|(_, g)| g.group_type == InstanceGroupType::Task)
                .map(|(i, _)| i)
                .collect();
            task_indices.sort_by_key(|&i| match groups[i].market {
                Market::Spot => 0,
                Market::OnDemand => 1,
            });

            let mut delta_remaining = delta;
            let mut changes: Vec<(String, i64)> = Vec::new();

            for idx in task_indices {
                if delta_remaining <= 0 {
                    break;
                }
                let group = &groups[idx];
                let per_instance_units = match unit_type {
                    UnitType::Instances => 1,
                    UnitType::Vcpu => vcpu_catalog.vcpu(&group.instance_type).unwrap_or(1),
                    UnitType::InstanceFleetUnits => 1,
                };
                let contribution = group.running_instance_count * per_instance_units;

                let new_count = if contribution <= delta_remaining {
                    delta_remaining -= contribution;
                    0
                } else {
                    let instances_taken = (delta_remaining + per_instance_units - 1) / per_instance_units;
                    delta_remaining = 0;
                    (group.running_instance_count - instances_taken).max(0)
                };

                changes.push((group.id.clone(), new_count));
            }

            for (id, new_count) in &changes {
                if let Some(group) = groups.iter_mut().find(|g| &g.id == id) {
                    group.running_instance_count = *new_count;
                }
            }

            if !dry_run {
                provider.modify_groups(&cluster.id, &changes).await?;
            } else {
                tracing::info!(cluster_id = %cluster.id, ?changes, "dry-run: would modify TASK instance groups");
            }

            json!({ "group_changes": changes })
        }
        None => return Err(ExecuteError::MissingInstanceShape),
    };

    cluster.last_scale_in_ts = now;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ClusterState, FleetState, InstanceFleet, InstanceGroup, ManagedScalingPolicy, NewCluster,
        ResizePolicy,
    };
    use crate::ports::ClusterDescription;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProvider {
        put_policy_calls: Mutex<Vec<ManagedScalingPolicy>>,
        modify_fleet_calls: Mutex<Vec<(String, i64, i64)>>,
        modify_groups_calls: Mutex<Vec<Vec<(String, i64)>>>,
    }

    #[async_trait]
    impl ClusterServiceClient for FakeProvider {
        async fn describe_cluster(&self, _cluster_id: &str) -> Result<ClusterDescription, ProviderError> {
            Ok(ClusterDescription {
                state: ClusterState::Running,
                name: "test".into(),
                master_public_dns: None,
            })
        }
        async fn get_policy(&self, _cluster_id: &str) -> Result<ManagedScalingPolicy, ProviderError> {
            unimplemented!()
        }
        async fn put_policy(&self, _cluster_id: &str, policy: &ManagedScalingPolicy) -> Result<(), ProviderError> {
            self.put_policy_calls.lock().unwrap().push(policy.clone());
            Ok(())
        }
        async fn list_fleets(&self, _cluster_id: &str) -> Result<Vec<InstanceFleet>, ProviderError> {
            Ok(vec![])
        }
        async fn list_groups(&self, _cluster_id: &str) -> Result<Vec<InstanceGroup>, ProviderError> {
            Ok(vec![])
        }
        async fn list_instances(&self, _cluster_id: &str) -> Result<Vec<crate::model::Instance>, ProviderError> {
            Ok(vec![])
        }
        async fn modify_fleet(
            &self,
            _cluster_id: &str,
            fleet_id: &str,
            target_on_demand: i64,
            target_spot: i64,
        ) -> Result<(), ProviderError> {
            self.modify_fleet_calls
                .lock()
                .unwrap()
                .push((fleet_id.to_string(), target_on_demand, target_spot));
            Ok(())
        }
        async fn modify_groups(&self, _cluster_id: &str, changes: &[(String, i64)]) -> Result<(), ProviderError> {
            self.modify_groups_calls.lock().unwrap().push(changes.to_vec());
            Ok(())
        }
        async fn describe_instance_types(&self, _types: &[String]) -> Result<HashMap<String, i64>, ProviderError> {
            Ok(HashMap::new())
        }
        async fn add_job_flow_steps(&self, _cluster_id: &str, _steps: serde_json::Value) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    struct FakeCatalog(HashMap<String, i64>);
    impl VcpuCatalog for FakeCatalog {
        fn vcpu(&self, instance_type: &str) -> Option<i64> {
            self.0.get(instance_type).copied()
        }
    }

    fn base_cluster(max_units: i64, unit_type: UnitType) -> Cluster {
        let policy = ManagedScalingPolicy {
            min_capacity_units: 10,
            max_capacity_units: max_units,
            max_core_capacity_units: 20,
            max_on_demand_capacity_units: 0,
            unit_type,
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
                max_capacity_limit: Some(1000),
                resize_policy: ResizePolicy::CpuBased,
            },
            policy,
        )
        .unwrap()
    }

    /// Scenario 2: fleet scale-in, spot-before-on-demand.
    #[tokio::test]
    async fn fleet_scale_in_prefers_spot_then_on_demand() {
        let mut cluster = base_cluster(200, UnitType::InstanceFleetUnits);
        cluster.instance_shape = Some(InstanceShape::Fleets(vec![InstanceFleet {
            id: "tf-1".into(),
            fleet_type: InstanceGroupType::Task,
            state: FleetState::Running,
            target_on_demand_capacity: 10,
            target_spot_capacity: 60,
        }]));

        let provider = FakeProvider::default();
        let catalog = FakeCatalog(HashMap::new());
        let now = Utc::now();
        let event = execute(&provider, &catalog, &mut cluster, 33, false, now).await.unwrap();

        assert_eq!(event.action, ResizeAction::ScaleIn);
        assert_eq!(cluster.current_max_units(), 33);
        let calls = provider.modify_fleet_calls.lock().unwrap();
        assert_eq!(calls[0], ("tf-1".to_string(), 0, 0));
        assert_eq!(cluster.last_scale_in_ts, now);
        assert_eq!(event.data["old_on_demand"], 10);
        assert_eq!(event.data["old_spot"], 60);
        assert_eq!(event.data["new_on_demand"], 0);
        assert_eq!(event.data["new_spot"], 0);
    }

    /// Scenario 3: VCPU group shape, spot-first reduction across groups.
    #[tokio::test]
    async fn vcpu_group_scale_in_sorts_spot_first() {
        let mut cluster = base_cluster(40, UnitType::Vcpu);
        cluster.instance_shape = Some(InstanceShape::Groups(vec![
            InstanceGroup {
                id: "g1".into(),
                group_type: InstanceGroupType::Task,
                market: Market::Spot,
                state: FleetState::Running,
                running_instance_count: 4,
                instance_type: "t.small".into(),
            },
            InstanceGroup {
                id: "g2".into(),
                group_type: InstanceGroupType::Task,
                market: Market::OnDemand,
                state: FleetState::Running,
                running_instance_count: 2,
                instance_type: "t.medium".into(),
            },
        ]));

        let provider = FakeProvider::default();
        let mut vcpu = HashMap::new();
        vcpu.insert("t.small".to_string(), 2);
        vcpu.insert("t.medium".to_string(), 4);
        let catalog = FakeCatalog(vcpu);

        let now = Utc::now();
        let event = execute(&provider, &catalog, &mut cluster, 20, false, now).await.unwrap();

        assert_eq!(event.action, ResizeAction::ScaleIn);
        let calls = provider.modify_groups_calls.lock().unwrap();
        assert_eq!(calls[0], vec![("g1".to_string(), 0), ("g2".to_string(), 0)]);
    }

    /// Invariant 3: cool-down blocks action regardless of target.
    #[tokio::test]
    async fn cooldown_blocks_action() {
        let mut cluster = base_cluster(100, UnitType::InstanceFleetUnits);
        cluster.instance_shape = Some(InstanceShape::Fleets(vec![InstanceFleet {
            id: "tf-1".into(),
            fleet_type: InstanceGroupType::Task,
            state: FleetState::Running,
            target_on_demand_capacity: 10,
            target_spot_capacity: 60,
        }]));
        let now = Utc::now();
        cluster.last_scale_out_ts = now - chrono::Duration::seconds(60);
        cluster.cooldown_minutes = 5;

        let provider = FakeProvider::default();
        let catalog = FakeCatalog(HashMap::new());
        let event = execute(&provider, &catalog, &mut cluster, 150, false, now).await.unwrap();

        assert_eq!(event.action, ResizeAction::Nothing);
        assert!(event.is_cooling_down);
        assert!(provider.put_policy_calls.lock().unwrap().is_empty());
        assert_eq!(cluster.current_max_units(), 100);
    }

    /// Invariant 3: an in-flight resize blocks action even outside cooldown.
    #[tokio::test]
    async fn is_resizing_blocks_action() {
        let mut cluster = base_cluster(100, UnitType::InstanceFleetUnits);
        cluster.instance_shape = Some(InstanceShape::Fleets(vec![InstanceFleet {
            id: "tf-1".into(),
            fleet_type: InstanceGroupType::Task,
            state: FleetState::Resizing,
            target_on_demand_capacity: 10,
            target_spot_capacity: 60,
        }]));

        let provider = FakeProvider::default();
        let catalog = FakeCatalog(HashMap::new());
        let now = Utc::now();
        let event = execute(&provider, &catalog, &mut cluster, 150, false, now).await.unwrap();

        assert_eq!(event.action, ResizeAction::Nothing);
        assert!(event.is_resizing);
        assert!(provider.put_policy_calls.lock().unwrap().is_empty());
    }

    /// Dry-run records the event and stamps control state, but issues no
    /// provider mutation.
    #[tokio::test]
    async fn dry_run_issues_no_provider_calls_but_still_stamps_state() {
        let mut cluster = base_cluster(100, UnitType::InstanceFleetUnits);
        cluster.instance_shape = Some(InstanceShape::Fleets(vec![InstanceFleet {
            id: "tf-1".into(),
            fleet_type: InstanceGroupType::Task,
            state: FleetState::Running,
            target_on_demand_capacity: 10,
            target_spot_capacity: 60,
        }]));

        let provider = FakeProvider::default();
        let catalog = FakeCatalog(HashMap::new());
        let now = Utc::now();
        let event = execute(&provider, &catalog, &mut cluster, 150, true, now).await.unwrap();

        assert_eq!(event.action, ResizeAction::ScaleOut);
        assert!(provider.put_policy_calls.lock().unwrap().is_empty());
        assert_eq!(cluster.last_scale_out_ts, now);
        assert_eq!(cluster.current_max_units(), 150);
    }
}
