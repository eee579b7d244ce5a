//! Typed records for managed clusters, their tunables, and the time-series
//! data the control loop produces. Mirrors the teacher's plain-struct style
//! (`principal::scale::scale::Node`/`Pod` etc.) rather than a cyclic ORM:
//! derived quantities are plain functions over these structs, not dynamic
//! attribute lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which step formula the decision engine applies for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizePolicy {
    CpuBased,
    ResourceBased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitType {
    InstanceFleetUnits,
    Instances,
    Vcpu,
}

/// Cluster service `Status.State`, collapsed to the three values the
/// control loop cares about. Only `Running`/`Waiting` clusters are
/// eligible for a resize tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterState {
    Running,
    Waiting,
    Other,
}

impl Default for ClusterState {
    fn default() -> Self {
        ClusterState::Other
    }
}

/// Provider-side managed scaling policy record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedScalingPolicy {
    pub min_capacity_units: i64,
    pub max_capacity_units: i64,
    pub max_core_capacity_units: i64,
    pub max_on_demand_capacity_units: i64,
    pub unit_type: UnitType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Market {
    Spot,
    OnDemand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceGroupType {
    Master,
    Core,
    Task,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FleetState {
    Running,
    Resizing,
    Provisioning,
    Terminating,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceFleet {
    pub id: String,
    pub fleet_type: InstanceGroupType,
    pub state: FleetState,
    pub target_on_demand_capacity: i64,
    pub target_spot_capacity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub id: String,
    pub group_type: InstanceGroupType,
    pub market: Market,
    pub state: FleetState,
    pub running_instance_count: i64,
    pub instance_type: String,
}

/// A cluster's task capacity is expressed either as fleets or as groups,
/// never both — `UnitType::InstanceFleetUnits` implies `Fleets`, the other
/// two unit types imply `Groups`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstanceShape {
    Fleets(Vec<InstanceFleet>),
    Groups(Vec<InstanceGroup>),
}

impl InstanceShape {
    pub fn is_fleet(&self) -> bool {
        matches!(self, InstanceShape::Fleets(_))
    }

    /// Any TASK fleet/group not in `Running` state blocks further action.
    pub fn is_resizing(&self) -> bool {
        match self {
            InstanceShape::Fleets(fleets) => fleets.iter().any(|f| f.state != FleetState::Running),
            InstanceShape::Groups(groups) => groups.iter().any(|g| g.state != FleetState::Running),
        }
    }

    pub fn task_fleet(&self) -> Option<&InstanceFleet> {
        match self {
            InstanceShape::Fleets(fleets) => {
                fleets.iter().find(|f| f.fleet_type == InstanceGroupType::Task)
            }
            InstanceShape::Groups(_) => None,
        }
    }

    pub fn task_groups(&self) -> Vec<&InstanceGroup> {
        match self {
            InstanceShape::Groups(groups) => groups
                .iter()
                .filter(|g| g.group_type == InstanceGroupType::Task)
                .collect(),
            InstanceShape::Fleets(_) => Vec::new(),
        }
    }
}

/// One managed cluster's configuration and refreshed observed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub group: String,
    pub active: bool,

    pub cpu_lower: f64,
    pub cpu_upper: f64,
    pub lookback_minutes: i64,
    pub cooldown_minutes: i64,
    pub scale_in_factor: f64,
    pub scale_out_factor: f64,
    pub max_capacity_limit: i64,
    pub resize_policy: ResizePolicy,

    pub master_endpoint: Option<String>,
    pub initial_policy: Option<ManagedScalingPolicy>,
    pub current_policy: Option<ManagedScalingPolicy>,
    pub instance_shape: Option<InstanceShape>,
    #[serde(default)]
    pub state: ClusterState,

    pub last_scale_in_ts: DateTime<Utc>,
    pub last_scale_out_ts: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterConfigError {
    #[error("cpu_lower ({0}) must be less than cpu_upper ({1})")]
    InvalidCpuBounds(f64, f64),
    #[error("scale_in_factor must be >= 0, got {0}")]
    NegativeScaleInFactor(f64),
    #[error("scale_out_factor must be >= 0, got {0}")]
    NegativeScaleOutFactor(f64),
}

fn check_cluster_invariants(
    cpu_lower: f64,
    cpu_upper: f64,
    scale_in_factor: f64,
    scale_out_factor: f64,
) -> Result<(), ClusterConfigError> {
    if !(cpu_lower < cpu_upper) {
        return Err(ClusterConfigError::InvalidCpuBounds(cpu_lower, cpu_upper));
    }
    if scale_in_factor < 0.0 {
        return Err(ClusterConfigError::NegativeScaleInFactor(scale_in_factor));
    }
    if scale_out_factor < 0.0 {
        return Err(ClusterConfigError::NegativeScaleOutFactor(scale_out_factor));
    }
    Ok(())
}

/// Partial update applied by the `modify-cluster` CLI command. `None`
/// leaves the corresponding field unchanged.
#[derive(Debug, Default)]
pub struct ClusterModification {
    pub cpu_upper: Option<f64>,
    pub cpu_lower: Option<f64>,
    pub lookback_minutes: Option<i64>,
    pub cooldown_minutes: Option<i64>,
    pub scale_in_factor: Option<f64>,
    pub scale_out_factor: Option<f64>,
    pub max_capacity_limit: Option<i64>,
    pub resize_policy: Option<ResizePolicy>,
}

/// New-cluster parameters, validated before a `Cluster` is constructed.
pub struct NewCluster {
    pub id: String,
    pub name: String,
    pub group: String,
    pub cpu_lower: f64,
    pub cpu_upper: f64,
    pub lookback_minutes: i64,
    pub cooldown_minutes: i64,
    pub scale_in_factor: f64,
    pub scale_out_factor: f64,
    pub max_capacity_limit: Option<i64>,
    pub resize_policy: ResizePolicy,
}

impl Cluster {
    /// Validates and constructs a new cluster record. `max_capacity_limit`
    /// defaults to the fetched policy's `max_capacity_units` when absent;
    /// the policy is stored as both `initial_policy` and `current_policy`.
    pub fn new(params: NewCluster, fetched_policy: ManagedScalingPolicy) -> Result<Self, ClusterConfigError> {
        Self::validate(&params)?;
        let max_capacity_limit = params
            .max_capacity_limit
            .unwrap_or(fetched_policy.max_capacity_units);

        Ok(Cluster {
            id: params.id,
            name: params.name,
            group: params.group,
            active: true,
            cpu_lower: params.cpu_lower,
            cpu_upper: params.cpu_upper,
            lookback_minutes: params.lookback_minutes,
            cooldown_minutes: params.cooldown_minutes,
            scale_in_factor: params.scale_in_factor,
            scale_out_factor: params.scale_out_factor,
            max_capacity_limit,
            resize_policy: params.resize_policy,
            master_endpoint: None,
            initial_policy: Some(fetched_policy.clone()),
            current_policy: Some(fetched_policy),
            instance_shape: None,
            state: ClusterState::Other,
            last_scale_in_ts: DateTime::<Utc>::UNIX_EPOCH,
            last_scale_out_ts: DateTime::<Utc>::UNIX_EPOCH,
        })
    }

    fn validate(params: &NewCluster) -> Result<(), ClusterConfigError> {
        check_cluster_invariants(
            params.cpu_lower,
            params.cpu_upper,
            params.scale_in_factor,
            params.scale_out_factor,
        )
    }

    /// Applies a partial `modify-cluster` update, re-validating the same
    /// invariants `Cluster::new` enforces before committing any field —
    /// a change is all-or-nothing.
    pub fn apply_modification(&mut self, modification: ClusterModification) -> Result<(), ClusterConfigError> {
        let cpu_lower = modification.cpu_lower.unwrap_or(self.cpu_lower);
        let cpu_upper = modification.cpu_upper.unwrap_or(self.cpu_upper);
        let scale_in_factor = modification.scale_in_factor.unwrap_or(self.scale_in_factor);
        let scale_out_factor = modification.scale_out_factor.unwrap_or(self.scale_out_factor);
        check_cluster_invariants(cpu_lower, cpu_upper, scale_in_factor, scale_out_factor)?;

        self.cpu_lower = cpu_lower;
        self.cpu_upper = cpu_upper;
        self.scale_in_factor = scale_in_factor;
        self.scale_out_factor = scale_out_factor;
        if let Some(v) = modification.lookback_minutes {
            self.lookback_minutes = v;
        }
        if let Some(v) = modification.cooldown_minutes {
            self.cooldown_minutes = v;
        }
        if let Some(v) = modification.max_capacity_limit {
            self.max_capacity_limit = v;
        }
        if let Some(v) = modification.resize_policy {
            self.resize_policy = v;
        }
        Ok(())
    }

    /// Restores `current_policy.max_capacity_units` to the frozen initial
    /// value. Used by the `reset` CLI command; `initial_policy` itself is
    /// never touched.
    pub fn reset_to_initial(&mut self) {
        if let (Some(initial), Some(current)) = (&self.initial_policy, &mut self.current_policy) {
            current.max_capacity_units = initial.max_capacity_units;
        }
    }

    pub fn current_max_units(&self) -> i64 {
        self.current_policy.as_ref().map(|p| p.max_capacity_units).unwrap_or(0)
    }

    pub fn current_min_units(&self) -> i64 {
        self.current_policy.as_ref().map(|p| p.min_capacity_units).unwrap_or(0)
    }

    pub fn current_max_core_units(&self) -> i64 {
        self.current_policy
            .as_ref()
            .map(|p| p.max_core_capacity_units)
            .unwrap_or(0)
    }

    pub fn current_max_od_units(&self) -> i64 {
        self.current_policy
            .as_ref()
            .map(|p| p.max_on_demand_capacity_units)
            .unwrap_or(0)
    }

    pub fn is_resizing(&self) -> bool {
        self.instance_shape.as_ref().map(|s| s.is_resizing()).unwrap_or(false)
    }

    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        let last_action = self.last_scale_in_ts.max(self.last_scale_out_ts);
        let elapsed = now.signed_duration_since(last_action);
        elapsed.num_seconds() < self.cooldown_minutes * 60
    }
}

/// A single YARN metrics snapshot, scraped once per tick per cluster.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricSample {
    pub event_time: Option<DateTime<Utc>>,
    pub apps_running: f64,
    pub apps_pending: f64,
    pub mem_reserved_mb: f64,
    pub mem_pending_mb: f64,
    pub mem_allocated_mb: f64,
    pub mem_available_mb: f64,
    pub mem_total_mb: f64,
    pub vcore_reserved: f64,
    pub vcore_pending: f64,
    pub vcore_allocated: f64,
    pub vcore_available: f64,
    pub vcore_total: f64,
    pub active_nodes: f64,
}

/// A single instance's monotonic CPU-seconds counters at one point in time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CpuUsageSample {
    pub instance_id: String,
    pub event_time: DateTime<Utc>,
    pub total_cpu_seconds: f64,
    pub idle_cpu_seconds: f64,
}

impl CpuUsageSample {
    pub fn busy(&self) -> f64 {
        self.total_cpu_seconds - self.idle_cpu_seconds
    }
}

/// Sliding-window means, emitted once per successful tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AvgMetric {
    pub apps_running: f64,
    pub apps_pending: f64,
    pub mem_reserved_mb: f64,
    pub mem_pending_mb: f64,
    pub mem_allocated_mb: f64,
    pub mem_available_mb: f64,
    pub mem_total_mb: f64,
    pub vcore_reserved: f64,
    pub vcore_pending: f64,
    pub vcore_allocated: f64,
    pub vcore_available: f64,
    pub vcore_total: f64,
    pub active_nodes: f64,
    /// `None` when the CPU-sample denominator is zero (indeterminate).
    pub cpu_utilisation: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeAction {
    Nothing,
    ScaleIn,
    ScaleOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeEvent {
    pub cluster_id: String,
    pub event_time: DateTime<Utc>,
    pub action: ResizeAction,
    pub current_max_units: i64,
    pub target_max_units: i64,
    pub is_resizing: bool,
    pub is_cooling_down: bool,
    pub data: serde_json::Value,
}

/// Discovered cluster instance, as returned by the proxy endpoint or the
/// cluster service's paginated instance listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub host_name: String,
}

/// A lifecycle event mirrored from the inbound event bus, persisted
/// verbatim alongside the `ResizeEvent` log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterLifecycleEvent {
    pub detail_type: String,
    pub event_time: DateTime<Utc>,
    pub source: String,
    pub cluster_id: String,
    pub state: String,
    pub message: String,
    pub raw_message: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ManagedScalingPolicy {
        ManagedScalingPolicy {
            min_capacity_units: 10,
            max_capacity_units: 100,
            max_core_capacity_units: 20,
            max_on_demand_capacity_units: 0,
            unit_type: UnitType::InstanceFleetUnits,
        }
    }

    fn new_params() -> NewCluster {
        NewCluster {
            id: "j-ABC".into(),
            name: "test".into(),
            group: "default".into(),
            cpu_lower: 0.4,
            cpu_upper: 0.6,
            lookback_minutes: 15,
            cooldown_minutes: 5,
            scale_in_factor: 1.0,
            scale_out_factor: 1.0,
            max_capacity_limit: None,
            resize_policy: ResizePolicy::CpuBased,
        }
    }

    #[test]
    fn rejects_inverted_cpu_bounds() {
        let mut p = new_params();
        p.cpu_lower = 0.7;
        p.cpu_upper = 0.6;
        assert!(matches!(
            Cluster::new(p, policy()),
            Err(ClusterConfigError::InvalidCpuBounds(_, _))
        ));
    }

    #[test]
    fn defaults_max_capacity_limit_to_fetched_policy() {
        let cluster = Cluster::new(new_params(), policy()).unwrap();
        assert_eq!(cluster.max_capacity_limit, 100);
        assert_eq!(cluster.initial_policy, cluster.current_policy);
    }

    #[test]
    fn reset_restores_initial_max_units_without_mutating_initial() {
        let mut cluster = Cluster::new(new_params(), policy()).unwrap();
        cluster.current_policy.as_mut().unwrap().max_capacity_units = 500;
        cluster.reset_to_initial();
        assert_eq!(cluster.current_max_units(), 100);
        assert_eq!(cluster.initial_policy.as_ref().unwrap().max_capacity_units, 100);
    }

    #[test]
    fn cooldown_is_measured_from_the_later_of_the_two_timestamps() {
        let mut cluster = Cluster::new(new_params(), policy()).unwrap();
        let now = Utc::now();
        cluster.last_scale_out_ts = now - chrono::Duration::seconds(60);
        cluster.cooldown_minutes = 5;
        assert!(cluster.is_cooling_down(now));
        cluster.cooldown_minutes = 1;
        assert!(!cluster.is_cooling_down(now));
    }

    #[test]
    fn modification_rejects_inverted_cpu_bounds_and_leaves_cluster_unchanged() {
        let mut cluster = Cluster::new(new_params(), policy()).unwrap();
        let err = cluster
            .apply_modification(ClusterModification {
                cpu_lower: Some(0.9),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ClusterConfigError::InvalidCpuBounds(_, _)));
        assert_eq!(cluster.cpu_lower, 0.4);
        assert_eq!(cluster.cpu_upper, 0.6);
    }

    #[test]
    fn modification_commits_valid_fields() {
        let mut cluster = Cluster::new(new_params(), policy()).unwrap();
        cluster
            .apply_modification(ClusterModification {
                cpu_lower: Some(0.5),
                cpu_upper: Some(0.8),
                cooldown_minutes: Some(10),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cluster.cpu_lower, 0.5);
        assert_eq!(cluster.cpu_upper, 0.8);
        assert_eq!(cluster.cooldown_minutes, 10);
    }
}
