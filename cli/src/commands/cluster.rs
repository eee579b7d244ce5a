//! `add-cluster` / `modify-cluster` / `list-clusters` / `describe-cluster` /
//! `delete-cluster` / `enable-cluster` / `disable-cluster` / `reset`.

use clap::{Args, ValueEnum};
use scalectl_core::model::{Cluster, ClusterModification, NewCluster, ResizePolicy};
use scalectl_core::ports::{ClusterServiceClient, ClusterStore};

use super::CliError;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ResizePolicyArg {
    CpuBased,
    ResourceBased,
}

impl From<ResizePolicyArg> for ResizePolicy {
    fn from(value: ResizePolicyArg) -> Self {
        match value {
            ResizePolicyArg::CpuBased => ResizePolicy::CpuBased,
            ResizePolicyArg::ResourceBased => ResizePolicy::ResourceBased,
        }
    }
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(long)]
    pub cluster_id: String,
    #[arg(long)]
    pub cluster_name: Option<String>,
    #[arg(long)]
    pub cluster_group: Option<String>,
    #[arg(long, default_value_t = 0.6)]
    pub cpu_usage_upper_bound: f64,
    #[arg(long, default_value_t = 0.4)]
    pub cpu_usage_lower_bound: f64,
    #[arg(long, default_value_t = 15)]
    pub metrics_lookback_period_minutes: i64,
    #[arg(long, default_value_t = 5)]
    pub cool_down_period_minutes: i64,
    #[arg(long, default_value_t = 1.0)]
    pub scale_in_factor: f64,
    #[arg(long, default_value_t = 1.0)]
    pub scale_out_factor: f64,
    #[arg(long)]
    pub max_capacity_limit: Option<i64>,
    #[arg(long, value_enum, default_value = "cpu-based")]
    pub resize_policy: ResizePolicyArg,
}

pub async fn add(
    store: &dyn ClusterStore,
    provider: &dyn ClusterServiceClient,
    args: AddArgs,
) -> Result<(), CliError> {
    let fetched_policy = provider.get_policy(&args.cluster_id).await?;
    let cluster = Cluster::new(
        NewCluster {
            id: args.cluster_id.clone(),
            name: args.cluster_name.unwrap_or_else(|| args.cluster_id.clone()),
            group: args.cluster_group.unwrap_or_default(),
            cpu_lower: args.cpu_usage_lower_bound,
            cpu_upper: args.cpu_usage_upper_bound,
            lookback_minutes: args.metrics_lookback_period_minutes,
            cooldown_minutes: args.cool_down_period_minutes,
            scale_in_factor: args.scale_in_factor,
            scale_out_factor: args.scale_out_factor,
            max_capacity_limit: args.max_capacity_limit,
            resize_policy: args.resize_policy.into(),
        },
        fetched_policy,
    )?;
    store.save_cluster(&cluster).await?;
    println!("Added cluster {}", args.cluster_id);
    Ok(())
}

#[derive(Debug, Args)]
pub struct ModifyArgs {
    #[arg(long)]
    pub cluster_id: String,
    #[arg(long)]
    pub cpu_usage_upper_bound: Option<f64>,
    #[arg(long)]
    pub cpu_usage_lower_bound: Option<f64>,
    #[arg(long)]
    pub metrics_lookback_period_minutes: Option<i64>,
    #[arg(long)]
    pub cool_down_period_minutes: Option<i64>,
    #[arg(long)]
    pub scale_in_factor: Option<f64>,
    #[arg(long)]
    pub scale_out_factor: Option<f64>,
    #[arg(long)]
    pub max_capacity_limit: Option<i64>,
    #[arg(long, value_enum)]
    pub resize_policy: Option<ResizePolicyArg>,
}

pub async fn modify(store: &dyn ClusterStore, args: ModifyArgs) -> Result<(), CliError> {
    let mut cluster = store
        .get_cluster(&args.cluster_id)
        .await?
        .ok_or_else(|| CliError::ClusterNotFound(args.cluster_id.clone()))?;

    cluster.apply_modification(ClusterModification {
        cpu_upper: args.cpu_usage_upper_bound,
        cpu_lower: args.cpu_usage_lower_bound,
        lookback_minutes: args.metrics_lookback_period_minutes,
        cooldown_minutes: args.cool_down_period_minutes,
        scale_in_factor: args.scale_in_factor,
        scale_out_factor: args.scale_out_factor,
        max_capacity_limit: args.max_capacity_limit,
        resize_policy: args.resize_policy.map(Into::into),
    })?;

    store.save_cluster(&cluster).await?;
    println!("Modified cluster {}", args.cluster_id);
    Ok(())
}

pub async fn list(store: &dyn ClusterStore) -> Result<(), CliError> {
    let ids = store.all_cluster_ids().await?;
    println!(
        "{:<20} {:<20} {:<12} {:<12} {:<10}",
        "Cluster ID", "Name", "CPU Upper", "CPU Lower", "Cooldown"
    );
    println!("{}", "-".repeat(78));
    for id in ids {
        if let Some(cluster) = store.get_cluster(&id).await? {
            println!(
                "{:<20} {:<20} {:<12} {:<12} {:<10}",
                cluster.id, cluster.name, cluster.cpu_upper, cluster.cpu_lower, cluster.cooldown_minutes
            );
        }
    }
    Ok(())
}

pub async fn describe(store: &dyn ClusterStore, cluster_id: &str) -> Result<(), CliError> {
    let Some(cluster) = store.get_cluster(cluster_id).await? else {
        println!("Cluster {cluster_id} does not exist!");
        return Err(CliError::ClusterNotFound(cluster_id.to_string()));
    };
    println!("{}", serde_json::to_string_pretty(&cluster).unwrap());
    Ok(())
}

pub async fn delete(store: &dyn ClusterStore, cluster_id: &str) -> Result<(), CliError> {
    if store.get_cluster(cluster_id).await?.is_none() {
        println!("Cluster {cluster_id} does not exist!");
        return Err(CliError::ClusterNotFound(cluster_id.to_string()));
    }
    store.delete_cluster(cluster_id).await?;
    println!("Deleted cluster {cluster_id}");
    Ok(())
}

async fn selected_clusters(
    store: &dyn ClusterStore,
    cluster_id: &Option<String>,
    all: bool,
) -> Result<Vec<Cluster>, CliError> {
    let ids = if let Some(id) = cluster_id {
        vec![id.clone()]
    } else if all {
        store.all_cluster_ids().await?
    } else {
        Vec::new()
    };
    let mut clusters = Vec::new();
    for id in ids {
        if let Some(cluster) = store.get_cluster(&id).await? {
            clusters.push(cluster);
        }
    }
    Ok(clusters)
}

pub async fn set_active(
    store: &dyn ClusterStore,
    cluster_id: &Option<String>,
    all: bool,
    active: bool,
) -> Result<(), CliError> {
    for mut cluster in selected_clusters(store, cluster_id, all).await? {
        cluster.active = active;
        store.save_cluster(&cluster).await?;
        println!(
            "{} cluster {}",
            if active { "Enabled" } else { "Disabled" },
            cluster.id
        );
    }
    Ok(())
}

pub async fn reset(
    store: &dyn ClusterStore,
    provider: &dyn ClusterServiceClient,
    cluster_id: &Option<String>,
    all: bool,
) -> Result<(), CliError> {
    for mut cluster in selected_clusters(store, cluster_id, all).await? {
        cluster.reset_to_initial();
        if let Some(policy) = cluster.current_policy.clone() {
            provider.put_policy(&cluster.id, &policy).await?;
        }
        println!(
            "Reset cluster {} to initial max capacity {}",
            cluster.id,
            cluster.current_max_units()
        );
        store.save_cluster(&cluster).await?;
    }
    Ok(())
}
