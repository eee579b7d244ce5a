//! `run-test-job` / `kill-test-job`: submits or kills a SparkPi smoke-test
//! job against a managed cluster, mirroring the original tool's test-job
//! helpers.

use clap::Args;
use rand::seq::SliceRandom;
use scalectl_core::ports::{ClusterServiceClient, ClusterStore};
use scalectl_telemetry::yarn;

use super::CliError;

#[derive(Debug, Args)]
pub struct RunTestJobArgs {
    #[arg(long)]
    pub cluster_id: String,
    #[arg(long, default_value_t = 1)]
    pub job_number: u32,
    #[arg(long, default_value = "1")]
    pub num_executors: String,
    #[arg(long, default_value = "1G")]
    pub executor_memory: String,
}

fn spark_pi_step(executor_memory: &str, num_executors: &str) -> serde_json::Value {
    serde_json::json!({
        "Name": "Pi",
        "ActionOnFailure": "CONTINUE",
        "HadoopJarStep": {
            "Jar": "command-runner.jar",
            "Args": [
                "spark-submit",
                "--deploy-mode", "cluster",
                "--master", "yarn",
                "--executor-memory", executor_memory,
                "--num-executors", num_executors,
                "--executor-cores", "1",
                "--conf", "spark.dynamicAllocation.enabled=false",
                "--class", "org.apache.spark.examples.SparkPi",
                "/usr/lib/spark/examples/jars/spark-examples.jar",
                "1000000"
            ]
        }
    })
}

pub async fn run_test_job(provider: &dyn ClusterServiceClient, args: RunTestJobArgs) -> Result<(), CliError> {
    let step = spark_pi_step(&args.executor_memory, &args.num_executors);
    for _ in 0..args.job_number {
        provider
            .add_job_flow_steps(&args.cluster_id, serde_json::json!({ "Steps": [step.clone()] }))
            .await?;
    }
    println!("Submitted {} SparkPi step(s) to {}", args.job_number, args.cluster_id);
    Ok(())
}

#[derive(Debug, Args)]
pub struct KillTestJobArgs {
    #[arg(long)]
    pub cluster_id: String,
    #[arg(long, default_value_t = 1)]
    pub job_number: usize,
}

pub async fn kill_test_job(store: &dyn ClusterStore, args: KillTestJobArgs) -> Result<(), CliError> {
    let Some(cluster) = store.get_cluster(&args.cluster_id).await? else {
        println!("Cluster {} does not exist!", args.cluster_id);
        return Err(CliError::ClusterNotFound(args.cluster_id.clone()));
    };
    let Some(base_url) = cluster.master_endpoint else {
        println!("Cluster {} has no known master endpoint yet", args.cluster_id);
        return Ok(());
    };

    let client = reqwest::Client::new();
    let mut running_apps = yarn::list_running_apps(&client, &base_url).await?;
    running_apps.shuffle(&mut rand::thread_rng());
    running_apps.truncate(args.job_number);

    for app_id in running_apps {
        println!("Killing {app_id}");
        match yarn::kill_app(&client, &base_url, &app_id).await {
            Ok(text) => println!("{text}"),
            Err(err) => tracing::warn!(app_id, error = %err, "failed to kill application"),
        }
    }
    Ok(())
}
