pub mod cluster;
pub mod start;
pub mod test_job;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("cluster {0} does not exist!")]
    ClusterNotFound(String),
    #[error(transparent)]
    Store(#[from] scalectl_core::ports::StoreError),
    #[error(transparent)]
    Provider(#[from] scalectl_core::ports::ProviderError),
    #[error(transparent)]
    Config(#[from] scalectl_core::model::ClusterConfigError),
    #[error(transparent)]
    Telemetry(#[from] scalectl_telemetry::TelemetryError),
}
