pub mod discovery;
pub mod instance_types;
pub mod node_exporter;
pub mod yarn;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to fetch {0}: {1}")]
    Fetch(String, String),
    #[error("failed to parse response from {0}: {1}")]
    Parse(String, String),
}
