//! Runtime configuration, loaded via `dotenvy` + `std::env::var` rather than
//! the teacher's `dotenv_codegen::dotenv!` compile-time macro — see the
//! ambient-stack note in the design doc for why.

pub struct Config {
    pub redis_url: String,
    pub amqp_addr: Option<String>,
    pub provider_base_url: String,
    pub proxy_base: Option<String>,
    pub instance_type_cache: std::path::PathBuf,
}

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
            amqp_addr: std::env::var("AMQP_ADDR").ok(),
            provider_base_url: std::env::var("SCALECTL_PROVIDER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9900".to_string()),
            proxy_base: std::env::var("api_host").ok(),
            instance_type_cache: scalectl_telemetry::instance_types::default_cache_path(),
        }
    }
}
