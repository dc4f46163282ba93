//! Agent configuration

use anyhow::Result;
use serde::Deserialize;

/// Sizer agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SizerConfig {
    /// Docker Engine API endpoint
    #[serde(default = "default_docker_host")]
    pub docker_host: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Inter-sample interval in seconds
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    /// Profiling duration applied when a request omits one
    #[serde(default = "default_duration")]
    pub default_duration_secs: u64,
}

fn default_docker_host() -> String {
    std::env::var("DOCKER_HOST").unwrap_or_else(|_| "http://localhost:2375".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_sample_interval() -> u64 {
    1
}

fn default_duration() -> u64 {
    30
}

impl SizerConfig {
    /// Load configuration from environment variables with the `SIZER` prefix
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SIZER"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| SizerConfig {
            docker_host: default_docker_host(),
            api_port: default_api_port(),
            sample_interval_secs: default_sample_interval(),
            default_duration_secs: default_duration(),
        }))
    }
}
