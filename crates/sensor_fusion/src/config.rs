use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use fusion_worker::FusionWorkerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Redis configuration
    /// Redis server URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Stream carrying device telemetry
    #[serde(default = "default_input_stream")]
    pub input_stream: String,

    /// Consumer group shared by all instances
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Consumer name, unique per running instance
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Maximum entries per read
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long a read blocks waiting for entries, in milliseconds
    #[serde(default = "default_batch_block_ms")]
    pub batch_block_ms: u64,

    /// First delay after a failed read, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound of the read retry delay, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_cache_key_prefix")]
    pub cache_key_prefix: String,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_reading_key_prefix")]
    pub reading_key_prefix: String,

    #[serde(default = "default_reading_ttl_secs")]
    pub reading_ttl_secs: u64,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_input_stream() -> String {
    "iot:data:stream".to_string()
}

fn default_consumer_group() -> String {
    "sensor-fusion-group".to_string()
}

fn default_consumer_name() -> String {
    "sensor-fusion-1".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_block_ms() -> u64 {
    1000
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_cache_key_prefix() -> String {
    "sensor_fusion:card".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_reading_key_prefix() -> String {
    "sensor_fusion:reading".to_string()
}

fn default_reading_ttl_secs() -> u64 {
    3600
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "owlrd".to_string()
}

fn default_postgres_username() -> String {
    "postgres".to_string()
}

fn default_postgres_password() -> String {
    "postgres".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    5
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "sensor-fusion".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("FUSION"))
            .build()?
            .try_deserialize()
    }

    /// Reject settings the consumer loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Message(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.initial_backoff_ms == 0 || self.max_backoff_ms == 0 {
            return Err(ConfigError::Message(
                "backoff delays must be greater than 0".to_string(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Message(format!(
                "initial_backoff_ms ({}) must not exceed max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
        }
    }

    pub fn fusion_worker_config(&self) -> FusionWorkerConfig {
        FusionWorkerConfig {
            input_stream: self.input_stream.clone(),
            consumer_group: self.consumer_group.clone(),
            consumer_name: self.consumer_name.clone(),
            batch_size: self.batch_size,
            batch_block: Duration::from_millis(self.batch_block_ms),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            cache_key_prefix: self.cache_key_prefix.clone(),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            reading_key_prefix: self.reading_key_prefix.clone(),
            reading_ttl: Duration::from_secs(self.reading_ttl_secs),
        }
    }
}
