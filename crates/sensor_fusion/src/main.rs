mod config;

use common::postgres::{PostgresCardRepository, PostgresClient};
use common::redis::RedisClient;
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::ServiceConfig;
use fusion_worker::FusionWorker;
use sensor_fusion_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env().and_then(|cfg| cfg.validate().map(|()| cfg)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        stream = %config.input_stream,
        group = %config.consumer_group,
        consumer = %config.consumer_name,
        "Starting sensor-fusion service"
    );
    debug!("Configuration: {:?}", config);

    let (card_repository, redis_client) = match initialize_shared_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize shared dependencies: {:#}", e);
            std::process::exit(1);
        }
    };

    let fusion_worker = match FusionWorker::new(
        card_repository,
        &redis_client,
        config.fusion_worker_config(),
    )
    .await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to initialize fusion worker: {:#}", e);
            std::process::exit(1);
        }
    };

    Runner::new()
        .with_named_process("fusion_worker", fusion_worker.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            redis_client.close().await;

            // Flush pending traces and logs
            shutdown_telemetry(telemetry_providers);

            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
) -> anyhow::Result<(Arc<PostgresCardRepository>, RedisClient)> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);

    info!("Initializing PostgreSQL...");
    let postgres_client = PostgresClient::from_config(&config.postgres_config())?;
    tokio::time::timeout(startup_timeout, postgres_client.ping())
        .await
        .map_err(|_| anyhow::anyhow!("Timed out connecting to PostgreSQL"))??;
    let card_repository = Arc::new(PostgresCardRepository::new(postgres_client));

    info!("Initializing Redis...");
    let redis_client = RedisClient::connect(&config.redis_url, startup_timeout).await?;
    redis_client.ping().await?;

    Ok((card_repository, redis_client))
}
