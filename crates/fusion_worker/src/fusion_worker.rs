use crate::domain::{CardResolver, SnapshotFusionEngine, TelemetryIngestionService};
use crate::redis::create_telemetry_processor;
use common::domain::CardRepository;
use common::redis::{RedisClient, StreamConsumer, StreamConsumerConfig};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct FusionWorkerConfig {
    pub input_stream: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub batch_size: usize,
    pub batch_block: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub cache_key_prefix: String,
    pub cache_ttl: Duration,
    pub reading_key_prefix: String,
    pub reading_ttl: Duration,
}

pub type FusionWorkerProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

pub struct FusionWorker {
    consumer: StreamConsumer,
}

impl FusionWorker {
    /// Wires the ingestion pipeline and creates the consumer group.
    /// Fails if the group cannot be created.
    pub async fn new(
        card_repository: Arc<dyn CardRepository>,
        redis_client: &RedisClient,
        config: FusionWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!("Initializing sensor fusion worker");

        let reading_store =
            redis_client.create_reading_store(&config.reading_key_prefix, config.reading_ttl);
        let cache_writer =
            redis_client.create_cache_writer(&config.cache_key_prefix, config.cache_ttl);

        let resolver = Arc::new(CardResolver::new(card_repository.clone()));
        let fusion_engine = Arc::new(SnapshotFusionEngine::new(
            card_repository,
            reading_store.clone(),
        ));
        let service = Arc::new(TelemetryIngestionService::new(
            resolver,
            reading_store,
            fusion_engine,
            cache_writer,
        ));

        let processor = create_telemetry_processor(service, config.input_stream.clone());
        let consumer = StreamConsumer::new(
            redis_client.create_stream_client(),
            StreamConsumerConfig {
                stream: config.input_stream,
                group: config.consumer_group,
                consumer_name: config.consumer_name,
                batch_size: config.batch_size,
                block: config.batch_block,
                initial_backoff: config.initial_backoff,
                max_backoff: config.max_backoff,
            },
            processor,
        )
        .await?;

        info!("Sensor fusion worker initialized");

        Ok(Self { consumer })
    }

    pub fn into_runner_process(self) -> FusionWorkerProcess {
        let consumer = self.consumer;
        Box::new(move |ctx| Box::pin(async move { consumer.run(ctx).await }))
    }
}
