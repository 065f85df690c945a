#![cfg(feature = "integration-tests")]

use common::domain::FusedState;
use common::postgres::{PostgresCardRepository, PostgresClient};
use common::redis::RedisClient;
use fusion_worker::{FusionWorker, FusionWorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::redis::Redis;
use tokio_util::sync::CancellationToken;

const SCHEMA: &str = include_str!("../../common/tests/fixtures/schema.sql");

const SEED: &str = r#"
INSERT INTO devices (device_id, tenant_id, bound_bed_id, bound_room_id) VALUES
    ('D1', 'T1', 'B1', NULL);

INSERT INTO cards (card_id, tenant_id, card_type, bed_id, unit_id, devices) VALUES
    ('C1', 'T1', 'ActiveBed', 'B1', 'U1',
        '[{"device_id":"D1","device_name":"Bed radar","device_type":"Radar","binding_type":"direct"}]');
"#;

const STREAM: &str = "iot:data:stream";

struct TestEnv {
    _postgres: ContainerAsync<Postgres>,
    _redis: ContainerAsync<Redis>,
    repository: Arc<PostgresCardRepository>,
    redis_client: RedisClient,
}

async fn setup() -> TestEnv {
    let postgres = Postgres::default().start().await.unwrap();
    let pg_host = postgres.get_host().await.unwrap();
    let pg_port = postgres.get_host_port_ipv4(5432).await.unwrap();
    let pg_client = PostgresClient::new(
        &pg_host.to_string(),
        pg_port,
        "postgres",
        "postgres",
        "postgres",
        5,
    )
    .unwrap();
    let conn = pg_client.get_connection().await.unwrap();
    conn.batch_execute(SCHEMA).await.unwrap();
    conn.batch_execute(SEED).await.unwrap();
    drop(conn);

    let redis = Redis::default().start().await.unwrap();
    let redis_host = redis.get_host().await.unwrap();
    let redis_port = redis.get_host_port_ipv4(6379).await.unwrap();
    let redis_client = RedisClient::connect(
        &format!("redis://{}:{}", redis_host, redis_port),
        Duration::from_secs(10),
    )
    .await
    .unwrap();

    TestEnv {
        _postgres: postgres,
        _redis: redis,
        repository: Arc::new(PostgresCardRepository::new(pg_client)),
        redis_client,
    }
}

fn worker_config() -> FusionWorkerConfig {
    FusionWorkerConfig {
        input_stream: STREAM.to_string(),
        consumer_group: "sensor-fusion-group".to_string(),
        consumer_name: "sensor-fusion-test".to_string(),
        batch_size: 10,
        batch_block: Duration::from_millis(100),
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(1),
        cache_key_prefix: "sensor_fusion:card".to_string(),
        cache_ttl: Duration::from_secs(300),
        reading_key_prefix: "sensor_fusion:reading".to_string(),
        reading_ttl: Duration::from_secs(3600),
    }
}

async fn publish(client: &RedisClient, data: &str) {
    let mut conn = client.connection();
    let _: String = redis::cmd("XADD")
        .arg(STREAM)
        .arg("*")
        .arg("data")
        .arg(data)
        .query_async(&mut conn)
        .await
        .unwrap();
}

async fn get(client: &RedisClient, key: &str) -> Option<String> {
    let mut conn = client.connection();
    redis::cmd("GET").arg(key).query_async(&mut conn).await.unwrap()
}

async fn pending_count(client: &RedisClient) -> i64 {
    let mut conn = client.connection();
    let summary: redis::Value = redis::cmd("XPENDING")
        .arg(STREAM)
        .arg("sensor-fusion-group")
        .query_async(&mut conn)
        .await
        .unwrap();
    match summary {
        redis::Value::Array(items) => match items.first() {
            Some(redis::Value::Int(count)) => *count,
            other => panic!("unexpected XPENDING count: {:?}", other),
        },
        other => panic!("unexpected XPENDING reply: {:?}", other),
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_bound_device_event_updates_card_cache() {
    let env = setup().await;

    let worker = FusionWorker::new(env.repository.clone(), &env.redis_client, worker_config())
        .await
        .unwrap();
    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.into_runner_process()(token.clone()));

    // Wrong tenant first: skipped and acknowledged, no cache entry
    publish(
        &env.redis_client,
        r#"{"device_id":"D1","device_type":"Radar","tenant_id":"T2","payload":{"presence":true}}"#,
    )
    .await;
    // Poison entry: dropped without blocking the next one
    publish(&env.redis_client, "not json").await;
    publish(
        &env.redis_client,
        r#"{"device_id":"D1","device_type":"Radar","tenant_id":"T1","payload":{"presence":true}}"#,
    )
    .await;

    let mut cached = None;
    for _ in 0..50 {
        cached = get(&env.redis_client, "sensor_fusion:card:C1:realtime").await;
        if cached.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let state: FusedState = serde_json::from_str(&cached.expect("card C1 was never cached")).unwrap();
    assert_eq!(state.card_id, "C1");
    assert_eq!(state.tenant_id, "T1");
    assert_eq!(state.devices.len(), 1);
    assert_eq!(state.reporting_devices, 1);
    assert_eq!(
        state.devices[0].reading.as_ref().unwrap().payload["presence"],
        true
    );

    // Acknowledgment follows the cache write, so allow it to land
    let mut pending = pending_count(&env.redis_client).await;
    for _ in 0..20 {
        if pending == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        pending = pending_count(&env.redis_client).await;
    }
    assert_eq!(pending, 0);

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop after cancellation")
        .unwrap()
        .unwrap();
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_worker_creation_is_idempotent_for_existing_group() {
    let env = setup().await;

    FusionWorker::new(env.repository.clone(), &env.redis_client, worker_config())
        .await
        .unwrap();
    FusionWorker::new(env.repository.clone(), &env.redis_client, worker_config())
        .await
        .unwrap();
}
