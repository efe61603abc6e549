//! Single-process composition of the relay: edge HTTP surface, correlator,
//! engine handlers, and the dedup sweeper, all sharing one bus and one
//! store.
//!
//! Storage defaults to PostgreSQL (`database.url` in the config); set
//! `RELAY_STORAGE=memory` for a database-free development run.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use currency_relay::config::RelayConfig;
use currency_relay::constants::{
    DEAD_LETTER_TOPIC, EDGE_GROUP, FETCH_GROUP, FETCH_TOPIC, REQUEST_GROUP, REQUEST_TOPIC,
    RESPONSE_TOPIC,
};
use currency_relay::correlator::{PendingRequests, QueryGateway, ResponseListener};
use currency_relay::dedup::DedupSweeper;
use currency_relay::engine::{FetchSideHandler, RequestSideHandler};
use currency_relay::executor::WorkerPool;
use currency_relay::logging::init_structured_logging;
use currency_relay::messaging::{BusProvider, TopicConsumer};
use currency_relay::storage::{PostgresStore, StorageProvider};
use currency_relay::upstream::UpstreamProvider;
use currency_relay::web::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();
    let config = RelayConfig::load_from_env().context("loading configuration")?;

    let storage = match std::env::var("RELAY_STORAGE").as_deref() {
        Ok("memory") => Arc::new(StorageProvider::new_in_memory()),
        _ => {
            let store = PostgresStore::connect(&config.database)
                .await
                .context("connecting to the database")?;
            Arc::new(StorageProvider::Postgres(store))
        }
    };

    let bus = Arc::new(BusProvider::new_in_memory());
    bus.ensure_topics(&[
        REQUEST_TOPIC,
        FETCH_TOPIC,
        RESPONSE_TOPIC,
        DEAD_LETTER_TOPIC,
    ])
    .await
    .context("creating topics")?;

    let pool = WorkerPool::start(&config.pool);
    let pending = Arc::new(PendingRequests::new());
    let gateway = Arc::new(QueryGateway::new(
        Arc::clone(&bus),
        Arc::clone(&pool),
        Arc::clone(&pending),
        &config.edge,
    ));
    let upstream = Arc::new(
        UpstreamProvider::new_http(&config.upstream).context("building upstream client")?,
    );

    let consumers = vec![
        TopicConsumer::new(
            Arc::clone(&bus),
            Arc::clone(&pool),
            Arc::new(RequestSideHandler::new(
                Arc::clone(&bus),
                Arc::clone(&storage),
                &config,
            )),
            REQUEST_TOPIC,
            REQUEST_GROUP,
        )
        .spawn(),
        TopicConsumer::new(
            Arc::clone(&bus),
            Arc::clone(&pool),
            Arc::new(FetchSideHandler::new(
                Arc::clone(&bus),
                Arc::clone(&storage),
                upstream,
                &config,
            )),
            FETCH_TOPIC,
            FETCH_GROUP,
        )
        .spawn(),
        TopicConsumer::new(
            Arc::clone(&bus),
            Arc::clone(&pool),
            Arc::new(ResponseListener::new(Arc::clone(&pending))),
            RESPONSE_TOPIC,
            EDGE_GROUP,
        )
        .spawn(),
    ];
    let sweeper = DedupSweeper::new(Arc::clone(&storage), &config.dedup).spawn();

    let state = AppState::new(gateway, Arc::clone(&bus), Arc::clone(&storage));
    let listener = tokio::net::TcpListener::bind(&config.edge.bind_address)
        .await
        .with_context(|| format!("binding {}", config.edge.bind_address))?;
    info!(
        address = %config.edge.bind_address,
        bus = bus.provider_name(),
        storage = storage.provider_name(),
        "relay listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    info!("shutting down");
    futures::future::join_all(consumers.into_iter().map(|consumer| consumer.stop())).await;
    sweeper.stop().await;
    pool.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
