//! payrelay server
//!
//! A payment-intermediation gateway: accepts payment requests over HTTP,
//! queues them on the backing store, and drains the queue with a worker pool
//! that dispatches each payment to a health-selected external processor.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ProviderEndpoints;
use kanau::processor::Processor;
use payrelay_core::consumer::QueueConsumer;
use payrelay_core::entities::ProviderName;
use payrelay_core::ledger::{ProcessedLedger, RedisLedger};
use payrelay_core::pool::{WorkerPool, DEFAULT_WORKER_COUNT};
use payrelay_core::providers::{HttpProvider, ProviderClient};
use payrelay_core::queue::{PaymentStream, RedisPaymentStream};
use payrelay_core::selector::{ProviderSelector, StoreChoiceCache};
use payrelay_core::service::PaymentService;
use payrelay_core::store::Store;
use server::run_ingress;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// payrelay - payment-intermediation gateway
#[derive(Parser, Debug)]
#[command(name = "payrelay-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Number of workers draining the payment queue
    #[arg(long, default_value_t = DEFAULT_WORKER_COUNT)]
    workers: usize,

    /// Consumer name within the queue's consumer group
    #[arg(long, default_value = "worker-1")]
    consumer: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting payrelay-server v{}", env!("CARGO_PKG_VERSION"));

    // Connect to the backing store
    let store_url = config::get_store_url().inspect_err(|e| {
        tracing::error!("REDIS_URL environment variable not set: {e}");
    })?;
    let store = Store::connect(&store_url)?;
    store.ping().await.map_err(|e| {
        tracing::error!("Failed to connect to backing store: {}", e);
        e
    })?;
    tracing::info!("Backing store connection established");

    // Build the provider clients and the selector
    let endpoints = ProviderEndpoints::from_env();
    let default_provider: Arc<dyn ProviderClient> =
        Arc::new(HttpProvider::new(ProviderName::Default, endpoints.default_url));
    let fallback_provider: Arc<dyn ProviderClient> = Arc::new(HttpProvider::new(
        ProviderName::Fallback,
        endpoints.fallback_url,
    ));
    let selector = ProviderSelector::new(
        default_provider,
        fallback_provider,
        Arc::new(StoreChoiceCache::new(store.clone())),
    );

    // Build the queue, ledger, and service
    let queue: Arc<dyn PaymentStream> = Arc::new(RedisPaymentStream::new(store.clone()));
    let ledger: Arc<dyn ProcessedLedger> = Arc::new(RedisLedger::new(store.clone()));
    let service = Arc::new(PaymentService::new(Arc::clone(&queue), ledger, selector));

    queue.ensure_group().await.map_err(|e| {
        tracing::error!("Failed to create queue consumer group: {}", e);
        e
    })?;

    // Spawn the processing pipeline: worker pool + dequeue loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handler_service = Arc::clone(&service);
    let pool = WorkerPool::start(args.workers, move |payment| {
        let service = Arc::clone(&handler_service);
        async move { service.process(payment).await }
    });
    let consumer = QueueConsumer::new(Arc::clone(&queue), pool, args.consumer);
    let consumer_handle = tokio::spawn(consumer.run(shutdown_rx));
    tracing::info!(workers = args.workers, "Payment pipeline started");

    // Run the ingress server until a shutdown signal arrives
    let state = AppState::new(store, service);
    let result = run_ingress(state, args.listen).await;

    // --- Graceful shutdown sequence ---

    // 1. Signal the pipeline to stop
    tracing::info!("Signaling pipeline to shut down...");
    let _ = shutdown_tx.send(true);

    // 2. Wait for the consumer to drain (it stops the pool itself)
    let _ = consumer_handle.await;
    tracing::info!("Payment pipeline shut down");

    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
