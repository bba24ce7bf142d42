//! Dequeue loop feeding the worker pool.
//!
//! A single task reads batches from the stream, hands each payment to the
//! pool (blocking on `submit` when all workers are busy, which is what
//! throttles the batch reads), and ACKs each record once it has been handed
//! over. Shutdown is checked between batches rather than racing the blocking
//! read: a cancelled read would strand its deliveries in the pending list.

use crate::entities::PaymentRequest;
use crate::pool::WorkerPool;
use crate::queue::PaymentStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Upper bound on records fetched per read.
const READ_BATCH_SIZE: usize = 100;
/// How long an idle read blocks before returning empty.
const READ_BLOCK: Duration = Duration::from_secs(2);
/// Pause after a failed read so a dead store does not busy-spin the loop.
const READ_RETRY_DELAY: Duration = Duration::from_secs(1);

/// The gateway's single queue consumer.
pub struct QueueConsumer {
    stream: Arc<dyn PaymentStream>,
    pool: WorkerPool<PaymentRequest>,
    consumer_name: String,
}

impl QueueConsumer {
    pub fn new(
        stream: Arc<dyn PaymentStream>,
        pool: WorkerPool<PaymentRequest>,
        consumer_name: impl Into<String>,
    ) -> Self {
        Self {
            stream,
            pool,
            consumer_name: consumer_name.into(),
        }
    }

    /// Drain the queue until shutdown is signaled, then stop the pool and
    /// wait for in-flight work to finish.
    pub async fn run(self, shutdown_rx: watch::Receiver<bool>) {
        info!(consumer = %self.consumer_name, "queue consumer started");

        loop {
            if *shutdown_rx.borrow() {
                info!("queue consumer received shutdown signal");
                break;
            }

            match self
                .stream
                .read_batch(&self.consumer_name, READ_BATCH_SIZE, READ_BLOCK)
                .await
            {
                Ok(deliveries) => {
                    for delivery in deliveries {
                        self.pool.submit(delivery.payment).await;
                        if let Err(e) = self.stream.ack(&delivery.id).await {
                            warn!(id = %delivery.id, error = %e, "failed to ack queue record");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "queue read failed");
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
            }
        }

        self.pool.stop().await;
        info!("queue consumer shutdown complete");
    }
}
