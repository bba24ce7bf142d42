//! Payment orchestration: queue-in, dispatch, retry, ledger write, and
//! summary read.
//!
//! The service is the worker pool's handler, wired in through the
//! [`Processor`] trait. `process` never propagates an error to the pool:
//! submit failures are absorbed into a bounded retry by re-enqueueing the
//! payment with an incremented counter.

use crate::entities::{PaymentRequest, PaymentSummary, ProcessedPayment};
use crate::ledger::ProcessedLedger;
use crate::queue::PaymentStream;
use crate::selector::ProviderSelector;
use kanau::processor::Processor;
use std::convert::Infallible;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

/// Highest retry counter a payment may carry; anything beyond is dropped.
const MAX_RETRIES: u32 = 3;

/// Orchestrates the payment pipeline around the queue, selector, providers,
/// and ledger.
pub struct PaymentService {
    queue: Arc<dyn PaymentStream>,
    ledger: Arc<dyn ProcessedLedger>,
    selector: ProviderSelector,
}

impl PaymentService {
    pub fn new(
        queue: Arc<dyn PaymentStream>,
        ledger: Arc<dyn ProcessedLedger>,
        selector: ProviderSelector,
    ) -> Self {
        Self {
            queue,
            ledger,
            selector,
        }
    }

    /// Fire-and-forget publish to the queue.
    ///
    /// The caller has already been told "accepted", so publication happens
    /// on a detached task and append failures are logged, never surfaced.
    pub fn enqueue(&self, payment: PaymentRequest) {
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            if let Err(e) = queue.publish(&payment).await {
                error!(
                    correlation_id = %payment.correlation_id,
                    error = %e,
                    "failed to enqueue payment"
                );
            }
        });
    }

    /// Aggregate the ledger over the inclusive score range derived from the
    /// optional bounds. A failed ledger read is logged and aggregates as
    /// empty; the summary reflects ledger state at read time.
    pub async fn get_summary(
        &self,
        from: Option<OffsetDateTime>,
        to: Option<OffsetDateTime>,
    ) -> PaymentSummary {
        let entries = match self.ledger.range(from, to).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "failed to read processed-payment ledger");
                Vec::new()
            }
        };

        let mut summary = PaymentSummary::default();
        for entry in &entries {
            summary.record(entry);
        }
        summary
    }
}

impl Processor<PaymentRequest, Result<(), Infallible>> for PaymentService {
    /// The worker handler: one provider attempt per delivery.
    async fn process(&self, mut payment: PaymentRequest) -> Result<(), Infallible> {
        if payment.retry > MAX_RETRIES {
            debug!(
                correlation_id = %payment.correlation_id,
                retry = payment.retry,
                "payment exceeded retry limit, dropping"
            );
            return Ok(());
        }

        let provider = self.selector.pick().await;
        match provider.submit(&payment).await {
            Ok(requested_at) => {
                let processed = ProcessedPayment {
                    correlation_id: payment.correlation_id.clone(),
                    amount: payment.amount,
                    provider: provider.name(),
                    processed_at: requested_at,
                };
                if let Err(e) = self.ledger.append(&processed).await {
                    error!(
                        correlation_id = %payment.correlation_id,
                        error = %e,
                        "failed to append processed payment to ledger"
                    );
                }
            }
            Err(e) => {
                payment.retry += 1;
                warn!(
                    correlation_id = %payment.correlation_id,
                    provider = %provider.name(),
                    retry = payment.retry,
                    error = %e,
                    "payment submission failed, re-enqueueing"
                );
                self.enqueue(payment);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::entities::ProviderName;
    use crate::providers::{ProviderClient, ProviderError, ProviderHealth};
    use crate::queue::DeliveredPayment;
    use crate::selector::ChoiceCache;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use time::macros::datetime;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingStream {
        published: Mutex<Vec<PaymentRequest>>,
    }

    #[async_trait]
    impl PaymentStream for RecordingStream {
        async fn publish(&self, payment: &PaymentRequest) -> Result<(), StoreError> {
            self.published.lock().await.push(payment.clone());
            Ok(())
        }

        async fn read_batch(
            &self,
            _consumer: &str,
            _count: usize,
            _block: Duration,
        ) -> Result<Vec<DeliveredPayment>, StoreError> {
            Ok(Vec::new())
        }

        async fn ack(&self, _delivery_id: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn ensure_group(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingLedger {
        appended: Mutex<Vec<ProcessedPayment>>,
        entries: Mutex<Vec<ProcessedPayment>>,
        requested_ranges: Mutex<Vec<(Option<OffsetDateTime>, Option<OffsetDateTime>)>>,
        fail_reads: bool,
    }

    #[async_trait]
    impl ProcessedLedger for RecordingLedger {
        async fn append(&self, payment: &ProcessedPayment) -> Result<(), StoreError> {
            self.appended.lock().await.push(payment.clone());
            Ok(())
        }

        async fn range(
            &self,
            from: Option<OffsetDateTime>,
            to: Option<OffsetDateTime>,
        ) -> Result<Vec<ProcessedPayment>, StoreError> {
            self.requested_ranges.lock().await.push((from, to));
            if self.fail_reads {
                return Err(StoreError::Command(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connection refused",
                ))));
            }
            Ok(self.entries.lock().await.clone())
        }
    }

    struct ScriptedProvider {
        name: ProviderName,
        submissions: AtomicUsize,
        outcomes: Mutex<VecDeque<Result<OffsetDateTime, ProviderError>>>,
    }

    impl ScriptedProvider {
        fn new(
            name: ProviderName,
            outcomes: Vec<Result<OffsetDateTime, ProviderError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                submissions: AtomicUsize::new(0),
                outcomes: Mutex::new(outcomes.into()),
            })
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedProvider {
        async fn submit(&self, _: &PaymentRequest) -> Result<OffsetDateTime, ProviderError> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(ProviderError::BadStatus(500)))
        }

        async fn health(&self) -> Result<ProviderHealth, ProviderError> {
            Ok(ProviderHealth {
                failing: false,
                min_response_time: 0,
            })
        }

        fn name(&self) -> ProviderName {
            self.name
        }
    }

    #[derive(Default)]
    struct MemoryCache {
        slot: Mutex<Option<ProviderName>>,
    }

    #[async_trait]
    impl ChoiceCache for MemoryCache {
        async fn current(&self) -> Result<Option<ProviderName>, StoreError> {
            Ok(*self.slot.lock().await)
        }

        async fn remember(&self, choice: ProviderName) -> Result<(), StoreError> {
            *self.slot.lock().await = Some(choice);
            Ok(())
        }
    }

    struct Harness {
        service: PaymentService,
        stream: Arc<RecordingStream>,
        ledger: Arc<RecordingLedger>,
        default: Arc<ScriptedProvider>,
    }

    fn harness(
        default_outcomes: Vec<Result<OffsetDateTime, ProviderError>>,
        ledger: RecordingLedger,
    ) -> Harness {
        let stream = Arc::new(RecordingStream::default());
        let ledger = Arc::new(ledger);
        let default = ScriptedProvider::new(ProviderName::Default, default_outcomes);
        let fallback = ScriptedProvider::new(ProviderName::Fallback, Vec::new());
        let selector = ProviderSelector::new(
            Arc::clone(&default) as Arc<dyn ProviderClient>,
            fallback,
            Arc::new(MemoryCache::default()),
        );
        let service = PaymentService::new(
            Arc::clone(&stream) as Arc<dyn PaymentStream>,
            Arc::clone(&ledger) as Arc<dyn ProcessedLedger>,
            selector,
        );
        Harness {
            service,
            stream,
            ledger,
            default,
        }
    }

    fn request(retry: u32) -> PaymentRequest {
        PaymentRequest {
            correlation_id: "abc".to_string(),
            amount: 19.9,
            retry,
        }
    }

    async fn wait_for_publish(stream: &RecordingStream) -> PaymentRequest {
        for _ in 0..100 {
            if let Some(first) = stream.published.lock().await.first().cloned() {
                return first;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no payment was published to the queue");
    }

    #[tokio::test]
    async fn test_successful_submission_lands_in_ledger() {
        let accepted_at = datetime!(2025-07-01 12:00:00.123456 UTC);
        let h = harness(vec![Ok(accepted_at)], RecordingLedger::default());

        h.service.process(request(0)).await.unwrap();

        let appended = h.ledger.appended.lock().await;
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].correlation_id, "abc");
        assert_eq!(appended[0].provider, ProviderName::Default);
        assert_eq!(appended[0].processed_at, accepted_at);
        assert!(h.stream.published.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_submission_reenqueues_with_incremented_retry() {
        let h = harness(
            vec![Err(ProviderError::BadStatus(500))],
            RecordingLedger::default(),
        );

        h.service.process(request(1)).await.unwrap();

        let republished = wait_for_publish(&h.stream).await;
        assert_eq!(republished.retry, 2);
        assert_eq!(republished.correlation_id, "abc");
        assert!(h.ledger.appended.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unprocessable_submission_is_retry_bounded_too() {
        let h = harness(
            vec![Err(ProviderError::Unprocessable)],
            RecordingLedger::default(),
        );

        h.service.process(request(0)).await.unwrap();

        let republished = wait_for_publish(&h.stream).await;
        assert_eq!(republished.retry, 1);
    }

    #[tokio::test]
    async fn test_exhausted_payment_is_dropped_without_side_effects() {
        let h = harness(Vec::new(), RecordingLedger::default());

        h.service.process(request(4)).await.unwrap();

        assert_eq!(h.default.submissions.load(Ordering::SeqCst), 0);
        assert!(h.ledger.appended.lock().await.is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.stream.published.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_publishes_on_a_detached_task() {
        let h = harness(Vec::new(), RecordingLedger::default());

        h.service.enqueue(request(0));

        let published = wait_for_publish(&h.stream).await;
        assert_eq!(published.retry, 0);
    }

    #[tokio::test]
    async fn test_summary_aggregates_by_provider_within_bounds() {
        let ledger = RecordingLedger {
            entries: Mutex::new(vec![
                ProcessedPayment {
                    correlation_id: "b".to_string(),
                    amount: 2.0,
                    provider: ProviderName::Fallback,
                    processed_at: datetime!(1970-01-01 00:00:02 UTC),
                },
                ProcessedPayment {
                    correlation_id: "c".to_string(),
                    amount: 3.0,
                    provider: ProviderName::Default,
                    processed_at: datetime!(1970-01-01 00:00:03 UTC),
                },
            ]),
            ..RecordingLedger::default()
        };
        let h = harness(Vec::new(), ledger);

        let from = datetime!(1970-01-01 00:00:02 UTC);
        let summary = h.service.get_summary(Some(from), None).await;

        assert_eq!(summary.default.total_requests, 1);
        assert_eq!(summary.default.total_amount, 3.0);
        assert_eq!(summary.fallback.total_requests, 1);
        assert_eq!(summary.fallback.total_amount, 2.0);

        let ranges = h.ledger.requested_ranges.lock().await;
        assert_eq!(ranges.as_slice(), &[(Some(from), None)]);
    }

    #[tokio::test]
    async fn test_summary_is_empty_when_the_ledger_read_fails() {
        let ledger = RecordingLedger {
            fail_reads: true,
            ..RecordingLedger::default()
        };
        let h = harness(Vec::new(), ledger);

        let summary = h.service.get_summary(None, None).await;
        assert_eq!(summary, PaymentSummary::default());
    }
}
