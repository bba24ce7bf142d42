//! Ingress queue backed by a Redis stream with a consumer group.
//!
//! The stream delivers at least once: a record is removed from a consumer's
//! pending list only by an explicit ACK, and the retry counter rides inside
//! the record fields so redelivered payments keep their attempt history.

use crate::entities::PaymentRequest;
use crate::store::{Store, StoreError};
use async_trait::async_trait;
use redis::streams::{StreamId, StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Stream name holding queued payments.
const PAYMENTS_STREAM: &str = "payments";
/// Consumer group draining the stream.
const WORKERS_GROUP: &str = "workers";
/// Approximate cap on stream length; oldest records are trimmed first.
const STREAM_MAX_LEN: usize = 100_000;

/// A payment delivered from the stream, paired with the record id to ACK.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredPayment {
    pub id: String,
    pub payment: PaymentRequest,
}

/// Errors produced when decoding a stream record into a payment.
#[derive(Debug, Error)]
pub enum RecordDecodeError {
    #[error("stream record is missing field {0:?}")]
    MissingField(&'static str),

    #[error("invalid amount in stream record: {0}")]
    Amount(std::num::ParseFloatError),

    #[error("invalid retry counter in stream record: {0}")]
    Retry(std::num::ParseIntError),
}

/// The ingress queue contract.
#[async_trait]
pub trait PaymentStream: Send + Sync {
    /// Publish a payment record, trimming the stream to its approximate cap.
    async fn publish(&self, payment: &PaymentRequest) -> Result<(), StoreError>;

    /// Read up to `count` undelivered records for this consumer, blocking up
    /// to `block` when the stream is idle.
    async fn read_batch(
        &self,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<DeliveredPayment>, StoreError>;

    /// Acknowledge a delivered record.
    async fn ack(&self, delivery_id: &str) -> Result<(), StoreError>;

    /// Create the consumer group if it does not exist yet.
    async fn ensure_group(&self) -> Result<(), StoreError>;
}

/// Redis-stream implementation of [`PaymentStream`].
#[derive(Clone)]
pub struct RedisPaymentStream {
    store: Store,
    stream: String,
    group: String,
}

impl RedisPaymentStream {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            stream: PAYMENTS_STREAM.to_string(),
            group: WORKERS_GROUP.to_string(),
        }
    }
}

#[async_trait]
impl PaymentStream for RedisPaymentStream {
    #[tracing::instrument(skip_all, err, name = "Redis:PublishPayment")]
    async fn publish(&self, payment: &PaymentRequest) -> Result<(), StoreError> {
        let fields = [
            ("correlationId", payment.correlation_id.clone()),
            ("amount", payment.amount.to_string()),
            ("retry", payment.retry.to_string()),
        ];
        let mut conn = self.store.conn().await?;
        let _: String = conn
            .xadd_maxlen_map(
                &self.stream,
                StreamMaxlen::Approx(STREAM_MAX_LEN),
                "*",
                &fields[..],
            )
            .await?;
        Ok(())
    }

    async fn read_batch(
        &self,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<DeliveredPayment>, StoreError> {
        let options = StreamReadOptions::default()
            .group(&self.group, consumer)
            .count(count)
            .block(block.as_millis() as usize);

        let mut conn = self.store.conn().await?;
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.stream], &[">"], &options)
            .await?;

        let mut batch = Vec::new();
        let Some(reply) = reply else {
            return Ok(batch);
        };
        for key in reply.keys {
            for record in key.ids {
                match decode_record(&record) {
                    Ok(payment) => batch.push(DeliveredPayment {
                        id: record.id.clone(),
                        payment,
                    }),
                    Err(e) => {
                        warn!(id = %record.id, error = %e, "skipping malformed queue record");
                    }
                }
            }
        }
        Ok(batch)
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), StoreError> {
        let mut conn = self.store.conn().await?;
        let _: i64 = conn.xack(&self.stream, &self.group, &[delivery_id]).await?;
        Ok(())
    }

    async fn ensure_group(&self) -> Result<(), StoreError> {
        let mut conn = self.store.conn().await?;
        let created: Result<String, redis::RedisError> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "0")
            .await;
        match created {
            Ok(_) => Ok(()),
            // The group surviving a restart is the expected steady state.
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn decode_record(record: &StreamId) -> Result<PaymentRequest, RecordDecodeError> {
    parse_fields(
        record.get("correlationId"),
        record.get("amount"),
        record.get("retry"),
    )
}

fn parse_fields(
    correlation_id: Option<String>,
    amount: Option<String>,
    retry: Option<String>,
) -> Result<PaymentRequest, RecordDecodeError> {
    let correlation_id = correlation_id.ok_or(RecordDecodeError::MissingField("correlationId"))?;
    let amount = amount
        .ok_or(RecordDecodeError::MissingField("amount"))?
        .parse::<f64>()
        .map_err(RecordDecodeError::Amount)?;
    let retry = match retry {
        Some(raw) => raw.parse::<u32>().map_err(RecordDecodeError::Retry)?,
        None => 0,
    };
    Ok(PaymentRequest {
        correlation_id,
        amount,
        retry,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn field(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn test_parse_fields_full_record() {
        let payment = parse_fields(field("abc"), field("19.9"), field("2")).unwrap();
        assert_eq!(payment.correlation_id, "abc");
        assert_eq!(payment.amount, 19.9);
        assert_eq!(payment.retry, 2);
    }

    #[test]
    fn test_parse_fields_retry_defaults_to_zero() {
        let payment = parse_fields(field("abc"), field("1"), None).unwrap();
        assert_eq!(payment.retry, 0);
    }

    #[test]
    fn test_parse_fields_rejects_missing_and_malformed() {
        assert!(matches!(
            parse_fields(None, field("1"), None),
            Err(RecordDecodeError::MissingField("correlationId"))
        ));
        assert!(matches!(
            parse_fields(field("abc"), None, None),
            Err(RecordDecodeError::MissingField("amount"))
        ));
        assert!(matches!(
            parse_fields(field("abc"), field("one"), None),
            Err(RecordDecodeError::Amount(_))
        ));
        assert!(matches!(
            parse_fields(field("abc"), field("1"), field("-1")),
            Err(RecordDecodeError::Retry(_))
        ));
    }
}
