//! Processed-payment ledger backed by a Redis sorted set.
//!
//! Entries are scored by the microsecond instant the payment was submitted
//! to its provider, so range queries aggregate by processing time regardless
//! of the order ledger writes landed in.

use crate::entities::{unix_micros, ProcessedPayment};
use crate::store::{Store, StoreError};
use async_trait::async_trait;
use redis::AsyncCommands;
use time::OffsetDateTime;
use tracing::warn;

/// Sorted-set key holding processed payments.
const SUMMARY_KEY: &str = "payments-summary";

/// The processed-payment ledger contract.
#[async_trait]
pub trait ProcessedLedger: Send + Sync {
    /// Append one processed payment. The ledger is append-only; duplicate
    /// members collapse onto the latest score.
    async fn append(&self, payment: &ProcessedPayment) -> Result<(), StoreError>;

    /// Fetch every payment whose score lies in the inclusive range derived
    /// from the optional bounds (`None` means an open bound). Malformed
    /// members are logged and skipped.
    async fn range(
        &self,
        from: Option<OffsetDateTime>,
        to: Option<OffsetDateTime>,
    ) -> Result<Vec<ProcessedPayment>, StoreError>;
}

/// Map optional instants onto the store's score-range arguments.
fn score_range(from: Option<OffsetDateTime>, to: Option<OffsetDateTime>) -> (String, String) {
    let min = from.map_or_else(|| "-inf".to_string(), |t| unix_micros(t).to_string());
    let max = to.map_or_else(|| "+inf".to_string(), |t| unix_micros(t).to_string());
    (min, max)
}

/// Sorted-set implementation of [`ProcessedLedger`].
#[derive(Clone)]
pub struct RedisLedger {
    store: Store,
    key: String,
}

impl RedisLedger {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            key: SUMMARY_KEY.to_string(),
        }
    }
}

#[async_trait]
impl ProcessedLedger for RedisLedger {
    #[tracing::instrument(skip_all, err, name = "Redis:AppendProcessedPayment")]
    async fn append(&self, payment: &ProcessedPayment) -> Result<(), StoreError> {
        let mut conn = self.store.conn().await?;
        let _: i64 = conn
            .zadd(&self.key, payment.member(), payment.score())
            .await?;
        Ok(())
    }

    async fn range(
        &self,
        from: Option<OffsetDateTime>,
        to: Option<OffsetDateTime>,
    ) -> Result<Vec<ProcessedPayment>, StoreError> {
        let (min, max) = score_range(from, to);
        let mut conn = self.store.conn().await?;
        let members: Vec<(String, f64)> = conn
            .zrangebyscore_withscores(&self.key, min, max)
            .await?;

        let mut payments = Vec::with_capacity(members.len());
        for (member, score) in members {
            match ProcessedPayment::from_member(&member, score as i64) {
                Ok(payment) => payments.push(payment),
                Err(e) => warn!(member = %member, error = %e, "skipping malformed ledger member"),
            }
        }
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_score_range_open_bounds() {
        assert_eq!(
            score_range(None, None),
            ("-inf".to_string(), "+inf".to_string())
        );
    }

    #[test]
    fn test_score_range_partial_bounds() {
        let t = datetime!(1970-01-01 00:00:02 UTC);
        assert_eq!(
            score_range(Some(t), None),
            ("2000000".to_string(), "+inf".to_string())
        );
        assert_eq!(
            score_range(None, Some(t)),
            ("-inf".to_string(), "2000000".to_string())
        );
    }

    #[test]
    fn test_score_range_closed_bounds() {
        let from = datetime!(1970-01-01 00:00:01 UTC);
        let to = datetime!(1970-01-01 00:00:03 UTC);
        assert_eq!(
            score_range(Some(from), Some(to)),
            ("1000000".to_string(), "3000000".to_string())
        );
    }
}
