//! Payment request, processed-payment, and summary types.
//!
//! `ProcessedPayment` also owns the ledger member encoding: the compact
//! `"correlationId:amount:provider"` string stored in the sorted set, with
//! the processing instant carried by the set score rather than the member.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::OffsetDateTime;

/// A payment intent accepted at the ingress and carried on the queue.
///
/// The retry counter travels inside the payload so workers stay stateless;
/// the queue is the single source of truth for attempt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Opaque client-chosen identifier, used as the idempotency key at the
    /// external processor.
    pub correlation_id: String,
    /// Non-negative amount in the gateway's single currency.
    pub amount: f64,
    /// Attempt counter, 0 on first acceptance.
    #[serde(default)]
    pub retry: u32,
}

/// Identity of an external payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Default,
    Fallback,
}

impl ProviderName {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderName::Default => "default",
            ProviderName::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = MemberDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(ProviderName::Default),
            "fallback" => Ok(ProviderName::Fallback),
            other => Err(MemberDecodeError::UnknownProvider(other.to_string())),
        }
    }
}

/// Errors produced when decoding a ledger member back into a payment.
#[derive(Debug, Error)]
pub enum MemberDecodeError {
    /// The member did not have the `id:amount:provider` shape.
    #[error("malformed ledger member")]
    Malformed,

    /// The amount segment was not a decimal number.
    #[error("invalid amount in ledger member: {0}")]
    Amount(#[from] std::num::ParseFloatError),

    /// The provider segment named neither known processor.
    #[error("unknown provider in ledger member: {0:?}")]
    UnknownProvider(String),

    /// The set score did not map to a representable instant.
    #[error("ledger score out of range: {0}")]
    Score(i64),
}

/// A payment that one of the providers accepted.
///
/// `processed_at` is the instant stamped on the submission to the provider,
/// not the time of the ledger write.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedPayment {
    pub correlation_id: String,
    pub amount: f64,
    pub provider: ProviderName,
    pub processed_at: OffsetDateTime,
}

impl ProcessedPayment {
    /// Encode the sorted-set member. The amount is fixed to two decimal
    /// places; the timestamp is deliberately omitted and recovered from the
    /// score.
    pub fn member(&self) -> String {
        format!(
            "{}:{:.2}:{}",
            self.correlation_id, self.amount, self.provider
        )
    }

    /// The sorted-set score: microseconds since the Unix epoch.
    pub fn score(&self) -> i64 {
        unix_micros(self.processed_at)
    }

    /// Decode a member string plus its score back into a payment.
    ///
    /// Splits from the right, so a correlation id containing `:` still
    /// round-trips.
    pub fn from_member(member: &str, score: i64) -> Result<Self, MemberDecodeError> {
        let mut parts = member.rsplitn(3, ':');
        let provider = parts.next().ok_or(MemberDecodeError::Malformed)?;
        let amount = parts.next().ok_or(MemberDecodeError::Malformed)?;
        let correlation_id = parts.next().ok_or(MemberDecodeError::Malformed)?;

        Ok(Self {
            correlation_id: correlation_id.to_string(),
            amount: amount.parse::<f64>()?,
            provider: provider.parse::<ProviderName>()?,
            processed_at: from_unix_micros(score).ok_or(MemberDecodeError::Score(score))?,
        })
    }
}

/// Per-provider aggregation bucket returned by the summary endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub total_requests: u64,
    pub total_amount: f64,
}

/// Point-in-time summary of processed payments, grouped by provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub default: ProviderSummary,
    pub fallback: ProviderSummary,
}

impl PaymentSummary {
    /// Fold one processed payment into the matching provider bucket.
    pub fn record(&mut self, payment: &ProcessedPayment) {
        let bucket = match payment.provider {
            ProviderName::Default => &mut self.default,
            ProviderName::Fallback => &mut self.fallback,
        };
        bucket.total_requests += 1;
        bucket.total_amount += payment.amount;
    }
}

/// Microseconds since the Unix epoch for the given instant.
pub fn unix_micros(instant: OffsetDateTime) -> i64 {
    (instant.unix_timestamp_nanos() / 1_000) as i64
}

/// Recover an instant from a microsecond score, if representable.
pub fn from_unix_micros(micros: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000).ok()
}
