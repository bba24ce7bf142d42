//! External payment-processor clients.
//!
//! Two processors exist with an identical surface, so the integration is a
//! small capability trait plus one HTTP implementation parameterized by
//! identity and base URL.

pub mod http;

pub use http::HttpProvider;

use crate::entities::{PaymentRequest, ProviderName};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Momentary health observation reported by a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    /// Availability flag reported by the processor itself.
    pub failing: bool,
    /// Latency floor in milliseconds.
    pub min_response_time: i64,
}

/// Errors surfaced by provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The processor rejected the payment with 422; terminal for this
    /// attempt against this provider.
    #[error("provider rejected payment as unprocessable")]
    Unprocessable,

    /// Network failure or the 2-second request timeout.
    #[error("provider transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Any non-2xx status other than 422.
    #[error("unexpected provider status code: {0}")]
    BadStatus(u16),

    /// The response body could not be decoded.
    #[error("failed to decode provider response: {0}")]
    Decode(reqwest::Error),
}

/// Capability surface of one external payment processor.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Submit a payment. On success returns the `requestedAt` instant that
    /// was stamped on the submission, which is what the ledger records.
    async fn submit(&self, payment: &PaymentRequest) -> Result<OffsetDateTime, ProviderError>;

    /// Poll the processor's service-health endpoint.
    async fn health(&self) -> Result<ProviderHealth, ProviderError>;

    /// This processor's identity.
    fn name(&self) -> ProviderName;
}
