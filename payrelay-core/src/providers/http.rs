//! HTTP client for one external payment processor.

use super::{ProviderClient, ProviderError, ProviderHealth};
use crate::entities::{PaymentRequest, ProviderName};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;

/// Per-request timeout applied to both submissions and health polls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Wire form of a payment submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitPaymentBody<'a> {
    correlation_id: &'a str,
    amount: f64,
    #[serde(with = "time::serde::rfc3339")]
    requested_at: OffsetDateTime,
}

/// reqwest-backed implementation of [`ProviderClient`].
pub struct HttpProvider {
    name: ProviderName,
    base_url: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(name: ProviderName, base_url: impl Into<String>) -> Self {
        Self {
            name,
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ProviderClient for HttpProvider {
    async fn submit(&self, payment: &PaymentRequest) -> Result<OffsetDateTime, ProviderError> {
        // Stamped before the call: this instant, not the reply time, is the
        // processing timestamp the ledger orders by.
        let requested_at = OffsetDateTime::now_utc();
        let body = SubmitPaymentBody {
            correlation_id: &payment.correlation_id,
            amount: payment.amount,
            requested_at,
        };

        let response = self
            .client
            .post(self.url("/payments"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(ProviderError::Unprocessable);
        }
        if !status.is_success() {
            return Err(ProviderError::BadStatus(status.as_u16()));
        }
        Ok(requested_at)
    }

    async fn health(&self) -> Result<ProviderHealth, ProviderError> {
        let response = self
            .client
            .get(self.url("/payments/service-health"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::BadStatus(status.as_u16()));
        }
        response
            .json::<ProviderHealth>()
            .await
            .map_err(ProviderError::Decode)
    }

    fn name(&self) -> ProviderName {
        self.name
    }
}
