//! Ingress API handlers.
//!
//! # Endpoints
//!
//! - `POST /payments`         – accept a payment request for processing
//! - `GET  /payments-summary` – aggregate processed payments by provider
//! - `GET  /health`           – liveness probe
//! - `GET  /ready`            – readiness probe (checks the backing store)

use axum::{
    extract::rejection::JsonRejection,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use payrelay_core::entities::PaymentRequest;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::state::AppState;

/// Build the ingress router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", post(accept_payment))
        .route("/payments-summary", get(payments_summary))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
}

// ---------------------------------------------------------------------------
// Payment ingress
// ---------------------------------------------------------------------------

/// Body returned with the 202, echoing the accepted request.
#[derive(Serialize)]
struct PaymentAccepted {
    message: &'static str,
    data: PaymentRequest,
}

/// `POST /payments` — accept a payment request.
///
/// Replies 202 as soon as the enqueue has been scheduled; the queue append
/// itself happens on a detached task so ingress is never blocked by store
/// latency.
async fn accept_payment(
    state: State<AppState>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, IngressError> {
    let Json(payment) = payload.map_err(|e| IngressError::InvalidBody(e.body_text()))?;

    if !payment.amount.is_finite() || payment.amount < 0.0 {
        return Err(IngressError::InvalidAmount(payment.amount));
    }

    state.service.enqueue(payment.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(PaymentAccepted {
            message: "payment request received",
            data: payment,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Query bounds for the summary endpoint, both optional ISO-8601 instants.
#[derive(Debug, Deserialize)]
struct SummaryParams {
    from: Option<String>,
    to: Option<String>,
}

/// `GET /payments-summary?from=&to=` — aggregate the processed-payment
/// ledger over the inclusive range. Absent or empty bounds are open.
async fn payments_summary(
    state: State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<impl IntoResponse, IngressError> {
    let from = parse_bound("from", params.from.as_deref())?;
    let to = parse_bound("to", params.to.as_deref())?;

    let summary = state.service.get_summary(from, to).await;
    Ok(Json(summary))
}

fn parse_bound(
    param: &'static str,
    value: Option<&str>,
) -> Result<Option<OffsetDateTime>, IngressError> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    OffsetDateTime::parse(value, &Rfc3339)
        .map(Some)
        .map_err(|_| IngressError::InvalidBound {
            param,
            value: value.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

/// Liveness response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple liveness check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness response.
#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    store: &'static str,
}

/// Readiness check - verifies backing-store connectivity.
async fn ready_check(state: State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                store: "connected",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    status: "not_ready",
                    store: "disconnected",
                }),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in ingress handlers.
#[derive(Debug)]
enum IngressError {
    /// The request body could not be decoded as a payment request.
    InvalidBody(String),
    /// The amount was negative or not a finite number.
    InvalidAmount(f64),
    /// A summary bound was not a valid ISO-8601 instant.
    InvalidBound { param: &'static str, value: String },
}

/// Diagnostic body returned with 4xx responses.
#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

impl IntoResponse for IngressError {
    fn into_response(self) -> axum::response::Response {
        let message = match self {
            IngressError::InvalidBody(detail) => {
                format!("invalid payment request: {detail}")
            }
            IngressError::InvalidAmount(amount) => {
                format!("invalid payment request: amount {amount} is not a non-negative number")
            }
            IngressError::InvalidBound { param, value } => {
                format!("error while parsing '{param}' parameter with value {value:?}")
            }
        };
        (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
    }
}
