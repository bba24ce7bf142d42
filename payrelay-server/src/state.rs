//! Application state shared across all request handlers.

use payrelay_core::service::PaymentService;
use payrelay_core::store::Store;
use std::sync::Arc;

/// State handed to every handler. Cloneable and cheap to pass around.
#[derive(Clone)]
pub struct AppState {
    /// The payment service backing ingress and summary reads.
    pub service: Arc<PaymentService>,
    /// Backing-store handle, used by the readiness probe.
    pub store: Store,
}

impl AppState {
    pub fn new(store: Store, service: Arc<PaymentService>) -> Self {
        Self { service, store }
    }
}
