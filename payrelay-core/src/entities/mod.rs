//! Domain and wire types shared across the gateway.

pub mod payment;

pub use payment::{
    from_unix_micros, unix_micros, MemberDecodeError, PaymentRequest, PaymentSummary,
    ProcessedPayment, ProviderName, ProviderSummary,
};
