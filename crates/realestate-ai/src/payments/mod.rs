//! Stripe Connect onboarding, escrowed checkout with AML screening, and the
//! admin payment dashboard.

pub mod compliance;
pub mod domain;
pub mod gateway;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use compliance::{aml_check, log_compliance};
pub use domain::{AmlReason, AmlResult, PaymentRecord, PaymentStatus, PaymentView};
pub use gateway::{
    BankEscrowClient, EscrowGateway, EscrowHold, GatewayError, StripeClient, StripeGateway,
};
pub use repository::{InMemoryPaymentRepository, PaymentRepository};
pub use router::payments_router;
pub use service::{PaymentDeps, PaymentError, PaymentService};
