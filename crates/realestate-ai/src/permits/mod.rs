//! Trakheesi permit verification with a per-number cache.

pub mod domain;
pub mod provider;
pub mod router;
pub mod service;

pub use domain::{is_well_formed, PermitRecord, PermitStatus, PERMIT_VALIDITY_DAYS};
pub use provider::{provider_for, DldPermitProvider, MockPermitProvider, PermitProvider};
pub use router::{permits_router, PermitError, PermitView, PERMIT_CHECK_ACTION};
pub use service::PermitService;
