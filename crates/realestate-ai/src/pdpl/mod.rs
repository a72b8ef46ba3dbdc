//! UAE PDPL consent ledger and data-subject request handling.

pub mod consent;
pub mod dsr;
pub mod router;

pub use consent::{ConsentRecord, ConsentRepository, InMemoryConsentLedger};
pub use dsr::{DsrError, DsrService, SubjectAccess, SubjectView};
pub use router::{consent_router, dsr_router, DSR_ACTION, DSR_ROUTE_LABEL};
