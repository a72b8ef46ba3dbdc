//! Append-only NDJSON audit trail plus the admin export endpoint.

pub mod export;
pub mod logger;
pub mod middleware;

pub use export::audit_export_router;
pub use logger::{AuditError, AuditEvent, AuditLogger, AuditRecord};
pub use middleware::{audited, record_audit, AuditScope};
