//! Permit-gated listing copy generation.

pub mod router;
pub mod service;

pub use router::listing_writer_router;
pub use service::{ListingDraft, ListingRequest, ListingWriterError, ListingWriterService};
