//! Listing search: SQLite full-text and geo queries, facets, a result cache,
//! and the PDPL consent gate in front of every read.

pub mod consent_gate;
pub mod migrations;
pub mod query;
pub mod router;
pub mod store;

pub use consent_gate::{
    ConsentError, ConsentGate, ConsentLookup, ConsentSource, HttpConsentSource,
    LedgerConsentSource,
};
pub use query::{GeoPoint, SearchParams, SearchQueryBuilder, SortOrder};
pub use router::{search_router, SearchCache, SearchState, ADMIN_KEY_HEADER, USER_HEADER};
pub use store::{
    demo_listings, haversine_km, upsert_listing, Facets, ListingRecord, ListingStore, NewListing,
    SearchError, SearchItem, SearchPage, UpsertOutcome,
};
