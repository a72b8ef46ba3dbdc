//! Backend building blocks for the RealEstate AI marketplace: permit checks,
//! listing copy, search and ingestion, escrow payments and PDPL workflows.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod i18n;
pub mod ingestion;
pub mod listing_writer;
pub mod marketing;
pub mod moderation;
pub mod payments;
pub mod pdpl;
pub mod permits;
pub mod search;
pub mod telemetry;
