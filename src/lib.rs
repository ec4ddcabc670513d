//! HR dashboard reporting engine.
//!
//! Sheets arrive from spreadsheet scripts as JSON 2-D arrays. They are
//! normalized into typed records, filtered, aggregated and shaped into the
//! view models of each dashboard page.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod fetch;
pub mod filter;
pub mod models;
pub mod present;
pub mod rate;
pub mod reports;
pub mod session;
pub mod table;
