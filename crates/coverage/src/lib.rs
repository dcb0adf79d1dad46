//! Coverage collector for the GTFS editor E2E suite
//!
//! Browser sessions POST their Istanbul coverage maps to
//! `/coverage/client`; the collector merges them into one aggregate that can
//! be fetched as JSON or downloaded as `coverage.tar.gz` for report tooling.

pub mod archive;
pub mod error;
pub mod server;
pub mod store;

pub use error::{CollectorError, Result};
pub use server::{router, serve, serve_listener};
pub use store::CoverageStore;
