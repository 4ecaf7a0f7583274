//! Access to the external, rate-limited schedule service.
//!
//! [`Fetcher`] is the per-unit capability the batch fetcher drives; the
//! bundled [`HttpFetcher`] implements it over `reqwest` and delegates the
//! structural extraction of rows to a [`RecordExtractor`].

pub mod client;
pub mod types;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

pub use client::HttpFetcher;
pub use types::RawRecord;

/// Fetches one unit address and extracts its raw records.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_and_extract(
        &self,
        cancel: &CancellationToken,
        address: &str,
    ) -> Result<Vec<RawRecord>, FetchError>;
}

/// Turns a fetched page body into raw records.
pub trait RecordExtractor: Send + Sync {
    /// Returns a human-readable reason when the body has no recognisable
    /// schedule structure.
    fn extract(&self, body: &str) -> Result<Vec<RawRecord>, String>;
}
