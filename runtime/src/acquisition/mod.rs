//! HTTP acquisition: fetching documents and extracting structure from raw HTML.
//!
//! Everything here works without a browser. Screenshots live in
//! [`crate::capture`].

pub mod fetcher;
pub mod http_client;
pub mod structured;

pub use fetcher::{DocumentFetcher, FetchedDocument, HttpFetcher, MemoryFetcher};
pub use structured::{extract_snapshot, PageSnapshot};
