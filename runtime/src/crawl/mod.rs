//! Site discovery: URL normalization, link extraction, page classification,
//! bounded crawling, and backlink counting.

pub mod backlinks;
pub mod classifier;
pub mod crawler;
pub mod links;
pub mod urls;

pub use backlinks::{calculate_backlinks, LinkSet};
pub use crawler::{apply_backlinks, CrawledPage, Crawler};
