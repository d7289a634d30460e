//! # feedpage
//!
//! Aggregates the RSS/Atom feeds listed in an OPML outline into a ranked,
//! deduplicated, summarized digest, refreshed on a fixed interval and served
//! over HTTP.
//!
//! ```text
//! OPML → Aggregator (fetch + dedup + rank) → Enricher (scrape short summaries) → StateStore → HTTP
//! ```
//!
//! - [`feed`]: OPML tree, feed fetching and parsing
//! - [`digest`]: tree aggregation and ranking rules
//! - [`content`]: headless rendering and summary enrichment
//! - [`refresh`]: the scheduler and the published state
//! - [`server`]: the `/data` endpoint and static files
//! - [`config`]: layered configuration

pub mod config;
pub mod content;
pub mod digest;
pub mod feed;
pub mod refresh;
pub mod server;
pub mod util;
