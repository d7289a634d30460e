//! Feed retrieval: the OPML subscription tree and individual RSS/Atom feeds.
//!
//! - `opml` - OPML retrieval and parsing into a [`FeedNode`] tree
//! - `parser` - feed document parsing using the `feed-rs` crate
//! - `fetcher` - concurrent HTTP fetching that never fails its caller
//!
//! # Example
//!
//! ```ignore
//! use feedpage::feed::{build_client, fetch_opml, FeedFetcher};
//!
//! let client = build_client("feedpage")?;
//! let tree = fetch_opml(&client, "https://example.com/feeds.opml", timeout).await?;
//! let fetcher = FeedFetcher::new(client, 256, timeout);
//! let items = fetcher.fetch("https://example.com/rss").await;
//! ```

mod fetcher;
mod opml;
mod parser;

pub use fetcher::{build_client, FeedFetcher, FetchError};
pub use opml::{fetch_opml, parse_opml, FeedNode, OpmlError};
pub use parser::{parse_feed, FeedItem, ParseResult};
