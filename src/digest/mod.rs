//! Turning a feed tree into a ranked digest.
//!
//! [`Aggregator`] walks the tree and fetches leaves; [`rank`] holds the
//! dedup/ordering/projection rules applied once per top-level folder.

mod aggregate;
pub mod rank;
mod types;

pub use aggregate::Aggregator;
pub use rank::DEFAULT_MAX_ITEMS;
pub use types::{DigestItem, DigestNode, SummaryCache};
