use chrono::Local;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;

use crate::digest::rank::build_node;
use crate::digest::types::{DigestNode, SummaryCache};
use crate::feed::{FeedFetcher, FeedItem, FeedNode};

/// Outline `type` recognized as a fetchable feed.
const FEED_KIND: &str = "rss";

/// Walks a subscription tree and produces one [`DigestNode`] per top-level
/// folder.
#[derive(Clone)]
pub struct Aggregator {
    fetcher: FeedFetcher,
    max_items: usize,
}

impl Aggregator {
    pub fn new(fetcher: FeedFetcher, max_items: usize) -> Self {
        Self { fetcher, max_items }
    }

    /// Aggregates every folder directly under `tree`, in document order.
    ///
    /// Leaves directly under the root have no folder to land in and are
    /// ignored. A root that is not a folder yields an empty digest. This never
    /// fails: unreachable or broken feeds contribute no items.
    pub async fn aggregate(&self, cache: &SummaryCache, tree: &FeedNode) -> Vec<DigestNode> {
        let FeedNode::Folder { children, .. } = tree else {
            tracing::warn!(title = %tree.title(), "Feed tree root is not a folder");
            return Vec::new();
        };

        let now = Local::now();
        let folders = children.iter().filter_map(|child| match child {
            FeedNode::Folder { title, .. } => Some((title, child)),
            FeedNode::Leaf { title, .. } => {
                tracing::debug!(title = %title, "Ignoring feed outside any folder");
                None
            }
        });

        join_all(folders.map(|(title, folder)| async move {
            tracing::info!(folder = %title, "Loading folder");
            let collected = self.collect(folder).await;
            let node = build_node(title, collected, cache, self.max_items, &now);
            tracing::info!(folder = %title, items = node.items.len(), "Done loading folder");
            node
        }))
        .await
    }

    /// Gathers every descendant leaf's items under `node`.
    ///
    /// Children are fetched concurrently but concatenated in document order,
    /// so "earlier" during dedup means earlier in the outline, not first to
    /// finish.
    fn collect<'a>(&'a self, node: &'a FeedNode) -> BoxFuture<'a, Vec<FeedItem>> {
        async move {
            match node {
                FeedNode::Folder { children, .. } => {
                    join_all(children.iter().map(|child| self.collect(child)))
                        .await
                        .into_iter()
                        .flatten()
                        .collect()
                }
                FeedNode::Leaf {
                    kind: Some(kind),
                    xml_url: Some(url),
                    ..
                } if kind.eq_ignore_ascii_case(FEED_KIND) => self.fetcher.fetch(url).await,
                FeedNode::Leaf { title, .. } => {
                    tracing::debug!(title = %title, "Skipping outline without a fetchable feed");
                    Vec::new()
                }
            }
        }
        .boxed()
    }
}
