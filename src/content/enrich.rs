use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::content::render::{RenderError, Renderer};
use crate::digest::{DigestNode, SummaryCache};
use crate::util::AddressPolicy;

/// Summaries at least this many characters long are never scraped.
pub const DEFAULT_MIN_SUMMARY_LEN: usize = 1000;

/// Element holding the article body on most news sites.
pub const DEFAULT_CONTENT_SELECTOR: &str = r#"[itemprop="articleBody"]"#;

/// Replaces short digest summaries with article bodies scraped from the
/// rendered page.
pub struct Enricher {
    renderer: Option<Arc<dyn Renderer>>,
    selector: String,
    min_summary_len: usize,
    timeout: Duration,
    policy: AddressPolicy,
}

impl Enricher {
    /// `renderer: None` disables scraping; the enricher then only rebuilds
    /// the summary cache from the digest.
    pub fn new(
        renderer: Option<Arc<dyn Renderer>>,
        selector: impl Into<String>,
        min_summary_len: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            renderer,
            selector: selector.into(),
            min_summary_len,
            timeout,
            policy: AddressPolicy::default(),
        }
    }

    /// Sets which hosts article pages may be opened on.
    pub fn with_address_policy(mut self, policy: AddressPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enriches every node and returns the rewritten digest with the summary
    /// cache for the next cycle.
    ///
    /// Nodes run concurrently; items within a node run one at a time in rank
    /// order. Links already present in `prior` are reused without rendering.
    pub async fn enrich(
        &self,
        digest: Vec<DigestNode>,
        prior: &SummaryCache,
    ) -> (Vec<DigestNode>, SummaryCache) {
        let results = join_all(
            digest
                .into_iter()
                .map(|node| self.enrich_node(node, prior)),
        )
        .await;

        let mut cache = SummaryCache::new();
        let mut nodes = Vec::with_capacity(results.len());
        for (node, partial) in results {
            cache.merge(partial);
            nodes.push(node);
        }

        tracing::info!(cached = cache.len(), "Feed summaries updated");
        (nodes, cache)
    }

    async fn enrich_node(
        &self,
        mut node: DigestNode,
        prior: &SummaryCache,
    ) -> (DigestNode, SummaryCache) {
        let mut partial = SummaryCache::new();

        for item in node.items.iter_mut() {
            let short = item.summary.chars().count() < self.min_summary_len;
            if short && !prior.contains(&item.link) {
                if let Some(renderer) = &self.renderer {
                    if let Some(body) = self.scrape(renderer.as_ref(), &item.link).await {
                        item.summary = body;
                    }
                }
            }

            if let Some(old) = prior.get(&item.link) {
                partial.insert_if_better(item.link.clone(), old.to_string());
            }
            partial.insert_if_better(item.link.clone(), item.summary.clone());
        }

        tracing::debug!(folder = %node.title, items = node.items.len(), "Node enriched");
        (node, partial)
    }

    /// Returns the trimmed-non-empty article body at `link`, or `None` on any
    /// failure. The page is closed on every path.
    async fn scrape(&self, renderer: &dyn Renderer, link: &str) -> Option<String> {
        // SEC-001: Validate URL before handing it to the browser
        if let Err(e) = self.policy.validate(link) {
            tracing::debug!(url = %link, error = %e, "Not scraping invalid article URL");
            return None;
        }

        let page = match tokio::time::timeout(self.timeout, renderer.new_page()).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                tracing::warn!(url = %link, error = %e, "Failed to open page");
                return None;
            }
            Err(_) => {
                tracing::warn!(url = %link, "Timed out opening page");
                return None;
            }
        };

        let extracted = tokio::time::timeout(self.timeout, async {
            page.goto(link).await?;
            page.inner_html(&self.selector).await
        })
        .await
        .unwrap_or(Err(RenderError::Timeout));

        match tokio::time::timeout(self.timeout, page.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(url = %link, error = %e, "Failed to close page"),
            Err(_) => tracing::debug!(url = %link, "Timed out closing page"),
        }

        match extracted {
            Ok(Some(body)) if !body.trim().is_empty() => {
                tracing::debug!(url = %link, len = body.len(), "Scraped article body");
                Some(body)
            }
            Ok(_) => {
                tracing::debug!(url = %link, "No article body found");
                None
            }
            Err(e) => {
                tracing::warn!(url = %link, error = %e, "Scrape failed");
                None
            }
        }
    }
}
