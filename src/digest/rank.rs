//! Deduplication, ordering and projection of a folder's collected items.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};

use crate::digest::types::{DigestItem, DigestNode, SummaryCache};
use crate::feed::FeedItem;
use crate::util::hostname;

/// Default cap on items per digest node.
pub const DEFAULT_MAX_ITEMS: usize = 10;

/// Drops undated items and later duplicates.
///
/// An item is a duplicate when any *earlier* item in `items` has the same link,
/// or when both carry a guid and an earlier item's guid is equal. Earlier
/// items count even if they were dropped themselves, so the result depends
/// only on collection order.
pub fn dedup(items: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut seen_links: HashSet<String> = HashSet::with_capacity(items.len());
    let mut seen_guids: HashSet<String> = HashSet::with_capacity(items.len());

    items
        .into_iter()
        .filter(|item| {
            let link_seen = !seen_links.insert(item.link.clone());
            let guid_seen = match &item.guid {
                Some(guid) => !seen_guids.insert(guid.clone()),
                None => false,
            };
            item.published.is_some() && !link_seen && !guid_seen
        })
        .collect()
}

/// Sorts by publish time, newest first, and keeps at most `max_items`.
///
/// The sort is stable, so items with identical timestamps keep their
/// collection order.
pub fn rank(mut items: Vec<FeedItem>, max_items: usize) -> Vec<FeedItem> {
    items.sort_by(|a, b| b.published.cmp(&a.published));
    items.truncate(max_items);
    items
}

/// Picks the best available summary for `item`.
///
/// Precedence: cache entry for the link, `content:encoded`, Atom content,
/// Atom summary, description, then the empty string.
pub fn resolve_summary(cache: &SummaryCache, item: &FeedItem) -> String {
    if let Some(cached) = cache.get(&item.link) {
        return cached.to_string();
    }

    [
        &item.content_encoded,
        &item.atom_content,
        &item.atom_summary,
        &item.description,
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.is_empty())
    .cloned()
    .unwrap_or_default()
}

/// Author, hostname of the link, and the publish time formatted relative to
/// `now`: time of day when published on the same local day, otherwise the
/// date.
pub fn subheads<Tz>(item: &FeedItem, now: &DateTime<Tz>) -> Vec<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let host = hostname(&item.link);
    let when = item.published.map(|published| format_published(published, now));

    [item.author.clone(), host, when]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect()
}

fn format_published<Tz>(published: DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let local = published.with_timezone(&now.timezone());
    if local.date_naive() == now.date_naive() {
        local.format("%-I:%M:%S %p").to_string()
    } else {
        local.format("%-m/%-d/%Y").to_string()
    }
}

pub fn project<Tz>(item: FeedItem, cache: &SummaryCache, now: &DateTime<Tz>) -> DigestItem
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let summary = resolve_summary(cache, &item);
    let subheads = subheads(&item, now);
    DigestItem {
        title: item.title,
        link: item.link,
        summary,
        image: item.image.filter(|url| !url.is_empty()),
        subheads,
    }
}

/// Runs the full dedup → rank → project pipeline over one folder's items.
pub fn build_node<Tz>(
    title: &str,
    collected: Vec<FeedItem>,
    cache: &SummaryCache,
    max_items: usize,
    now: &DateTime<Tz>,
) -> DigestNode
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let collected_len = collected.len();
    let ranked = rank(dedup(collected), max_items);
    tracing::debug!(
        folder = %title,
        collected = collected_len,
        kept = ranked.len(),
        "Ranked folder items"
    );

    DigestNode {
        title: title.to_string(),
        items: ranked
            .into_iter()
            .map(|item| project(item, cache, now))
            .collect(),
    }
}
