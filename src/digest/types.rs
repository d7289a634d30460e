use std::collections::HashMap;

use serde::Serialize;

/// The user-facing projection of one feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestItem {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub image: Option<String>,
    /// Author, source hostname and formatted publish time, empty values omitted.
    pub subheads: Vec<String>,
}

/// One ranked, deduplicated item list per top-level folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestNode {
    pub title: String,
    pub items: Vec<DigestItem>,
}

/// Previously resolved summaries keyed by article link.
///
/// A published cache is never mutated; each refresh builds a new one and the
/// scheduler swaps it in whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryCache {
    entries: HashMap<String, String>,
}

impl SummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached summary for `link`, ignoring empty entries.
    pub fn get(&self, link: &str) -> Option<&str> {
        self.entries
            .get(link)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn contains(&self, link: &str) -> bool {
        self.get(link).is_some()
    }

    /// Records `summary` for `link` unless the existing entry is longer.
    ///
    /// Returns `true` when the entry was written.
    pub fn insert_if_better(&mut self, link: String, summary: String) -> bool {
        match self.entries.get(&link) {
            Some(existing) if existing.chars().count() > summary.chars().count() => false,
            _ => {
                self.entries.insert(link, summary);
                true
            }
        }
    }

    /// Folds `other` into `self` with [`insert_if_better`](Self::insert_if_better)
    /// semantics.
    pub fn merge(&mut self, other: SummaryCache) {
        for (link, summary) in other.entries {
            self.insert_if_better(link, summary);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for SummaryCache {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut cache = SummaryCache::new();
        for (link, summary) in iter {
            cache.insert_if_better(link, summary);
        }
        cache
    }
}
