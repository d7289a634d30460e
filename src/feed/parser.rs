use anyhow::Result;
use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, FeedType};
use feed_rs::parser;

/// One entry from a parsed RSS/Atom document.
///
/// The four raw summary fields are kept apart so that digest projection can
/// apply its own precedence between them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    pub title: String,
    /// Canonical identifier used for deduplication.
    pub link: String,
    pub guid: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub image: Option<String>,
    /// RSS `content:encoded`
    pub content_encoded: Option<String>,
    /// Atom `<content>`
    pub atom_content: Option<String>,
    /// Atom `<summary>`
    pub atom_summary: Option<String>,
    /// RSS `<description>`
    pub description: Option<String>,
}

/// Result of parsing a feed document.
pub struct ParseResult {
    pub items: Vec<FeedItem>,
    /// Number of entries dropped because they carried no usable link.
    pub skipped: usize,
}

pub fn parse_feed(bytes: &[u8]) -> Result<ParseResult> {
    let feed = parser::parse(bytes)?;
    let is_atom = matches!(feed.feed_type, FeedType::Atom);

    let mut skipped = 0;
    let items = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let item = convert_entry(entry, is_atom);
            if item.is_none() {
                skipped += 1;
            }
            item
        })
        .collect();

    Ok(ParseResult { items, skipped })
}

fn convert_entry(entry: Entry, is_atom: bool) -> Option<FeedItem> {
    let link = pick_link(&entry)?;

    let guid = {
        let trimmed = entry.id.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };
    let published = entry.published.or(entry.updated);
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_else(|| "Untitled".to_string());
    let author = entry
        .authors
        .first()
        .map(|p| p.name.trim().to_string())
        .filter(|name| !name.is_empty());
    let image = pick_image(&entry);

    let content = entry.content.and_then(|c| c.body).filter(|s| !s.is_empty());
    let summary = entry.summary.map(|s| s.content).filter(|s| !s.is_empty());

    // feed-rs folds content:encoded and Atom <content> into `content`, and
    // <description> and Atom <summary> into `summary`.
    let (content_encoded, atom_content, atom_summary, description) = if is_atom {
        (None, content, summary, None)
    } else {
        (content, None, None, summary)
    };

    Some(FeedItem {
        title,
        link,
        guid,
        published,
        author,
        image,
        content_encoded,
        atom_content,
        atom_summary,
        description,
    })
}

fn pick_link(entry: &Entry) -> Option<String> {
    let alternate = entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty());

    alternate.or_else(|| {
        let id = entry.id.trim();
        (id.starts_with("http://") || id.starts_with("https://")).then(|| id.to_string())
    })
}

fn pick_image(entry: &Entry) -> Option<String> {
    let thumbnail = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .next();

    thumbnail.or_else(|| {
        entry
            .media
            .iter()
            .flat_map(|m| m.content.iter())
            .find(|c| {
                c.content_type
                    .as_ref()
                    .is_some_and(|mime| mime.as_str().starts_with("image/"))
            })
            .and_then(|c| c.url.as_ref().map(|u| u.to_string()))
    })
}
