use std::time::Duration;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::feed::fetcher::{read_limited_bytes, FetchError};

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
/// Prevents stack overflow attacks from maliciously crafted deeply nested OPMLs.
const MAX_OPML_DEPTH: usize = 50;

const MAX_OPML_SIZE: usize = 5 * 1024 * 1024; // 5MB

const DEFAULT_ROOT_TITLE: &str = "Feeds";

/// Errors that can occur while retrieving or parsing the OPML outline.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("OPML request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OPML request returned status {0}")]
    HttpStatus(u16),

    #[error("OPML request timed out")]
    Timeout,

    #[error("OPML document too large")]
    TooLarge,
}

/// A node of the subscription tree.
///
/// Outlines with nested outlines become folders; childless outlines become
/// leaves. `xml_url` is taken verbatim; the fetcher decides whether it may
/// be requested.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedNode {
    Folder {
        title: String,
        children: Vec<FeedNode>,
    },
    Leaf {
        title: String,
        /// The outline's `type` attribute, e.g. `rss`.
        kind: Option<String>,
        xml_url: Option<String>,
    },
}

impl FeedNode {
    pub fn title(&self) -> &str {
        match self {
            FeedNode::Folder { title, .. } | FeedNode::Leaf { title, .. } => title,
        }
    }

    /// Convenience constructor for an `rss` leaf.
    pub fn rss(title: impl Into<String>, xml_url: impl Into<String>) -> Self {
        FeedNode::Leaf {
            title: title.into(),
            kind: Some("rss".to_string()),
            xml_url: Some(xml_url.into()),
        }
    }

    pub fn folder(title: impl Into<String>, children: Vec<FeedNode>) -> Self {
        FeedNode::Folder {
            title: title.into(),
            children,
        }
    }
}

/// Retrieves the OPML document at `url` and parses it into a tree.
pub async fn fetch_opml(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<FeedNode, OpmlError> {
    tracing::debug!(url = %url, "Fetching OPML");

    let response = tokio::time::timeout(timeout, client.get(url).send())
        .await
        .map_err(|_| OpmlError::Timeout)??;

    if !response.status().is_success() {
        return Err(OpmlError::HttpStatus(response.status().as_u16()));
    }
    let bytes = tokio::time::timeout(timeout, read_limited_bytes(response, MAX_OPML_SIZE))
        .await
        .map_err(|_| OpmlError::Timeout)?
        .map_err(|e| match e {
            FetchError::ResponseTooLarge => OpmlError::TooLarge,
            FetchError::Network(e) => OpmlError::Http(e),
            other => OpmlError::XmlParse(other.to_string()),
        })?;
    let body = String::from_utf8(bytes)
        .map_err(|e| OpmlError::XmlParse(format!("OPML is not valid UTF-8: {e}")))?;

    parse_opml(&body)
}

/// An outline whose end tag has not been seen yet.
struct PendingOutline {
    title: String,
    kind: Option<String>,
    xml_url: Option<String>,
    children: Vec<FeedNode>,
}

impl PendingOutline {
    fn finish(self) -> FeedNode {
        if self.children.is_empty() && (self.xml_url.is_some() || self.kind.is_some()) {
            FeedNode::Leaf {
                title: self.title,
                kind: self.kind,
                xml_url: self.xml_url,
            }
        } else if self.children.is_empty() {
            // A bare outline with neither type nor feed URL is an empty folder.
            FeedNode::Folder {
                title: self.title,
                children: Vec::new(),
            }
        } else {
            FeedNode::Folder {
                title: self.title,
                children: self.children,
            }
        }
    }
}

/// Parses OPML content into a tree rooted at a folder titled after
/// `<head><title>`.
///
/// SEC-002: XXE protection: quick-xml (0.37) never parses `<!ENTITY>`
/// declarations. Custom entities such as `&xxe;` fail in
/// `decode_and_unescape_value()` with an unrecognized-entity error.
pub fn parse_opml(content: &str) -> Result<FeedNode, OpmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut root_title: Option<String> = None;
    let mut in_head_title = false;
    let mut roots: Vec<FeedNode> = Vec::new();
    // Open outlines; its length is the current nesting depth.
    let mut stack: Vec<PendingOutline> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                if stack.len() >= MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }
                stack.push(parse_outline_attributes(&e, &reader)?);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                let node = parse_outline_attributes(&e, &reader)?.finish();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => roots.push(node),
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                if let Some(done) = stack.pop() {
                    let node = done.finish();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => roots.push(node),
                    }
                }
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"title" && stack.is_empty() => {
                in_head_title = true;
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"title" => {
                in_head_title = false;
            }
            Ok(Event::Text(t)) if in_head_title && root_title.is_none() => {
                let text = t
                    .unescape()
                    .map_err(|e| OpmlError::XmlParse(e.to_string()))?;
                root_title = Some(text.trim().to_string());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(OpmlError::XmlParse("unclosed outline element".to_string()));
    }

    Ok(FeedNode::Folder {
        title: root_title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_ROOT_TITLE.to_string()),
        children: roots,
    })
}

fn parse_outline_attributes(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<PendingOutline, OpmlError> {
    let mut xml_url = None;
    let mut kind = None;
    let mut title = None;
    let mut text = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = || {
            attr.decode_and_unescape_value(reader.decoder())
                .map(|v| v.to_string())
                .map_err(|e| OpmlError::XmlParse(e.to_string()))
        };
        match attr.key.as_ref() {
            b"xmlUrl" | b"xmlurl" => xml_url = Some(value()?),
            b"type" => kind = Some(value()?),
            b"title" => title = Some(value()?),
            b"text" => text = Some(value()?),
            _ => {}
        }
    }

    // Address policy is enforced by the fetcher, not here
    let xml_url = xml_url.map(|url| url.trim().to_string()).filter(|url| !url.is_empty());

    let title = title
        .or(text)
        .or_else(|| xml_url.clone())
        .unwrap_or_default();

    Ok(PendingOutline {
        title,
        kind,
        xml_url,
        children: Vec::new(),
    })
}
