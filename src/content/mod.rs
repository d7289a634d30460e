//! Article content: headless rendering and summary enrichment.
//!
//! - `render` - the [`Renderer`] seam and its Chromium implementation
//! - `enrich` - replaces short feed summaries with scraped article bodies

mod enrich;
mod render;

pub use enrich::{Enricher, DEFAULT_CONTENT_SELECTOR, DEFAULT_MIN_SUMMARY_LEN};
pub use render::{ChromeRenderer, RenderError, RenderedPage, Renderer};
