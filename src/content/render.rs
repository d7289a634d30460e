use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("Navigation failed: {0}")]
    Navigation(String),
    #[error("Content extraction failed: {0}")]
    Evaluation(String),
    #[error("Page operation timed out")]
    Timeout,
    #[error("Invalid URL")]
    InvalidUrl,
}

/// A source of rendering sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Opens a fresh blank page. The caller must [`close`](RenderedPage::close) it.
    async fn new_page(&self) -> Result<Box<dyn RenderedPage>, RenderError>;
}

/// One open page of a [`Renderer`].
#[async_trait]
pub trait RenderedPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), RenderError>;

    /// Returns the `innerHTML` of the first element matching `selector`, or
    /// `None` when nothing matches.
    async fn inner_html(&self, selector: &str) -> Result<Option<String>, RenderError>;

    /// Releases the page. Safe to call after a failed navigation.
    async fn close(self: Box<Self>) -> Result<(), RenderError>;
}

/// Headless Chromium driven over the DevTools protocol.
pub struct ChromeRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromeRenderer {
    pub async fn launch(
        executable: Option<PathBuf>,
        request_timeout: Duration,
    ) -> Result<Self, RenderError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(request_timeout);
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        // The handler must be polled for the browser connection to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "Browser handler error");
                }
            }
        });

        tracing::info!("Headless browser launched");
        Ok(Self { browser, handler })
    }

    /// Shuts the browser process down.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!(error = %e, "Failed to close browser");
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(error = %e, "Failed waiting for browser exit");
        }
        self.handler.abort();
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn new_page(&self) -> Result<Box<dyn RenderedPage>, RenderError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        Ok(Box::new(ChromePage { page }))
    }
}

struct ChromePage {
    page: Page,
}

#[async_trait]
impl RenderedPage for ChromePage {
    async fn goto(&self, url: &str) -> Result<(), RenderError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn inner_html(&self, selector: &str) -> Result<Option<String>, RenderError> {
        let selector =
            serde_json::to_string(selector).map_err(|e| RenderError::Evaluation(e.to_string()))?;
        let script = format!(
            "(() => {{ const el = document.querySelector({selector}); return el ? el.innerHTML : null; }})()"
        );

        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| RenderError::Evaluation(e.to_string()))?;
        Ok(result
            .value()
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    async fn close(self: Box<Self>) -> Result<(), RenderError> {
        let ChromePage { page } = *self;
        page.close()
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))
    }
}
