//! Integration tests for refresh cycles and what the HTTP layer serves
//! afterwards.
//!
//! OPML and feeds are served by wiremock on loopback, so the fetcher is
//! allowed to reach private addresses. Article links stay public.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use feedpage::content::{Enricher, RenderError, RenderedPage, Renderer};
use feedpage::digest::Aggregator;
use feedpage::feed::{build_client, FeedFetcher};
use feedpage::refresh::{OpmlSource, RefreshError, RefreshPhase, Scheduler};
use feedpage::server::{router, AppState};
use feedpage::util::AddressPolicy;
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OPML: &str = r#"<?xml version="1.0"?>
<opml version="2.0">
  <head><title>Subscriptions</title></head>
  <body>
    <outline text="Tech"/>
    <outline text="News"></outline>
  </body>
</opml>"#;

/// Counts pages opened and returns a canned article body for every link.
#[derive(Default)]
struct CountingRenderer {
    opened: AtomicUsize,
}

#[derive(Default)]
struct ArticlePage {
    url: Mutex<Option<String>>,
}

#[async_trait]
impl Renderer for CountingRenderer {
    async fn new_page(&self) -> Result<Box<dyn RenderedPage>, RenderError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ArticlePage::default()))
    }
}

#[async_trait]
impl RenderedPage for ArticlePage {
    async fn goto(&self, url: &str) -> Result<(), RenderError> {
        *self.url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn inner_html(&self, _selector: &str) -> Result<Option<String>, RenderError> {
        let url = self.url.lock().unwrap().clone();
        Ok(url.map(|url| format!("<p>Full text of {url}</p>")))
    }

    async fn close(self: Box<Self>) -> Result<(), RenderError> {
        Ok(())
    }
}

fn scheduler_with(
    opml_url: String,
    opml_timeout: Duration,
    renderer: Option<Arc<dyn Renderer>>,
) -> Scheduler {
    let client = build_client("feedpage-test").unwrap();
    let fetcher = FeedFetcher::new(client.clone(), 8, Duration::from_secs(5))
        .with_address_policy(AddressPolicy::AllowPrivate);
    Scheduler::new(
        client,
        OpmlSource {
            url: opml_url,
            timeout: opml_timeout,
        },
        Aggregator::new(fetcher, 10),
        Enricher::new(renderer, "article", 1000, Duration::from_secs(5)),
        Duration::from_secs(60),
    )
}

fn scheduler(opml_url: String) -> Scheduler {
    scheduler_with(opml_url, Duration::from_secs(5), None)
}

async fn mount_opml(server: &MockServer, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path("/feeds.opml"))
        .respond_with(ResponseTemplate::new(status).set_body_string(OPML))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

fn rss(items: &[(&str, &str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, link, date)| {
            format!(
                "<item><title>{title}</title><link>{link}</link>\
                 <pubDate>{date}</pubDate><description>about {title}</description></item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Feed</title>{body}</channel></rss>"#
    )
}

async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

// ============================================================================
// Full cycles
// ============================================================================

#[tokio::test]
async fn test_cycle_fetches_listed_feeds_and_reuses_scraped_summaries() {
    let server = MockServer::start().await;
    let opml = format!(
        r#"<?xml version="1.0"?>
<opml version="2.0">
  <head><title>Subscriptions</title></head>
  <body>
    <outline text="Tech">
      <outline type="rss" text="A" xmlUrl="{uri}/a.xml"/>
      <outline text="Nested">
        <outline type="rss" text="B" xmlUrl="{uri}/b.xml"/>
      </outline>
    </outline>
  </body>
</opml>"#,
        uri = server.uri()
    );
    serve(&server, "/feeds.opml", opml).await;
    serve(
        &server,
        "/a.xml",
        rss(&[("X", "https://x.example/x", "Tue, 10 Jun 2025 08:00:00 GMT")]),
    )
    .await;
    serve(
        &server,
        "/b.xml",
        rss(&[
            ("X", "https://x.example/x", "Tue, 10 Jun 2025 08:00:00 GMT"),
            ("Y", "https://y.example/y", "Mon, 09 Jun 2025 08:00:00 GMT"),
        ]),
    )
    .await;

    let renderer = Arc::new(CountingRenderer::default());
    let scheduler = scheduler_with(
        format!("{}/feeds.opml", server.uri()),
        Duration::from_secs(5),
        Some(renderer.clone() as Arc<dyn Renderer>),
    );

    scheduler.run_cycle().await.unwrap();
    let first = scheduler.reader().snapshot();
    assert_eq!(first.feeds.len(), 1);
    let links: Vec<&str> = first.feeds[0].items.iter().map(|i| i.link.as_str()).collect();
    assert_eq!(links, vec!["https://x.example/x", "https://y.example/y"]);
    assert_eq!(
        first.feeds[0].items[0].summary,
        "<p>Full text of https://x.example/x</p>"
    );
    assert_eq!(renderer.opened.load(Ordering::SeqCst), 2);
    assert_eq!(first.summaries.len(), 2);

    scheduler.run_cycle().await.unwrap();
    let second = scheduler.reader().snapshot();
    assert_eq!(renderer.opened.load(Ordering::SeqCst), 2);
    assert_eq!(second.feeds, first.feeds);
    assert_eq!(second.summaries, first.summaries);
}

#[tokio::test]
async fn test_successful_cycle_publishes_digest() {
    let server = MockServer::start().await;
    mount_opml(&server, 200, 1).await;

    let scheduler = scheduler(format!("{}/feeds.opml", server.uri()));
    scheduler.run_cycle().await.unwrap();

    let state = scheduler.reader().snapshot();
    assert_eq!(state.phase, RefreshPhase::Published);
    assert!(state.last_updated.is_some());
    assert_eq!(state.last_error, None);
    let titles: Vec<&str> = state.feeds.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["Tech", "News"]);
}

#[tokio::test]
async fn test_failed_cycle_keeps_previous_digest() {
    let server = MockServer::start().await;
    mount_opml(&server, 200, 1).await;
    mount_opml(&server, 500, 1).await;

    let scheduler = scheduler(format!("{}/feeds.opml", server.uri()));
    scheduler.run_cycle().await.unwrap();
    let published = scheduler.reader().snapshot();

    let err = scheduler.run_cycle().await.unwrap_err();
    assert!(matches!(err, RefreshError::Opml(_)));

    let state = scheduler.reader().snapshot();
    assert_eq!(state.phase, RefreshPhase::Failed);
    assert_eq!(state.feeds, published.feeds);
    assert_eq!(state.last_updated, published.last_updated);
    assert!(state.last_error.as_deref().is_some_and(|e| e.contains("500")));
}

#[tokio::test]
async fn test_success_after_failure_clears_error() {
    let server = MockServer::start().await;
    mount_opml(&server, 503, 1).await;
    mount_opml(&server, 200, 1).await;

    let scheduler = scheduler(format!("{}/feeds.opml", server.uri()));
    assert!(scheduler.run_cycle().await.is_err());
    assert!(scheduler.reader().snapshot().feeds.is_empty());

    scheduler.run_cycle().await.unwrap();
    let state = scheduler.reader().snapshot();
    assert_eq!(state.last_error, None);
    assert_eq!(state.feeds.len(), 2);
}

#[tokio::test]
async fn test_run_publishes_first_cycle_and_stops_on_shutdown() {
    let server = MockServer::start().await;
    mount_opml(&server, 200, 10).await;

    let scheduler = scheduler(format!("{}/feeds.opml", server.uri()));
    let mut reader = scheduler.reader();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(scheduler.run(async {
        let _ = stop_rx.await;
    }));

    let state = tokio::time::timeout(
        Duration::from_secs(5),
        reader.wait_for(|s| s.phase == RefreshPhase::Published),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(state.feeds.len(), 2);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_aborts_stuck_cycle_and_releases_renderer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feeds.opml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(OPML)
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let renderer = Arc::new(CountingRenderer::default());
    let scheduler = scheduler_with(
        format!("{}/feeds.opml", server.uri()),
        Duration::from_secs(60),
        Some(renderer.clone() as Arc<dyn Renderer>),
    );
    let mut reader = scheduler.reader();
    let running = scheduler.spawn();

    tokio::time::timeout(
        Duration::from_secs(5),
        reader.wait_for(|s| s.phase == RefreshPhase::Running),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(Arc::strong_count(&renderer), 2);

    tokio::time::timeout(
        Duration::from_secs(5),
        running.shutdown(Duration::from_millis(100)),
    )
    .await
    .unwrap();
    assert_eq!(Arc::strong_count(&renderer), 1);
}

// ============================================================================
// HTTP surface
// ============================================================================

#[tokio::test]
async fn test_data_endpoint_reflects_published_state() {
    let server = MockServer::start().await;
    mount_opml(&server, 200, 1).await;
    mount_opml(&server, 404, 1).await;

    let scheduler = scheduler(format!("{}/feeds.opml", server.uri()));
    scheduler.run_cycle().await.unwrap();
    let _ = scheduler.run_cycle().await;

    let app = router(
        AppState::new(scheduler.reader(), "Morning Paper"),
        Path::new("/nonexistent-static-dir"),
    );
    let response = app
        .oneshot(Request::get("/data").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["name"], "Morning Paper");
    assert_eq!(json["feeds"][0]["title"], "Tech");
    assert_eq!(json["feeds"][0]["items"], serde_json::json!([]));
    assert!(json["lastUpdated"].is_string());
    assert!(json["lastError"].as_str().unwrap().contains("404"));
}
