//! HTTP surface: the digest as JSON plus the static front end.

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::digest::DigestNode;
use crate::refresh::StateReader;

#[derive(Clone)]
pub struct AppState {
    reader: StateReader,
    name: Arc<str>,
}

impl AppState {
    pub fn new(reader: StateReader, name: impl Into<Arc<str>>) -> Self {
        Self {
            reader,
            name: name.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataResponse<'a> {
    feeds: &'a [DigestNode],
    last_updated: Option<DateTime<Utc>>,
    last_error: Option<&'a str>,
    name: &'a str,
}

/// Builds the router: `GET /data`, `GET /health`, and static files from
/// `static_dir` for everything else.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/data", get(data))
        .route("/health", get(health))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn data(State(state): State<AppState>) -> Response {
    let snapshot = state.reader.snapshot();
    Json(DataResponse {
        feeds: snapshot.feeds.as_slice(),
        last_updated: snapshot.last_updated,
        last_error: snapshot.last_error.as_deref(),
        name: &state.name,
    })
    .into_response()
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{DigestItem, SummaryCache};
    use crate::refresh::StateStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_data_before_first_refresh() {
        let store = StateStore::new();
        let app = router(AppState::new(store.reader(), "FeedPage"), Path::new("build"));

        let json = get_json(app, "/data").await;
        assert_eq!(
            json,
            serde_json::json!({
                "feeds": [],
                "lastUpdated": null,
                "lastError": null,
                "name": "FeedPage",
            })
        );
    }

    #[tokio::test]
    async fn test_data_serves_published_digest_and_error() {
        let store = StateStore::new();
        let app = router(AppState::new(store.reader(), "Daily"), Path::new("build"));

        store.publish(
            vec![DigestNode {
                title: "Tech".into(),
                items: vec![DigestItem {
                    title: "Post".into(),
                    link: "https://a.example/post".into(),
                    summary: "<p>hi</p>".into(),
                    image: None,
                    subheads: vec!["a.example".into()],
                }],
            }],
            SummaryCache::new(),
            Utc::now(),
        );
        store.record_failure("Failed to load OPML: OPML request returned status 500".into());

        let json = get_json(app, "/data").await;
        assert_eq!(json["name"], "Daily");
        assert_eq!(json["feeds"][0]["title"], "Tech");
        assert_eq!(json["feeds"][0]["items"][0]["subheads"][0], "a.example");
        assert!(json["feeds"][0]["items"][0]["image"].is_null());
        assert!(json["lastUpdated"].is_string());
        assert!(json["lastError"].as_str().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_health() {
        let store = StateStore::new();
        let app = router(AppState::new(store.reader(), "FeedPage"), Path::new("build"));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
