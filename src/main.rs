use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use feedpage::config::Config;
use feedpage::content::{ChromeRenderer, Enricher, Renderer};
use feedpage::digest::Aggregator;
use feedpage::feed::{build_client, FeedFetcher};
use feedpage::refresh::{OpmlSource, Scheduler};
use feedpage::server::{self, AppState};

const USER_AGENT: &str = concat!("feedpage/", env!("CARGO_PKG_VERSION"));

/// How long a cycle in flight at shutdown may keep running.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "feedpage", about = "Serves a ranked digest of the feeds in an OPML outline")]
struct Args {
    /// TOML config file (optional)
    #[arg(long, value_name = "FILE", default_value = "feedpage.toml")]
    config: PathBuf,

    /// OPML outline address (overrides OPML_URL)
    #[arg(long, value_name = "URL")]
    opml_url: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Do not launch a headless browser to scrape short summaries
    #[arg(long)]
    no_scrape: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("feedpage=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("Invalid environment configuration")?;
    if let Some(url) = args.opml_url {
        config.opml_url = Some(url);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.no_scrape {
        config.scrape_summaries = false;
    }
    let opml_url = config.validate()?.to_string();
    tracing::debug!(?config, "Resolved configuration");

    let client = build_client(USER_AGENT).context("Failed to build HTTP client")?;
    let fetcher = FeedFetcher::new(
        client.clone(),
        config.max_concurrent_fetches,
        config.fetch_timeout(),
    )
    .with_address_policy(config.address_policy());
    let aggregator = Aggregator::new(fetcher, config.max_items);

    let chrome = if config.scrape_summaries {
        match ChromeRenderer::launch(config.chrome_executable.clone(), config.render_timeout()).await {
            Ok(renderer) => Some(Arc::new(renderer)),
            Err(e) => {
                tracing::warn!(error = %e, "Headless browser unavailable, summaries will not be scraped");
                None
            }
        }
    } else {
        tracing::info!("Summary scraping disabled");
        None
    };
    let enricher = Enricher::new(
        chrome.clone().map(|r| r as Arc<dyn Renderer>),
        config.content_selector.clone(),
        config.min_summary_len,
        config.render_timeout(),
    )
    .with_address_policy(config.address_policy());

    let scheduler = Scheduler::new(
        client,
        OpmlSource {
            url: opml_url,
            timeout: config.fetch_timeout(),
        },
        aggregator,
        enricher,
        config.refresh_interval(),
    );
    let state = AppState::new(scheduler.reader(), config.name.clone());

    let scheduler = scheduler.spawn();

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        interval_minutes = config.refresh_interval_minutes,
        "Serving digest"
    );

    axum::serve(listener, server::router(state, &config.static_dir))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("HTTP server failed")?;

    tracing::info!("Shutting down");
    scheduler.shutdown(SHUTDOWN_GRACE).await;

    // The enricher's clone of the renderer was dropped with the scheduler
    if let Some(renderer) = chrome.and_then(Arc::into_inner) {
        renderer.close().await;
    }

    Ok(())
}
