use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::content::Enricher;
use crate::digest::{Aggregator, DigestNode, SummaryCache};
use crate::feed::{fetch_opml, OpmlError};
use crate::refresh::state::{StateReader, StateStore};

/// A failure that aborts a whole refresh cycle.
///
/// Per-feed and per-article failures never get here; they are absorbed by the
/// fetcher and the enricher.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Failed to load OPML: {0}")]
    Opml(#[from] OpmlError),
}

/// Where the subscription outline comes from and how long to wait for it.
#[derive(Debug, Clone)]
pub struct OpmlSource {
    pub url: String,
    pub timeout: Duration,
}

/// Runs the OPML → aggregate → enrich pipeline on a fixed interval and
/// publishes the result.
pub struct Scheduler {
    client: reqwest::Client,
    source: OpmlSource,
    aggregator: Aggregator,
    enricher: Enricher,
    interval: Duration,
    store: StateStore,
}

impl Scheduler {
    pub fn new(
        client: reqwest::Client,
        source: OpmlSource,
        aggregator: Aggregator,
        enricher: Enricher,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            source,
            aggregator,
            enricher,
            interval,
            store: StateStore::new(),
        }
    }

    pub fn reader(&self) -> StateReader {
        self.store.reader()
    }

    /// Runs one full cycle and publishes its outcome.
    ///
    /// On failure the previously published digest, cache and timestamp stay
    /// in place and only the error is recorded.
    pub async fn run_cycle(&self) -> Result<(), RefreshError> {
        let prior = self.store.snapshot();
        self.store.mark_running();
        let started = Instant::now();

        match self.refresh(&prior.summaries).await {
            Ok((feeds, summaries)) => {
                tracing::info!(
                    folders = feeds.len(),
                    items = feeds.iter().map(|n| n.items.len()).sum::<usize>(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Feed refresh published"
                );
                self.store.publish(feeds, summaries, Utc::now());
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Feed refresh failed, serving previous digest");
                self.store.record_failure(e.to_string());
                Err(e)
            }
        }
    }

    async fn refresh(
        &self,
        prior: &SummaryCache,
    ) -> Result<(Vec<DigestNode>, SummaryCache), RefreshError> {
        let tree = fetch_opml(&self.client, &self.source.url, self.source.timeout).await?;
        let digest = self.aggregator.aggregate(prior, &tree).await;
        tracing::info!(folders = digest.len(), "Feed updated");
        Ok(self.enricher.enrich(digest, prior).await)
    }

    /// Runs a cycle immediately and then once per interval until `shutdown`
    /// resolves.
    ///
    /// Cycles run inline in this loop, so two can never overlap; a cycle that
    /// outlasts the interval delays the next tick instead of stacking.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    // Outcome is already recorded in the store
                    let _ = self.run_cycle().await;
                }
            }
        }
    }

    /// Moves the loop onto its own task.
    pub fn spawn(self) -> RunningScheduler {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(self.run(async move {
            let _ = stopped.await;
        }));
        RunningScheduler { stop, task }
    }
}

/// Handle on a scheduler loop started with [`Scheduler::spawn`].
pub struct RunningScheduler {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningScheduler {
    /// Stops the loop, giving a cycle in flight up to `grace` to finish before
    /// it is aborted.
    ///
    /// When this returns the scheduler has been dropped, along with its
    /// enricher and any renderer it held.
    pub async fn shutdown(mut self, grace: Duration) {
        let _ = self.stop.send(());
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            tracing::warn!("Refresh cycle still running at shutdown, aborting it");
            self.task.abort();
            let _ = self.task.await;
        }
    }
}
