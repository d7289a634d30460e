use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::digest::{DigestNode, SummaryCache};

/// Where the scheduler is in its cycle.
///
/// `Published` and `Failed` behave like `Idle` for scheduling; they only
/// record how the last cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPhase {
    #[default]
    Idle,
    Running,
    Published,
    Failed,
}

/// An immutable snapshot of everything the serving layer can see.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub feeds: Arc<Vec<DigestNode>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub summaries: Arc<SummaryCache>,
    pub phase: RefreshPhase,
}

/// Single-writer holder of the current [`RunState`].
///
/// Every change replaces the whole snapshot, so readers never observe a
/// half-updated state. Deliberately not `Clone`: only the scheduler writes.
pub struct StateStore {
    tx: watch::Sender<Arc<RunState>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(RunState::default()));
        Self { tx }
    }

    pub fn reader(&self) -> StateReader {
        StateReader {
            rx: self.tx.subscribe(),
        }
    }

    pub fn snapshot(&self) -> Arc<RunState> {
        self.tx.borrow().clone()
    }

    pub(crate) fn mark_running(&self) {
        self.replace(|current| RunState {
            phase: RefreshPhase::Running,
            ..current.clone()
        });
    }

    pub(crate) fn publish(
        &self,
        feeds: Vec<DigestNode>,
        summaries: SummaryCache,
        at: DateTime<Utc>,
    ) {
        self.replace(|_| RunState {
            feeds: Arc::new(feeds),
            last_updated: Some(at),
            last_error: None,
            summaries: Arc::new(summaries),
            phase: RefreshPhase::Published,
        });
    }

    /// Keeps the last good digest, cache and timestamp; records `error`.
    pub(crate) fn record_failure(&self, error: String) {
        self.replace(|current| RunState {
            last_error: Some(error),
            phase: RefreshPhase::Failed,
            ..current.clone()
        });
    }

    fn replace(&self, next: impl FnOnce(&RunState) -> RunState) {
        let next = next(&self.tx.borrow());
        self.tx.send_replace(Arc::new(next));
    }
}

/// Read handle on a [`StateStore`]. Cheap to clone.
#[derive(Clone)]
pub struct StateReader {
    rx: watch::Receiver<Arc<RunState>>,
}

impl StateReader {
    pub fn snapshot(&self) -> Arc<RunState> {
        self.rx.borrow().clone()
    }

    /// Waits until a snapshot satisfying `predicate` is published and
    /// returns it. Returns `None` if the store has been dropped.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&RunState) -> bool,
    ) -> Option<Arc<RunState>> {
        self.rx
            .wait_for(|state| predicate(state))
            .await
            .ok()
            .map(|state| state.clone())
    }
}
