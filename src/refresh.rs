//! Background refresh of a cached feed
//!
//! Runs [`FeedCache::refresh`] on a fixed interval in a tokio task and reports
//! every outcome over a channel. A failed refresh leaves the cached copy in
//! place and is retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::cache::{CollectionSource, FeedCache, RefreshOutcome};

/// Messages sent from the background refresh task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshMessage {
    /// A refresh is starting
    RefreshStarted,
    /// A refresh finished, successfully or not
    RefreshCompleted(RefreshOutcome),
}

/// Configuration for the refresh interval
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time between refreshes; the first one runs immediately
    pub interval: Duration,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600), // 1 hour
            enabled: true,
        }
    }
}

/// Handle for controlling the background refresh task
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Spawns the refresh task for `cache`
    ///
    /// With `config.enabled == false` no task is spawned and the receiver
    /// never yields a message.
    pub fn spawn<S>(cache: Arc<FeedCache<S>>, config: RefreshConfig) -> Self
    where
        S: CollectionSource + 'static,
    {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = config.enabled.then(move || {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = interval.tick() => {}
                        Some(()) = trigger_rx.recv() => {
                            debug!(key = cache.key(), "refresh requested");
                        }
                        _ = shutdown_rx.recv() => break,
                    }

                    if msg_tx.send(RefreshMessage::RefreshStarted).await.is_err() {
                        break;
                    }
                    let outcome = cache.refresh().await;
                    if msg_tx
                        .send(RefreshMessage::RefreshCompleted(outcome))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            })
        });

        Self {
            receiver: msg_rx,
            trigger_tx,
            shutdown_tx,
            task,
        }
    }

    /// Requests an immediate refresh
    ///
    /// A request made while one is already pending is dropped.
    pub fn request_refresh(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Stops the refresh task, waiting for an in-flight refresh to finish
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
