// Live activity stream client
//
// Keeps the bounded, ordered, deduplicated feed of recent events and a
// connectivity flag. New events arrive either through the source's push
// channel or by short-polling `fetch_recent`.
//
// Teardown is deterministic: every write to shared state carries the
// generation it was started under and is dropped if the client has been
// disconnected (or reconnected) since. A fetch that resolves after
// `disconnect()` therefore cannot touch the feed.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::activity::ActivityEvent;
use crate::config::StreamConfig;
use crate::error::{Result, SourceError};
use crate::feed::{EventFeed, MergeOutcome};
use crate::traits::{ActivityBatchStream, ActivitySource};

/// Point-in-time view of the stream, published to subscribers on every change
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedSnapshot {
    /// Newest first, in arrival order
    pub events: Vec<ActivityEvent>,
    pub is_connected: bool,
    pub last_error: Option<String>,
    /// Increases by one on every published change
    pub revision: u64,
}

struct StreamState {
    feed: EventFeed,
    is_connected: bool,
    last_error: Option<String>,
    generation: u64,
    revision: u64,
}

impl StreamState {
    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            events: self.feed.events().to_vec(),
            is_connected: self.is_connected,
            last_error: self.last_error.clone(),
            revision: self.revision,
        }
    }
}

/// State shared between the client and its background channel task
struct Shared {
    state: Mutex<StreamState>,
    snapshots: watch::Sender<FeedSnapshot>,
}

impl Shared {
    fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Run `f` against the state if `generation` is still current, then publish
    fn apply<R>(&self, generation: u64, f: impl FnOnce(&mut StreamState) -> R) -> Option<R> {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(
                stale = generation,
                current = state.generation,
                "Dropping write from torn-down channel"
            );
            return None;
        }
        let result = f(&mut state);
        state.revision += 1;
        self.snapshots.send_replace(state.snapshot());
        Some(result)
    }

    /// Invalidate every in-flight write and return the new generation
    fn bump_generation(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.generation
    }

    fn mark_connected(&self, generation: u64, batch: Vec<ActivityEvent>, replace: bool) {
        self.apply(generation, |s| {
            let outcome = if replace {
                s.feed.replace_head(batch)
            } else {
                s.feed.merge(batch)
            };
            if outcome.changed() {
                debug!(
                    inserted = outcome.inserted,
                    evicted = outcome.evicted,
                    "Feed updated"
                );
            }
            s.is_connected = true;
            s.last_error = None;
        });
    }

    fn mark_failed(&self, generation: u64, error: &SourceError) -> bool {
        self.apply(generation, |s| {
            s.is_connected = false;
            s.last_error = Some(error.to_string());
        })
        .is_some()
    }
}

struct ChannelHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        self.task.abort();
    }
}

/// Live activity feed with connectivity tracking
pub struct EventStreamClient {
    source: Arc<dyn ActivitySource>,
    config: StreamConfig,
    shared: Arc<Shared>,
    channel: Mutex<Option<ChannelHandle>>,
}

impl EventStreamClient {
    pub fn new(source: Arc<dyn ActivitySource>, config: StreamConfig) -> Self {
        let state = StreamState {
            feed: EventFeed::new(config.capacity),
            is_connected: false,
            last_error: None,
            generation: 0,
            revision: 0,
        };
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            source,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                snapshots,
            }),
            channel: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Subscribe to feed changes; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.shared.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.shared.state.lock().snapshot()
    }

    /// Current feed, newest first
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.shared.state.lock().feed.events().to_vec()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().is_connected
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.state.lock().last_error.clone()
    }

    /// Open the channel (reconnecting if already open)
    ///
    /// Fetches the most recent events, then starts the push channel or the
    /// poll loop. Resolves to the connectivity flag once the first attempt
    /// has finished; each step is bounded by `connect_timeout`.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> bool {
        self.stop_channel();
        let generation = self.shared.generation();
        let bound = self.config.connect_timeout;

        let initial = bounded(bound, self.source.fetch_recent(self.config.refresh_limit)).await;
        let batch = match initial {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Activity stream connect failed");
                self.shared.mark_failed(generation, &e);
                return false;
            }
        };

        let channel = match bounded(bound, self.source.open_channel()).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(error = %e, "Activity push channel failed to open");
                self.shared.mark_failed(generation, &e);
                return false;
            }
        };

        // Holding the slot excludes disconnect() until the task is registered
        let mut slot = self.channel.lock();
        if self.shared.generation() != generation {
            debug!("Disconnected while connecting");
            return false;
        }
        self.shared.mark_connected(generation, batch, true);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = match channel {
            Some(stream) => {
                info!("Activity stream connected (push)");
                tokio::spawn(run_push_channel(
                    Arc::clone(&self.shared),
                    generation,
                    stream,
                    shutdown_rx,
                ))
            }
            None => {
                info!(
                    interval_ms = self.config.poll_interval.as_millis() as u64,
                    "Activity stream connected (poll)"
                );
                tokio::spawn(run_poll_channel(
                    Arc::clone(&self.shared),
                    Arc::clone(&self.source),
                    self.config.clone(),
                    generation,
                    shutdown_rx,
                ))
            }
        };
        *slot = Some(ChannelHandle { shutdown_tx, task });
        true
    }

    /// Stop the channel; no write lands on the feed after this returns
    pub fn disconnect(&self) {
        let generation = self.stop_channel();
        self.shared.apply(generation, |s| s.is_connected = false);
        info!("Activity stream disconnected");
    }

    /// Re-fetch the most recent events and replace the head of the feed
    ///
    /// Known events keep their positions; events that fell out of the recent
    /// window are dropped. A failure is recorded in `last_error` and returned.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<MergeOutcome> {
        let generation = self.shared.generation();
        let fetched = bounded(
            self.config.connect_timeout,
            self.source.fetch_recent(self.config.refresh_limit),
        )
        .await;

        match fetched {
            Ok(window) => {
                let outcome = self
                    .shared
                    .apply(generation, |s| {
                        s.last_error = None;
                        s.feed.replace_head(window)
                    })
                    .unwrap_or_default();
                debug!(
                    inserted = outcome.inserted,
                    evicted = outcome.evicted,
                    "Activity feed refreshed"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "Activity feed refresh failed");
                self.shared.apply(generation, |s| {
                    s.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Signal the background task to stop and invalidate in-flight writes
    fn stop_channel(&self) -> u64 {
        let mut slot = self.channel.lock();
        let generation = self.shared.bump_generation();
        if let Some(handle) = slot.take() {
            handle.stop();
        }
        generation
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        self.shared.bump_generation();
        if let Some(handle) = self.channel.get_mut().take() {
            handle.stop();
        }
    }
}

async fn bounded<T>(
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(limit)),
    }
}

/// Read batches from a push channel until it fails, ends, or is shut down
///
/// A failed or finished push channel leaves the client disconnected; the
/// caller reconnects explicitly.
async fn run_push_channel(
    shared: Arc<Shared>,
    generation: u64,
    mut stream: ActivityBatchStream,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("Push channel shutdown requested");
                return;
            }
            item = stream.next() => match item {
                Some(Ok(batch)) => {
                    if shared.apply(generation, |s| {
                        s.feed.merge(batch);
                        s.is_connected = true;
                    }).is_none() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Push channel failed");
                    shared.mark_failed(generation, &e);
                    return;
                }
                None => {
                    warn!("Push channel closed by server");
                    let closed = SourceError::channel("stream closed by server");
                    shared.mark_failed(generation, &closed);
                    return;
                }
            }
        }
    }
}

/// Short-poll the source until shut down
///
/// A failed poll flips the connectivity flag off; the next successful poll
/// flips it back on.
async fn run_poll_channel(
    shared: Arc<Shared>,
    source: Arc<dyn ActivitySource>,
    config: StreamConfig,
    generation: u64,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            _ = tokio::time::sleep(config.poll_interval) => {}
        }

        let polled = tokio::select! {
            _ = shutdown_rx.changed() => return,
            polled = bounded(
                config.connect_timeout,
                source.fetch_recent(config.refresh_limit),
            ) => polled,
        };

        let applied = match polled {
            Ok(batch) => shared
                .apply(generation, |s| {
                    s.feed.merge(batch);
                    s.is_connected = true;
                    s.last_error = None;
                })
                .is_some(),
            Err(e) => {
                warn!(error = %e, "Activity poll failed");
                shared.mark_failed(generation, &e)
            }
        };
        if !applied {
            return;
        }
    }
}
