// In-memory implementations for examples and testing
//
// These sources keep everything in memory and can be scripted with delays
// and failures, which makes them useful for:
// - Unit tests (paired with tokio's paused clock)
// - Demos that run without a backend

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::activity::ActivityEvent;
use crate::activity_log::{ActivityPage, PageRequest, Pagination};
use crate::dashboard::VisitPoint;
use crate::error::{Result, SourceError};
use crate::traits::{
    ActivityBatchStream, ActivityLogSource, ActivitySource, DashboardSource, HealthProbe,
};

fn scripted_failure(message: impl Into<String>) -> SourceError {
    SourceError::Api {
        status: 500,
        message: message.into(),
    }
}

// ============================================================================
// InMemoryActivitySource - Recent events plus an optional push channel
// ============================================================================

type BatchSender = mpsc::Sender<Result<Vec<ActivityEvent>>>;

/// In-memory live activity source
///
/// `push_recent` prepends events to what `fetch_recent` returns. When built
/// with `with_push_channel`, every `open_channel` call opens a fresh channel
/// fed by `publish`.
#[derive(Default)]
pub struct InMemoryActivitySource {
    recent: Mutex<Vec<ActivityEvent>>,
    fail_next: Mutex<Option<String>>,
    fetch_delay: Mutex<Duration>,
    fetches: Mutex<usize>,
    push_enabled: bool,
    channel: Mutex<Option<BatchSender>>,
}

impl InMemoryActivitySource {
    /// Poll-only source
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that also offers a push channel
    pub fn with_push_channel() -> Self {
        Self {
            push_enabled: true,
            ..Self::default()
        }
    }

    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        *self.fetch_delay.lock() = delay;
        self
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = delay;
    }

    /// Prepend events (newest first) to the recent list
    pub fn push_recent(&self, batch: Vec<ActivityEvent>) {
        let mut recent = self.recent.lock();
        let mut merged = batch;
        merged.append(&mut recent);
        *recent = merged;
    }

    /// Make the next `fetch_recent` fail with `message`
    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }

    /// Number of `fetch_recent` calls so far
    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock()
    }

    /// Deliver a batch on the open push channel
    pub async fn publish(&self, batch: Vec<ActivityEvent>) {
        let sender = self.channel.lock().clone();
        if let Some(sender) = sender {
            let _ = sender.send(Ok(batch)).await;
        }
    }

    /// Fail the open push channel
    pub async fn publish_error(&self, message: impl Into<String>) {
        let sender = self.channel.lock().clone();
        if let Some(sender) = sender {
            let _ = sender.send(Err(SourceError::channel(message))).await;
        }
    }

    /// End the open push channel from the server side
    pub fn close_channel(&self) {
        self.channel.lock().take();
    }
}

#[async_trait]
impl ActivitySource for InMemoryActivitySource {
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<ActivityEvent>> {
        *self.fetches.lock() += 1;
        let delay = *self.fetch_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.fail_next.lock().take() {
            return Err(scripted_failure(message));
        }
        Ok(self.recent.lock().iter().take(limit).cloned().collect())
    }

    async fn open_channel(&self) -> Result<Option<ActivityBatchStream>> {
        if !self.push_enabled {
            return Ok(None);
        }
        let (tx, rx) = mpsc::channel(16);
        *self.channel.lock() = Some(tx);
        Ok(Some(Box::pin(ReceiverStream::new(rx))))
    }
}

// ============================================================================
// InMemoryActivityLog - Paged historical log
// ============================================================================

/// In-memory historical log with server-side type filtering and paging
#[derive(Default)]
pub struct InMemoryActivityLog {
    events: Vec<ActivityEvent>,
    requests: Mutex<Vec<PageRequest>>,
    fail_next: Mutex<Option<String>>,
}

impl InMemoryActivityLog {
    /// Create a log holding `events`, newest first
    pub fn new(events: Vec<ActivityEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().clone()
    }

    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }
}

#[async_trait]
impl ActivityLogSource for InMemoryActivityLog {
    async fn fetch_page(&self, request: &PageRequest) -> Result<ActivityPage> {
        self.requests.lock().push(request.clone());
        if let Some(message) = self.fail_next.lock().take() {
            return Err(scripted_failure(message));
        }

        let matching: Vec<&ActivityEvent> = self
            .events
            .iter()
            .filter(|e| {
                request
                    .event_type
                    .as_ref()
                    .map_or(true, |t| &e.event_type == t)
            })
            .collect();

        let limit = request.limit.max(1) as usize;
        let total_pages = matching.len().div_ceil(limit).max(1) as u32;
        let start = (request.page.max(1) as usize - 1) * limit;
        let activities = matching
            .into_iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect();

        Ok(ActivityPage {
            activities,
            pagination: Pagination {
                total_pages,
                page: Some(request.page),
                total: None,
            },
        })
    }
}

// ============================================================================
// ScriptedProbe - Health probe with per-URL delays and outcomes
// ============================================================================

/// Outcome of a scripted probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Up,
    Status(u16),
}

impl ProbeOutcome {
    pub fn status(code: u16) -> Self {
        ProbeOutcome::Status(code)
    }
}

/// Health probe answering from a per-URL script
///
/// Each call pops the next scripted response for its URL; once the script is
/// exhausted the probe answers `Up` after `default_delay`.
#[derive(Default)]
pub struct ScriptedProbe {
    scripts: Mutex<HashMap<String, VecDeque<(Duration, ProbeOutcome)>>>,
    default_delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: impl Into<String>, delay: Duration, outcome: ProbeOutcome) -> Self {
        self.scripts
            .lock()
            .entry(url.into())
            .or_default()
            .push_back((delay, outcome));
        self
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// URLs probed so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.calls.lock().push(url.to_string());
        let (delay, outcome) = self
            .scripts
            .lock()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or((self.default_delay, ProbeOutcome::Up));

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            ProbeOutcome::Up => Ok(()),
            ProbeOutcome::Status(code) if (200..300).contains(&code) => Ok(()),
            ProbeOutcome::Status(code) => Err(SourceError::Api {
                status: code,
                message: reqwest::StatusCode::from_u16(code)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown")
                    .to_string(),
            }),
        }
    }
}

// ============================================================================
// ScriptedDashboard - Metric source with per-metric delays and results
// ============================================================================

type Scripted<T> = Mutex<VecDeque<(Duration, std::result::Result<T, String>)>>;

async fn next_scripted<T>(script: &Scripted<T>, default: T) -> Result<T> {
    let next = script.lock().pop_front();
    let (delay, result) = next.unwrap_or((Duration::ZERO, Ok(default)));
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    result.map_err(scripted_failure)
}

/// Dashboard source answering each metric from its own script
///
/// Unscripted calls answer immediately with zero / an empty series.
#[derive(Default)]
pub struct ScriptedDashboard {
    users: Scripted<u64>,
    projects: Scripted<u64>,
    blog_posts: Scripted<u64>,
    messages: Scripted<u64>,
    weekly_visits: Scripted<Vec<VisitPoint>>,
}

impl ScriptedDashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn users(self, delay: Duration, result: std::result::Result<u64, &str>) -> Self {
        push_script(&self.users, delay, result);
        self
    }

    pub fn projects(self, delay: Duration, result: std::result::Result<u64, &str>) -> Self {
        push_script(&self.projects, delay, result);
        self
    }

    pub fn blog_posts(self, delay: Duration, result: std::result::Result<u64, &str>) -> Self {
        push_script(&self.blog_posts, delay, result);
        self
    }

    pub fn messages(self, delay: Duration, result: std::result::Result<u64, &str>) -> Self {
        push_script(&self.messages, delay, result);
        self
    }

    pub fn weekly_visits(
        self,
        delay: Duration,
        result: std::result::Result<Vec<VisitPoint>, &str>,
    ) -> Self {
        push_script(&self.weekly_visits, delay, result);
        self
    }
}

fn push_script<T>(script: &Scripted<T>, delay: Duration, result: std::result::Result<T, &str>) {
    script
        .lock()
        .push_back((delay, result.map_err(str::to_string)));
}

#[async_trait]
impl DashboardSource for ScriptedDashboard {
    async fn user_count(&self) -> Result<u64> {
        next_scripted(&self.users, 0).await
    }

    async fn project_count(&self) -> Result<u64> {
        next_scripted(&self.projects, 0).await
    }

    async fn blog_post_count(&self) -> Result<u64> {
        next_scripted(&self.blog_posts, 0).await
    }

    async fn message_count(&self) -> Result<u64> {
        next_scripted(&self.messages, 0).await
    }

    async fn weekly_visits(&self) -> Result<Vec<VisitPoint>> {
        next_scripted(&self.weekly_visits, Vec::new()).await
    }
}
