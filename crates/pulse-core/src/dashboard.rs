// Dashboard aggregation
//
// One view-model over several independent, differently-paced sources. Every
// metric has its own wrapper written only by its own fetch task, so a slow or
// failing source never holds back or poisons the others. `refresh_all` fires
// everything at once and returns without waiting.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity::{ActivityEvent, ActivityType};
use crate::config::PulseConfig;
use crate::error::Result;
use crate::health::{HealthProbePool, ServiceDescriptor, ServiceStatus};
use crate::http::{ApiClient, HttpHealthProbe};
use crate::stream::EventStreamClient;
use crate::traits::DashboardSource;

/// One point of the weekly-visit series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitPoint {
    #[serde(alias = "day", alias = "date")]
    pub label: String,
    #[serde(alias = "visits")]
    pub count: u64,
}

/// Loading/error/value wrapper around one fetched value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardMetric<T> {
    pub value: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
    #[serde(skip)]
    pending: usize,
}

impl<T> Default for DashboardMetric<T> {
    fn default() -> Self {
        Self {
            value: None,
            loading: false,
            error: None,
            pending: 0,
        }
    }
}

impl<T> DashboardMetric<T> {
    fn begin(&mut self) {
        self.pending += 1;
        self.loading = true;
    }

    /// Record a completed fetch; the latest completion decides value/error.
    /// A failure keeps the last good value on display.
    fn finish(&mut self, result: Result<T>) {
        self.pending = self.pending.saturating_sub(1);
        self.loading = self.pending > 0;
        match result {
            Ok(value) => {
                self.value = Some(value);
                self.error = None;
            }
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    /// Release a fetch that ended without a result (aborted or panicked)
    fn abandon(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        self.loading = self.pending > 0;
    }

    /// Loaded at least once and not currently failing
    pub fn is_ready(&self) -> bool {
        self.value.is_some() && self.error.is_none()
    }
}

struct DashboardMetrics {
    users: watch::Sender<DashboardMetric<u64>>,
    projects: watch::Sender<DashboardMetric<u64>>,
    blog_posts: watch::Sender<DashboardMetric<u64>>,
    messages: watch::Sender<DashboardMetric<u64>>,
    weekly_visits: watch::Sender<DashboardMetric<Vec<VisitPoint>>>,
}

type MetricSlot<T> = fn(&DashboardMetrics) -> &watch::Sender<DashboardMetric<T>>;

impl DashboardMetrics {
    fn new() -> Self {
        Self {
            users: watch::Sender::new(DashboardMetric::default()),
            projects: watch::Sender::new(DashboardMetric::default()),
            blog_posts: watch::Sender::new(DashboardMetric::default()),
            messages: watch::Sender::new(DashboardMetric::default()),
            weekly_visits: watch::Sender::new(DashboardMetric::default()),
        }
    }
}

/// One outstanding fetch; dropping it unfinished clears its loading state
struct PendingFetch<T> {
    metrics: Arc<DashboardMetrics>,
    slot: MetricSlot<T>,
    settled: bool,
}

impl<T> PendingFetch<T> {
    fn begin(metrics: Arc<DashboardMetrics>, slot: MetricSlot<T>) -> Self {
        slot(&metrics).send_modify(DashboardMetric::begin);
        Self {
            metrics,
            slot,
            settled: false,
        }
    }

    fn finish(mut self, result: Result<T>) {
        self.settled = true;
        (self.slot)(&self.metrics).send_modify(|m| m.finish(result));
    }
}

impl<T> Drop for PendingFetch<T> {
    fn drop(&mut self) {
        if !self.settled {
            (self.slot)(&self.metrics).send_modify(DashboardMetric::abandon);
        }
    }
}

/// Per-metric change notifications; drop to unsubscribe
pub struct DashboardSubscription {
    pub users: watch::Receiver<DashboardMetric<u64>>,
    pub projects: watch::Receiver<DashboardMetric<u64>>,
    pub blog_posts: watch::Receiver<DashboardMetric<u64>>,
    pub messages: watch::Receiver<DashboardMetric<u64>>,
    pub weekly_visits: watch::Receiver<DashboardMetric<Vec<VisitPoint>>>,
}

/// A monitored service with its current status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceView {
    #[serde(flatten)]
    pub service: ServiceDescriptor,
    #[serde(flatten)]
    pub status: ServiceStatus,
}

/// UI-ready snapshot of the whole dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub users: DashboardMetric<u64>,
    pub projects: DashboardMetric<u64>,
    pub blog_posts: DashboardMetric<u64>,
    pub messages: DashboardMetric<u64>,
    pub weekly_visits: DashboardMetric<Vec<VisitPoint>>,
    pub services: Vec<ServiceView>,
    pub recent_activity: Vec<ActivityEvent>,
    pub stream_connected: bool,
    pub stream_error: Option<String>,
}

impl DashboardView {
    /// Whether any source is still loading
    pub fn is_loading(&self) -> bool {
        self.users.loading
            || self.projects.loading
            || self.blog_posts.loading
            || self.messages.loading
            || self.weekly_visits.loading
            || self.services.iter().any(|s| s.status.checking)
    }
}

/// Tasks launched by one `refresh_all`
///
/// Dropping the handle detaches the tasks; they still complete and update
/// their own metrics.
pub struct RefreshHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshHandle {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every launched fetch; cancelled metrics stop loading and keep
    /// their previous value
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }

    /// Wait for every launched fetch to finish
    pub async fn join(self) {
        for task in self.tasks {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => debug!("Dashboard refresh task cancelled"),
                Err(e) => warn!(error = %e, "Dashboard refresh task did not complete"),
            }
        }
    }
}

/// Composes the health pool, the event stream and the metric fetchers
pub struct DashboardAggregator {
    source: Arc<dyn DashboardSource>,
    health: Arc<HealthProbePool>,
    stream: Arc<EventStreamClient>,
    metrics: Arc<DashboardMetrics>,
    noise_types: HashSet<ActivityType>,
}

impl DashboardAggregator {
    pub fn new(
        source: Arc<dyn DashboardSource>,
        health: Arc<HealthProbePool>,
        stream: Arc<EventStreamClient>,
    ) -> Self {
        Self {
            source,
            health,
            stream,
            metrics: Arc::new(DashboardMetrics::new()),
            noise_types: HashSet::from([ActivityType::ListFetched]),
        }
    }

    /// Wire everything to the HTTP API described by `config`
    pub fn from_config(config: &PulseConfig, api: Arc<ApiClient>) -> Self {
        let probe = Arc::new(HttpHealthProbe::new());
        let health = Arc::new(HealthProbePool::new(
            config.services.clone(),
            probe,
            config.probe.clone(),
        ));
        let stream = Arc::new(EventStreamClient::new(api.clone(), config.stream.clone()));
        Self::new(api, health, stream).with_noise_types(config.noise_types.iter().cloned())
    }

    /// Replace the set of event types hidden from `recent_activity`
    pub fn with_noise_types(mut self, types: impl IntoIterator<Item = ActivityType>) -> Self {
        self.noise_types = types.into_iter().collect();
        self
    }

    pub fn health(&self) -> &Arc<HealthProbePool> {
        &self.health
    }

    pub fn stream(&self) -> &Arc<EventStreamClient> {
        &self.stream
    }

    /// Connect the owned event stream
    pub async fn connect_stream(&self) -> bool {
        self.stream.connect().await
    }

    /// Launch every metric fetch and a health check, without waiting
    pub fn refresh_all(&self) -> RefreshHandle {
        info!("Refreshing dashboard");
        let tasks = vec![
            self.spawn_metric("users", |m| &m.users, {
                let source = Arc::clone(&self.source);
                async move { source.user_count().await }
            }),
            self.spawn_metric("projects", |m| &m.projects, {
                let source = Arc::clone(&self.source);
                async move { source.project_count().await }
            }),
            self.spawn_metric("blog_posts", |m| &m.blog_posts, {
                let source = Arc::clone(&self.source);
                async move { source.blog_post_count().await }
            }),
            self.spawn_metric("messages", |m| &m.messages, {
                let source = Arc::clone(&self.source);
                async move { source.message_count().await }
            }),
            self.spawn_metric("weekly_visits", |m| &m.weekly_visits, {
                let source = Arc::clone(&self.source);
                async move { source.weekly_visits().await }
            }),
            {
                let health = Arc::clone(&self.health);
                tokio::spawn(async move {
                    health.check_all().await;
                    let summary = health.summary();
                    debug!(
                        alive = summary.alive,
                        down = summary.down,
                        "Dashboard health check finished"
                    );
                })
            },
        ];
        RefreshHandle { tasks }
    }

    /// Recent events with noise types removed; the stream itself is untouched
    pub fn recent_activity(&self, limit: usize) -> Vec<ActivityEvent> {
        self.stream
            .events()
            .into_iter()
            .filter(|e| !self.noise_types.contains(&e.event_type))
            .take(limit)
            .collect()
    }

    pub fn subscribe(&self) -> DashboardSubscription {
        DashboardSubscription {
            users: self.metrics.users.subscribe(),
            projects: self.metrics.projects.subscribe(),
            blog_posts: self.metrics.blog_posts.subscribe(),
            messages: self.metrics.messages.subscribe(),
            weekly_visits: self.metrics.weekly_visits.subscribe(),
        }
    }

    /// Snapshot of every source as of now
    pub fn view(&self, activity_limit: usize) -> DashboardView {
        let stream = self.stream.snapshot();
        DashboardView {
            users: self.metrics.users.borrow().clone(),
            projects: self.metrics.projects.borrow().clone(),
            blog_posts: self.metrics.blog_posts.borrow().clone(),
            messages: self.metrics.messages.borrow().clone(),
            weekly_visits: self.metrics.weekly_visits.borrow().clone(),
            services: self
                .health
                .statuses()
                .into_iter()
                .map(|(service, status)| ServiceView { service, status })
                .collect(),
            recent_activity: stream
                .events
                .into_iter()
                .filter(|e| !self.noise_types.contains(&e.event_type))
                .take(activity_limit)
                .collect(),
            stream_connected: stream.is_connected,
            stream_error: stream.last_error,
        }
    }

    fn spawn_metric<T, Fut>(
        &self,
        name: &'static str,
        slot: MetricSlot<T>,
        fetch: Fut,
    ) -> JoinHandle<()>
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let pending = PendingFetch::begin(Arc::clone(&self.metrics), slot);
        tokio::spawn(async move {
            let result = fetch.await;
            match &result {
                Ok(_) => debug!(metric = name, "Dashboard metric loaded"),
                Err(e) => warn!(metric = name, error = %e, "Dashboard metric fetch failed"),
            }
            pending.finish(result);
        })
    }
}
