// Activity and notification aggregation
//
// This crate provides the live, client-side state behind an admin console:
// a bounded feed of system activity events, an unread counter, service
// liveness probes, a paged activity-log query and a dashboard that combines
// several independent metric sources.
//
// Key design decisions:
// - Every external collaborator is an async trait (see traits.rs), so the
//   core runs unchanged against HTTP or the in-memory sources in memory.rs
// - Observable state is published through tokio watch channels
// - Background loops are cancelled through a generation counter so that no
//   write lands after disconnect()
// - Slow or failing sources are isolated: each metric and each probe owns
//   its own state and timeout

pub mod activity;
pub mod activity_log;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod feed;
pub mod health;
pub mod http;
pub mod stream;
pub mod traits;
pub mod unread;

// In-memory implementations for examples and testing
pub mod memory;

// Re-exports for convenience
pub use activity::{
    relative_time, ActivityCategory, ActivityEvent, ActivityStatus, ActivityType, EventId,
};
pub use activity_log::{
    ActivityLogQuery, ActivityPage, PageRequest, Pagination, QueryParams, QueryResult,
    DEFAULT_PAGE_SIZE,
};
pub use config::{Endpoints, ProbeConfig, PulseConfig, StreamConfig, StreamMode};
pub use dashboard::{
    DashboardAggregator, DashboardMetric, DashboardSubscription, DashboardView, RefreshHandle,
    ServiceView, VisitPoint,
};
pub use error::{ConfigError, QueryError, Result, SourceError};
pub use feed::{EventFeed, MergeOutcome};
pub use health::{
    DiagnosticEntry, DiagnosticLog, HealthProbePool, HealthSummary, ServiceDescriptor,
    ServiceStatus,
};
pub use http::{ApiClient, HttpHealthProbe};
pub use stream::{EventStreamClient, FeedSnapshot};
pub use traits::{
    ActivityBatchStream, ActivityLogSource, ActivitySource, DashboardSource, HealthProbe,
};
pub use unread::{BeforeFirstView, UnreadTracker};
