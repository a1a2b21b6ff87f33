// Core traits for pluggable data sources
//
// The aggregation core never talks to the network directly. Every external
// collaborator is one of these traits:
// - ActivitySource: recent events, optionally as a push channel
// - ActivityLogSource: paged historical log
// - HealthProbe: single liveness check
// - DashboardSource: independent dashboard metrics
//
// `ApiClient` / `HttpHealthProbe` implement them over HTTP; `memory.rs` has
// scriptable in-memory implementations for tests and demos.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;

use crate::activity::ActivityEvent;
use crate::activity_log::{ActivityPage, PageRequest};
use crate::dashboard::VisitPoint;
use crate::error::Result;

/// Stream of event batches delivered by a push channel, newest-first per batch
pub type ActivityBatchStream = Pin<Box<dyn Stream<Item = Result<Vec<ActivityEvent>>> + Send>>;

// ============================================================================
// ActivitySource - Live/recent activity events
// ============================================================================

/// Source of recent activity events
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Fetch the `limit` most recent events, newest first
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<ActivityEvent>>;

    /// Open a push channel
    ///
    /// Sources without push support return `Ok(None)`; the stream client
    /// then short-polls `fetch_recent` instead.
    async fn open_channel(&self) -> Result<Option<ActivityBatchStream>> {
        Ok(None)
    }
}

// ============================================================================
// ActivityLogSource - Paged historical log
// ============================================================================

/// Server-backed, paginated activity log
#[async_trait]
pub trait ActivityLogSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<ActivityPage>;
}

// ============================================================================
// HealthProbe - Single liveness check
// ============================================================================

/// Liveness check against a health URL
///
/// `Ok(())` means the endpoint answered 2xx within `timeout`; anything else is
/// an error describing why the service is considered down.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<()>;
}

// ============================================================================
// DashboardSource - Independent dashboard metrics
// ============================================================================

/// Independent, independently fallible metric endpoints
#[async_trait]
pub trait DashboardSource: Send + Sync {
    async fn user_count(&self) -> Result<u64>;

    async fn project_count(&self) -> Result<u64>;

    async fn blog_post_count(&self) -> Result<u64>;

    async fn message_count(&self) -> Result<u64>;

    async fn weekly_visits(&self) -> Result<Vec<VisitPoint>>;
}
