// HTTP adapters for the admin API
//
// `ApiClient` implements every data-source trait against the REST API;
// `HttpHealthProbe` performs unauthenticated liveness checks. The API is
// loose about response shapes (bare numbers vs `{count}`, bare arrays vs
// wrapped objects), so payloads are decoded through untagged enums.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::activity::ActivityEvent;
use crate::activity_log::{ActivityPage, PageRequest};
use crate::config::{Endpoints, PulseConfig, StreamMode, DEFAULT_CONNECT_TIMEOUT};
use crate::dashboard::VisitPoint;
use crate::error::{Result, SourceError};
use crate::traits::{
    ActivityBatchStream, ActivityLogSource, ActivitySource, DashboardSource, HealthProbe,
};

#[derive(Deserialize)]
#[serde(untagged)]
enum CountPayload {
    Bare(u64),
    Count { count: u64 },
    Total { total: u64 },
}

impl CountPayload {
    fn value(self) -> u64 {
        match self {
            CountPayload::Bare(n)
            | CountPayload::Count { count: n }
            | CountPayload::Total { total: n } => n,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecentPayload {
    List(Vec<ActivityEvent>),
    Wrapped { activities: Vec<ActivityEvent> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VisitsPayload {
    List(Vec<VisitPoint>),
    Wrapped { visits: Vec<VisitPoint> },
}

/// One SSE `data:` payload: a single event or a newest-first batch
#[derive(Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Batch(Vec<ActivityEvent>),
    Single(Box<ActivityEvent>),
}

impl StreamPayload {
    fn into_batch(self) -> Vec<ActivityEvent> {
        match self {
            StreamPayload::Batch(events) => events,
            StreamPayload::Single(event) => vec![*event],
        }
    }
}

fn status_message(status: StatusCode, body: String) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.canonical_reason().unwrap_or("Unknown").to_string()
    } else {
        body.to_string()
    }
}

// ============================================================================
// ApiClient
// ============================================================================

/// REST client for the activity, metric and analytics endpoints
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    endpoints: Endpoints,
    stream_mode: StreamMode,
    request_timeout: Duration,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            endpoints: Endpoints::default(),
            stream_mode: StreamMode::default(),
            request_timeout: DEFAULT_CONNECT_TIMEOUT,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &PulseConfig) -> Self {
        let mut client = Self::new(&config.api_url)
            .with_endpoints(config.endpoints.clone())
            .with_stream_mode(config.stream.mode)
            .with_request_timeout(config.stream.connect_timeout);
        client.token = config.api_token.clone();
        client
    }

    /// Attach a bearer token to every API request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_stream_mode(mut self, mode: StreamMode) -> Self {
        self.stream_mode = mode;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.get(&url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.handle_response(response).await
    }

    fn map_send_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.request_timeout)
        } else {
            SourceError::Http(e)
        }
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: status_message(status, body),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn count(&self, path: &str) -> Result<u64> {
        let payload: CountPayload = self.get(self.request(path)).await?;
        Ok(payload.value())
    }
}

#[async_trait]
impl ActivitySource for ApiClient {
    #[instrument(skip(self))]
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<ActivityEvent>> {
        let payload: RecentPayload = self
            .get(
                self.request(&self.endpoints.recent_activity)
                    .query(&[("limit", limit)]),
            )
            .await?;
        let events = match payload {
            RecentPayload::List(events) => events,
            RecentPayload::Wrapped { activities } => activities,
        };
        debug!(count = events.len(), "Fetched recent activity");
        Ok(events)
    }

    async fn open_channel(&self) -> Result<Option<ActivityBatchStream>> {
        if self.stream_mode != StreamMode::Sse {
            return Ok(None);
        }

        // No request timeout here: the response body stays open for the
        // life of the channel.
        let response = self
            .request(&self.endpoints.activity_stream)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: status_message(status, body),
            });
        }

        debug!(url = %response.url(), "Opened activity event stream");

        let batches = response
            .bytes_stream()
            .eventsource()
            .filter_map(|item| async move {
                match item {
                    Ok(event) => {
                        if event.data.trim().is_empty() {
                            return None;
                        }
                        match serde_json::from_str::<StreamPayload>(&event.data) {
                            Ok(payload) => Some(Ok(payload.into_batch())),
                            Err(e) => {
                                warn!(error = %e, "Skipping malformed stream payload");
                                None
                            }
                        }
                    }
                    Err(e) => Some(Err(SourceError::channel(format!("stream error: {}", e)))),
                }
            });

        Ok(Some(Box::pin(batches)))
    }
}

#[async_trait]
impl ActivityLogSource for ApiClient {
    #[instrument(skip(self), fields(page = request.page, limit = request.limit))]
    async fn fetch_page(&self, request: &PageRequest) -> Result<ActivityPage> {
        self.get(self.request(&self.endpoints.activity_log).query(request))
            .await
    }
}

#[async_trait]
impl DashboardSource for ApiClient {
    async fn user_count(&self) -> Result<u64> {
        self.count(&self.endpoints.user_count).await
    }

    async fn project_count(&self) -> Result<u64> {
        self.count(&self.endpoints.project_count).await
    }

    async fn blog_post_count(&self) -> Result<u64> {
        self.count(&self.endpoints.blog_post_count).await
    }

    async fn message_count(&self) -> Result<u64> {
        self.count(&self.endpoints.message_count).await
    }

    async fn weekly_visits(&self) -> Result<Vec<VisitPoint>> {
        let payload: VisitsPayload = self.get(self.request(&self.endpoints.weekly_visits)).await?;
        Ok(match payload {
            VisitsPayload::List(points) => points,
            VisitsPayload::Wrapped { visits } => visits,
        })
    }
}

// ============================================================================
// HttpHealthProbe
// ============================================================================

/// Unauthenticated GET against a service health URL
#[derive(Debug, Clone, Default)]
pub struct HttpHealthProbe {
    http: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<()> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout(timeout)
                } else {
                    SourceError::Http(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SourceError::Api {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("Unknown")
                    .to_string(),
            })
        }
    }
}
