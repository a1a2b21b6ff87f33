// Configuration
//
// Settings come from three layers, later layers winning:
// 1. built-in defaults
// 2. an optional YAML file (service list, endpoint paths, noise types)
// 3. PULSE_* environment variables (scalars only)

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::activity::ActivityType;
use crate::error::ConfigError;
use crate::health::ServiceDescriptor;
use crate::unread::BeforeFirstView;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_FEED_CAPACITY: usize = 50;
pub const DEFAULT_REFRESH_LIMIT: usize = 20;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PROBE_CONCURRENCY: usize = 4;

/// How the stream client receives new events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Short-poll the recent-events endpoint
    #[default]
    Poll,
    /// Server-sent events push channel
    Sse,
}

impl StreamMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "poll" => Some(StreamMode::Poll),
            "sse" | "push" => Some(StreamMode::Sse),
            _ => None,
        }
    }
}

/// Event stream client settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub mode: StreamMode,

    /// Maximum events kept in the live feed
    pub capacity: usize,

    /// Events fetched on connect and on refresh
    pub refresh_limit: usize,

    #[serde(with = "duration_millis", rename = "poll_interval_ms")]
    pub poll_interval: Duration,

    /// Bound on the initial connect attempt and on every poll
    #[serde(with = "duration_millis", rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            mode: StreamMode::Poll,
            capacity: DEFAULT_FEED_CAPACITY,
            refresh_limit: DEFAULT_REFRESH_LIMIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_refresh_limit(mut self, limit: usize) -> Self {
        self.refresh_limit = limit.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Health probe pool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProbeConfig {
    #[serde(with = "duration_millis", rename = "timeout_ms")]
    pub timeout: Duration,

    /// Probes in flight during `check_all`; 1 checks strictly in sequence
    pub concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
            concurrency: DEFAULT_PROBE_CONCURRENCY,
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn sequential(self) -> Self {
        self.with_concurrency(1)
    }
}

/// Endpoint paths, relative to the API base URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    pub activity_log: String,
    pub recent_activity: String,
    pub activity_stream: String,
    pub user_count: String,
    pub project_count: String,
    pub blog_post_count: String,
    pub message_count: String,
    pub weekly_visits: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            activity_log: "/api/activities".to_string(),
            recent_activity: "/api/activities/recent".to_string(),
            activity_stream: "/api/activities/stream".to_string(),
            user_count: "/api/users/count".to_string(),
            project_count: "/api/projects/count".to_string(),
            blog_post_count: "/api/blogs/count".to_string(),
            message_count: "/api/messages/count".to_string(),
            weekly_visits: "/api/analytics/weekly-visits".to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PulseConfig {
    /// API base URL
    pub api_url: String,

    /// Opaque bearer token attached to API requests (never to health probes)
    #[serde(skip_serializing)]
    pub api_token: Option<String>,

    /// Monitored services; defaults to `<api_url>/health` when empty
    pub services: Vec<ServiceDescriptor>,

    pub endpoints: Endpoints,

    pub stream: StreamConfig,

    pub probe: ProbeConfig,

    /// Unread count before the notification panel was ever opened
    pub unread_before_first_view: BeforeFirstView,

    /// Event types hidden from the dashboard activity panel
    pub noise_types: Vec<ActivityType>,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            services: Vec::new(),
            endpoints: Endpoints::default(),
            stream: StreamConfig::default(),
            probe: ProbeConfig::default(),
            unread_before_first_view: BeforeFirstView::default(),
            noise_types: vec![ActivityType::ListFetched],
        }
    }
}

impl PulseConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `PULSE_API_URL`: API base URL (default: http://localhost:5000)
    /// - `PULSE_API_TOKEN`: bearer token for API requests
    /// - `PULSE_STREAM_MODE`: `poll` or `sse` (default: poll)
    /// - `PULSE_POLL_INTERVAL_MS`, `PULSE_CONNECT_TIMEOUT_MS`
    /// - `PULSE_FEED_CAPACITY`, `PULSE_REFRESH_LIMIT`
    /// - `PULSE_PROBE_TIMEOUT_MS`, `PULSE_PROBE_CONCURRENCY`
    /// - `PULSE_UNREAD_BEFORE_FIRST_VIEW`: `none` or `all` (default: none)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.finalize();
        config
    }

    /// Load a YAML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_yaml_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.finalize();
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file; missing keys take their defaults
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: PulseConfig = serde_yaml::from_str(raw)?;
        config.finalize();
        config.validate()?;
        Ok(config)
    }

    /// Point at another API; services probing `<old url>/health` follow it
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        let previous = format!("{}/health", self.api_url);
        self.api_url = url.into().trim_end_matches('/').to_string();
        for service in &mut self.services {
            if service.health_url == previous {
                service.health_url = format!("{}/health", self.api_url);
            }
        }
        self
    }

    pub fn with_services(mut self, services: Vec<ServiceDescriptor>) -> Self {
        self.services = services;
        self
    }

    /// Apply `PULSE_*` overrides read through `lookup`
    ///
    /// Malformed numbers are ignored and the current value is kept.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(url) = lookup("PULSE_API_URL").filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(token) = lookup("PULSE_API_TOKEN").filter(|v| !v.is_empty()) {
            self.api_token = Some(token);
        }
        if let Some(mode) = lookup("PULSE_STREAM_MODE").and_then(|v| StreamMode::parse(&v)) {
            self.stream.mode = mode;
        }
        if let Some(ms) = number("PULSE_POLL_INTERVAL_MS") {
            self.stream.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = number("PULSE_CONNECT_TIMEOUT_MS") {
            self.stream.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = number("PULSE_FEED_CAPACITY") {
            self.stream.capacity = (n as usize).max(1);
        }
        if let Some(n) = number("PULSE_REFRESH_LIMIT") {
            self.stream.refresh_limit = (n as usize).max(1);
        }
        if let Some(ms) = number("PULSE_PROBE_TIMEOUT_MS") {
            self.probe.timeout = Duration::from_millis(ms);
        }
        if let Some(n) = number("PULSE_PROBE_CONCURRENCY") {
            self.probe.concurrency = (n as usize).max(1);
        }
        if let Some(policy) =
            lookup("PULSE_UNREAD_BEFORE_FIRST_VIEW").and_then(|v| BeforeFirstView::parse(&v))
        {
            self.unread_before_first_view = policy;
        }
    }

    /// Fill derived defaults that depend on other fields
    fn finalize(&mut self) {
        self.api_url = self.api_url.trim_end_matches('/').to_string();
        if self.services.is_empty() {
            self.services = vec![ServiceDescriptor::new(
                "main",
                "Main API",
                format!("{}/health", self.api_url),
                "api",
            )];
        }
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.is_empty() {
            return Err(ConfigError::invalid("api_url must not be empty"));
        }
        let mut seen = std::collections::HashSet::new();
        for service in &self.services {
            if service.health_url.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "service '{}' has no health_url",
                    service.id
                )));
            }
            if !seen.insert(service.id.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate service id '{}'",
                    service.id
                )));
            }
        }
        for (name, duration) in [
            ("stream.poll_interval_ms", self.stream.poll_interval),
            ("stream.connect_timeout_ms", self.stream.connect_timeout),
            ("probe.timeout_ms", self.probe.timeout),
        ] {
            if duration.is_zero() {
                return Err(ConfigError::invalid(format!("{} must be greater than 0", name)));
            }
        }
        if self.stream.capacity < self.stream.refresh_limit {
            return Err(ConfigError::invalid(format!(
                "stream.capacity ({}) must be at least stream.refresh_limit ({})",
                self.stream.capacity, self.stream.refresh_limit
            )));
        }
        Ok(())
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
