// Activity event types
//
// One recorded system event as delivered by the backend. The category tag is
// open-ended: unknown tags are kept verbatim in `ActivityType::Other` so new
// backend event kinds never break decoding or rendering.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque event identifier, stable across re-fetches
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Event category tag
///
/// Serialized as the backend's SCREAMING_SNAKE_CASE string. Tags this client
/// does not know about decode to `Other` and serialize back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivityType {
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    BlogCreated,
    BlogUpdated,
    BlogDeleted,
    MessageReceived,
    MessageDeleted,
    Login,
    Logout,
    NewVisitor,
    UserRegistered,
    RoleUpdated,
    /// Background list synchronisation, hidden from the dashboard by default
    ListFetched,
    Other(String),
}

/// Display bucket an event type falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    Content,
    Communication,
    Auth,
    Traffic,
    Admin,
    System,
    Unknown,
}

impl ActivityType {
    /// Wire tag for this type
    pub fn as_str(&self) -> &str {
        match self {
            ActivityType::ProjectCreated => "PROJECT_CREATED",
            ActivityType::ProjectUpdated => "PROJECT_UPDATED",
            ActivityType::ProjectDeleted => "PROJECT_DELETED",
            ActivityType::BlogCreated => "BLOG_CREATED",
            ActivityType::BlogUpdated => "BLOG_UPDATED",
            ActivityType::BlogDeleted => "BLOG_DELETED",
            ActivityType::MessageReceived => "MESSAGE_RECEIVED",
            ActivityType::MessageDeleted => "MESSAGE_DELETED",
            ActivityType::Login => "LOGIN",
            ActivityType::Logout => "LOGOUT",
            ActivityType::NewVisitor => "NEW_VISITOR",
            ActivityType::UserRegistered => "USER_REGISTERED",
            ActivityType::RoleUpdated => "ROLE_UPDATED",
            ActivityType::ListFetched => "LIST_FETCHED",
            ActivityType::Other(tag) => tag,
        }
    }

    pub fn category(&self) -> ActivityCategory {
        match self {
            ActivityType::ProjectCreated
            | ActivityType::ProjectUpdated
            | ActivityType::ProjectDeleted
            | ActivityType::BlogCreated
            | ActivityType::BlogUpdated
            | ActivityType::BlogDeleted => ActivityCategory::Content,
            ActivityType::MessageReceived | ActivityType::MessageDeleted => {
                ActivityCategory::Communication
            }
            ActivityType::Login | ActivityType::Logout => ActivityCategory::Auth,
            ActivityType::NewVisitor => ActivityCategory::Traffic,
            ActivityType::UserRegistered | ActivityType::RoleUpdated => ActivityCategory::Admin,
            ActivityType::ListFetched => ActivityCategory::System,
            ActivityType::Other(_) => ActivityCategory::Unknown,
        }
    }

    /// Human-readable label ("PROJECT_CREATED" -> "Project Created")
    pub fn label(&self) -> String {
        self.as_str()
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let lower = word.to_lowercase();
                let mut chars = lower.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ActivityType::Other(_))
    }
}

impl From<String> for ActivityType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "PROJECT_CREATED" => ActivityType::ProjectCreated,
            "PROJECT_UPDATED" => ActivityType::ProjectUpdated,
            "PROJECT_DELETED" => ActivityType::ProjectDeleted,
            "BLOG_CREATED" => ActivityType::BlogCreated,
            "BLOG_UPDATED" => ActivityType::BlogUpdated,
            "BLOG_DELETED" => ActivityType::BlogDeleted,
            "MESSAGE_RECEIVED" => ActivityType::MessageReceived,
            "MESSAGE_DELETED" => ActivityType::MessageDeleted,
            "LOGIN" => ActivityType::Login,
            "LOGOUT" => ActivityType::Logout,
            "NEW_VISITOR" => ActivityType::NewVisitor,
            "USER_REGISTERED" => ActivityType::UserRegistered,
            "ROLE_UPDATED" => ActivityType::RoleUpdated,
            "LIST_FETCHED" => ActivityType::ListFetched,
            _ => ActivityType::Other(tag),
        }
    }
}

impl From<&str> for ActivityType {
    fn from(tag: &str) -> Self {
        ActivityType::from(tag.to_string())
    }
}

impl From<ActivityType> for String {
    fn from(t: ActivityType) -> Self {
        match t {
            ActivityType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Error,
    Pending,
    Completed,
    #[serde(other)]
    Unknown,
}

/// One recorded system event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: ActivityType,
    #[serde(default)]
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ActivityEvent {
    /// Create an event with the required fields; optional fields start empty
    pub fn new(
        id: impl Into<EventId>,
        event_type: impl Into<ActivityType>,
        action: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            action: action.into(),
            timestamp,
            status: None,
            user_id: None,
            entity_id: None,
            metadata: None,
        }
    }

    pub fn with_status(mut self, status: ActivityStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Case-insensitive match used by the client-side search box.
    /// `needle` must already be lowercased.
    pub(crate) fn matches_search(&self, needle: &str) -> bool {
        let fields = [
            Some(self.action.as_str()),
            Some(self.event_type.as_str()),
            self.user_id.as_deref(),
            self.entity_id.as_deref(),
        ];
        fields
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Render a timestamp relative to `now` ("just now", "5m ago", "3h ago", "2d ago")
///
/// Timestamps in the future (clock skew between backend and client) render as
/// "just now". Anything older than 30 days falls back to the calendar date.
pub fn relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    let secs = elapsed.num_seconds();

    if secs < 60 {
        return "just now".to_string();
    }
    let minutes = elapsed.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }
    let hours = elapsed.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    let days = elapsed.num_days();
    if days <= 30 {
        return format!("{}d ago", days);
    }
    timestamp.format("%Y-%m-%d").to_string()
}
