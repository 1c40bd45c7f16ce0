pub mod client;

use crate::time::date_from_utc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub use client::{ApiClient, ApiError};

/// Profile record as the backend returns it. Only existence matters here,
/// so the body is kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInfo(pub serde_json::Value);

impl UserInfo {
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(|v| v.as_str())
    }

    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(|v| v.as_str())
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(deserialize_with = "deserialize_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_utc")]
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub is_open: bool,
    /// Fields this layer does not interpret (owner, states, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

fn deserialize_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    date_from_utc(&raw).map_err(serde::de::Error::custom)
}

/// Newest activity first.
pub fn sort_by_last_activity(sessions: &mut [SessionSummary]) {
    sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
}
