//! Page-view event document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One tracked navigation, as posted to the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageViewEvent {
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
}

impl PageViewEvent {
    pub fn new(path: impl Into<String>, timestamp: DateTime<Utc>, session_id: Uuid) -> Self {
        Self {
            path: path.into(),
            timestamp,
            session_id,
        }
    }
}
