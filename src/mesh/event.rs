use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// `{event_id, event_type, source, actor, resource, payload, timestamp,
/// subsystem}`. Immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub event_type: String,
    pub source: String,
    pub actor: String,
    pub resource: String,
    pub payload: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub subsystem: String,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        actor: impl Into<String>,
        resource: impl Into<String>,
        subsystem: impl Into<String>,
        payload: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            source: source.into(),
            actor: actor.into(),
            resource: resource.into(),
            payload,
            timestamp: Utc::now(),
            subsystem: subsystem.into(),
        }
    }

    pub fn payload_value(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}
