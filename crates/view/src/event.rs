//! Events delivered to a view by the runtime.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{EventId, InstanceKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An already-deserialized upstream event addressed to one update method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewEvent {
    /// Unique identifier for this event.
    #[serde(default)]
    pub event_id: EventId,

    /// Name of the update method the event is routed to.
    pub method: String,

    /// Key whose state this event folds into.
    pub instance_key: InstanceKey,

    /// The event message as JSON.
    pub payload: Value,

    /// When the event was produced upstream.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Upstream metadata (subject, source, trace headers, ...).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ViewEvent {
    pub fn new(method: impl Into<String>, instance_key: impl Into<InstanceKey>, payload: Value) -> Self {
        Self {
            event_id: EventId::new(),
            method: method.into(),
            instance_key: instance_key.into(),
            payload,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Creates an event from a serializable payload.
    pub fn from_payload<T: Serialize>(
        method: impl Into<String>,
        instance_key: impl Into<InstanceKey>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(method, instance_key, serde_json::to_value(payload)?))
    }

    pub fn with_event_id(mut self, event_id: EventId) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
