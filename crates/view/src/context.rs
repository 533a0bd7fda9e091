//! Per-invocation context handed to fold handlers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{EventId, InstanceKey};

use crate::event::ViewEvent;

/// Read-only metadata for a single fold invocation.
///
/// Borrows from the event being folded, so a handler cannot keep it past the
/// invocation.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    view_id: &'a str,
    event: &'a ViewEvent,
}

impl<'a> UpdateContext<'a> {
    pub(crate) fn new(view_id: &'a str, event: &'a ViewEvent) -> Self {
        Self { view_id, event }
    }

    pub fn view_id(&self) -> &'a str {
        self.view_id
    }

    /// Update method being invoked.
    pub fn method(&self) -> &'a str {
        &self.event.method
    }

    pub fn instance_key(&self) -> &'a InstanceKey {
        &self.event.instance_key
    }

    pub fn event_id(&self) -> EventId {
        self.event.event_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.event.timestamp
    }

    pub fn metadata(&self) -> &'a HashMap<String, String> {
        &self.event.metadata
    }
}
