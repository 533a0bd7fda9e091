//! View error types.

use common::InstanceKey;
use descriptor::DescriptorError;
use thiserror::Error;

use crate::handler::HandlerError;
use crate::shape::ShapeError;

/// Definition-time errors. A view that fails with one of these never starts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The descriptor could not be loaded or the service could not be resolved.
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// A handler names a method the service does not declare.
    #[error("Handler registered for unknown method {method} on {service}")]
    UnknownMethod { service: String, method: String },

    /// A handler names a method that is not flagged for transform updates.
    #[error("Method {service}.{method} is not a transform-update method")]
    NotTransformMethod { service: String, method: String },

    /// The same method was given more than one handler.
    #[error("Handler for method {method} registered more than once")]
    DuplicateHandler { method: String },

    /// Bound transform-update methods declare different state types, so a
    /// key's state could not satisfy all of them.
    #[error("Method {method} of {service} produces {actual}, other handlers produce {expected}")]
    ConflictingStateTypes {
        service: String,
        method: String,
        expected: String,
        actual: String,
    },

    /// The view id is empty or contains whitespace.
    #[error("Invalid view id {0:?}")]
    InvalidViewId(String),
}

/// Per-event errors raised by the update engine.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// No handler is bound to the event's method. Retrying cannot help: the
    /// deployed schema and code disagree.
    #[error("No handler for method {method} in view {view_id} (key {key})")]
    UnhandledEvent {
        view_id: String,
        method: String,
        key: InstanceKey,
    },

    /// The handler returned an error or panicked.
    #[error("Handler {method} in view {view_id} failed for key {key}: {source}")]
    HandlerExecution {
        view_id: String,
        method: String,
        key: InstanceKey,
        #[source]
        source: HandlerError,
    },

    /// The event payload does not match the method's input message.
    #[error("Payload of {method} in view {view_id} (key {key}) is not a valid {expected}: {source}")]
    InvalidPayload {
        view_id: String,
        method: String,
        key: InstanceKey,
        expected: String,
        #[source]
        source: ShapeError,
    },

    /// The handler returned a state that does not match the declared state
    /// message. Nothing is returned for storage.
    #[error("Handler {method} in view {view_id} returned an invalid {expected} for key {key}: {source}")]
    InvalidState {
        view_id: String,
        method: String,
        key: InstanceKey,
        expected: String,
        #[source]
        source: ShapeError,
    },

    /// The supplied previous state is not of the method's declared state type.
    #[error("State for key {key} has type {actual}, method {method} expects {expected}")]
    StateTypeMismatch {
        method: String,
        key: InstanceKey,
        expected: String,
        actual: String,
    },
}

impl UpdateError {
    /// Instance key of the event that failed.
    pub fn key(&self) -> &InstanceKey {
        match self {
            Self::UnhandledEvent { key, .. }
            | Self::HandlerExecution { key, .. }
            | Self::InvalidPayload { key, .. }
            | Self::InvalidState { key, .. }
            | Self::StateTypeMismatch { key, .. } => key,
        }
    }

    /// Method of the event that failed.
    pub fn method(&self) -> &str {
        match self {
            Self::UnhandledEvent { method, .. }
            | Self::HandlerExecution { method, .. }
            | Self::InvalidPayload { method, .. }
            | Self::InvalidState { method, .. }
            | Self::StateTypeMismatch { method, .. } => method,
        }
    }

    /// Returns true if no further events should be delivered for the key.
    ///
    /// Failures confined to one event (handler errors and malformed payloads
    /// or states) are not fatal; the runtime's error policy decides.
    pub fn is_fatal_for_key(&self) -> bool {
        matches!(
            self,
            Self::UnhandledEvent { .. } | Self::StateTypeMismatch { .. }
        )
    }
}
