//! View state and fold outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted state for one instance key, tagged with its message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    type_name: String,
    value: Value,
}

impl ViewState {
    pub fn new(type_name: impl Into<String>, value: Value) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }

    /// Fully-qualified message type of the state.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Deserializes the state into a concrete type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.value)
    }
}

/// Result of folding one event.
///
/// `NoUpdate` leaves the persisted state untouched; it is distinct from
/// `Updated` with an empty value.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<S> {
    Updated(S),
    NoUpdate,
}

impl<S> UpdateOutcome<S> {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }

    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> UpdateOutcome<T> {
        match self {
            Self::Updated(state) => UpdateOutcome::Updated(f(state)),
            Self::NoUpdate => UpdateOutcome::NoUpdate,
        }
    }

    pub fn try_map<T, E>(self, f: impl FnOnce(S) -> Result<T, E>) -> Result<UpdateOutcome<T>, E> {
        match self {
            Self::Updated(state) => f(state).map(UpdateOutcome::Updated),
            Self::NoUpdate => Ok(UpdateOutcome::NoUpdate),
        }
    }

    pub fn into_state(self) -> Option<S> {
        match self {
            Self::Updated(state) => Some(state),
            Self::NoUpdate => None,
        }
    }
}
