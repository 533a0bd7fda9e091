//! Fold handler trait and the typed closure adapter.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::UpdateContext;
use crate::state::UpdateOutcome;

/// A fold function for one update method.
///
/// Receives the event payload, the previous state for the event's key
/// (`None` on the first event for that key) and the invocation context, and
/// returns the new state or [`UpdateOutcome::NoUpdate`].
///
/// Handlers are invoked concurrently for different keys but never for the
/// same key, and must not keep state of their own between invocations.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn apply(
        &self,
        event: Value,
        previous: Option<Value>,
        ctx: &UpdateContext<'_>,
    ) -> Result<UpdateOutcome<Value>, HandlerError>;
}

/// Error returned by a fold handler.
#[derive(Debug)]
pub struct HandlerError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error, using its message.
    pub fn from_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_source(err)
    }
}

/// Typed synchronous handler built by [`fold`].
pub struct Fold<E, S, F> {
    f: F,
    _types: PhantomData<fn(E, Option<S>) -> S>,
}

/// Adapts a typed closure into an [`UpdateHandler`].
///
/// The event payload is deserialized into `E`, the previous state into `S`,
/// and the returned state is serialized back to JSON.
///
/// ```ignore
/// let handler = fold(|event: ItemAdded, prev: Option<Cart>, _ctx| {
///     let mut cart = prev.unwrap_or_default();
///     cart.items.push(event.item);
///     Ok(UpdateOutcome::Updated(cart))
/// });
/// ```
pub fn fold<E, S, F>(f: F) -> Fold<E, S, F>
where
    F: Fn(E, Option<S>, &UpdateContext<'_>) -> Result<UpdateOutcome<S>, HandlerError> + Send + Sync,
{
    Fold {
        f,
        _types: PhantomData,
    }
}

#[async_trait]
impl<E, S, F> UpdateHandler for Fold<E, S, F>
where
    E: DeserializeOwned + Send + 'static,
    S: Serialize + DeserializeOwned + Send + 'static,
    F: Fn(E, Option<S>, &UpdateContext<'_>) -> Result<UpdateOutcome<S>, HandlerError> + Send + Sync,
{
    async fn apply(
        &self,
        event: Value,
        previous: Option<Value>,
        ctx: &UpdateContext<'_>,
    ) -> Result<UpdateOutcome<Value>, HandlerError> {
        let event: E = serde_json::from_value(event)?;
        let previous: Option<S> = previous.map(serde_json::from_value).transpose()?;
        let outcome = (self.f)(event, previous, ctx)?;
        Ok(outcome.try_map(serde_json::to_value)?)
    }
}
