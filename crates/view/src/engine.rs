//! Per-event fold of view state.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::context::UpdateContext;
use crate::error::UpdateError;
use crate::event::ViewEvent;
use crate::handler::HandlerError;
use crate::registry::HandlerRegistry;
use crate::shape::check_message;
use crate::state::{UpdateOutcome, ViewState};

/// Folds events into view state using a validated handler registry.
///
/// The engine only holds shared, immutable data and can be cloned freely
/// across tasks. It never persists anything: the caller stores the returned
/// state once the fold has completed, so dropping an in-flight call leaves
/// persisted state untouched.
#[derive(Debug, Clone)]
pub struct UpdateEngine {
    view_id: Arc<str>,
    registry: Arc<HandlerRegistry>,
}

impl UpdateEngine {
    pub(crate) fn new(view_id: &str, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            view_id: Arc::from(view_id),
            registry,
        }
    }

    pub fn view_id(&self) -> &str {
        &self.view_id
    }

    /// Folds one event into the previous state of its key.
    ///
    /// Returns `Updated` with the new state (tagged with the method's output
    /// type) or `NoUpdate` when the handler chose to leave the state as is.
    /// The payload must conform to the method's input message and the new
    /// state to its output message.
    #[tracing::instrument(
        skip(self, event, previous),
        fields(view_id = %self.view_id, method = %event.method, key = %event.instance_key)
    )]
    pub async fn handle(
        &self,
        event: &ViewEvent,
        previous: Option<ViewState>,
    ) -> Result<UpdateOutcome<ViewState>, UpdateError> {
        let Some((slot, handler)) = self
            .registry
            .slot(&event.method)
            .and_then(|slot| slot.handler().map(|h| (slot, h)))
        else {
            metrics::counter!("view_update_failures", "view" => self.view_id.to_string())
                .increment(1);
            return Err(UpdateError::UnhandledEvent {
                view_id: self.view_id.to_string(),
                method: event.method.clone(),
                key: event.instance_key.clone(),
            });
        };

        let state_type = slot.method().output_type.as_str();
        if let Some(previous) = &previous
            && previous.type_name() != state_type
        {
            return Err(UpdateError::StateTypeMismatch {
                method: event.method.clone(),
                key: event.instance_key.clone(),
                expected: state_type.to_string(),
                actual: previous.type_name().to_string(),
            });
        }

        let pool = self.registry.contract().pool();
        if let Err(source) = check_message(pool, slot.input(), &event.payload) {
            metrics::counter!("view_update_failures", "view" => self.view_id.to_string())
                .increment(1);
            tracing::warn!(error = %source, "event payload rejected");
            return Err(UpdateError::InvalidPayload {
                view_id: self.view_id.to_string(),
                method: event.method.clone(),
                key: event.instance_key.clone(),
                expected: slot.input().full_name().to_string(),
                source,
            });
        }

        let ctx = UpdateContext::new(&self.view_id, event);
        let first = previous.is_none();
        let result = AssertUnwindSafe(handler.apply(
            event.payload.clone(),
            previous.map(ViewState::into_value),
            &ctx,
        ))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(HandlerError::new(panic_message(&*panic))));

        match result {
            Ok(UpdateOutcome::Updated(value)) => {
                if let Err(source) = check_message(pool, slot.output(), &value) {
                    metrics::counter!("view_update_failures", "view" => self.view_id.to_string())
                        .increment(1);
                    tracing::warn!(error = %source, "handler returned a malformed state");
                    return Err(UpdateError::InvalidState {
                        view_id: self.view_id.to_string(),
                        method: event.method.clone(),
                        key: event.instance_key.clone(),
                        expected: state_type.to_string(),
                        source,
                    });
                }
                metrics::counter!("view_updates_applied", "view" => self.view_id.to_string())
                    .increment(1);
                tracing::debug!(first, "state updated");
                Ok(UpdateOutcome::Updated(ViewState::new(state_type, value)))
            }
            Ok(UpdateOutcome::NoUpdate) => {
                metrics::counter!("view_updates_skipped", "view" => self.view_id.to_string())
                    .increment(1);
                tracing::debug!("handler returned no update");
                Ok(UpdateOutcome::NoUpdate)
            }
            Err(source) => {
                metrics::counter!("view_update_failures", "view" => self.view_id.to_string())
                    .increment(1);
                tracing::warn!(error = %source, "update handler failed");
                Err(UpdateError::HandlerExecution {
                    view_id: self.view_id.to_string(),
                    method: event.method.clone(),
                    key: event.instance_key.clone(),
                    source,
                })
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ViewBuilder, ViewDefinition, ViewOptions};
    use crate::handler::fold;
    use crate::registry::UpdateHandlers;
    use descriptor::{DescriptorPool, FileBuilder};
    use serde::{Deserialize, Serialize};
    use serde_json::{Value, json};

    #[derive(Deserialize)]
    struct ItemAdded {
        item: String,
    }

    #[derive(Serialize, Deserialize, Default)]
    struct Cart {
        items: Vec<String>,
    }

    fn definition(handlers: UpdateHandlers) -> ViewDefinition {
        let file = FileBuilder::new("cart.proto", "shopping.cart.v1")
            .message("ItemAdded", |m| m.string("item"))
            .message("ItemRemoved", |m| m.string("item"))
            .message("Cart", |m| m.repeated_string("items"))
            .service("CartEvents", |s| {
                s.transform_update("ItemAdded", "ItemAdded", "Cart", "carts")
                    .transform_update("ItemRemoved", "ItemRemoved", "Cart", "carts")
            });
        let pool = Arc::new(DescriptorPool::from_sets([file.into_set()]));
        ViewBuilder::from_pool(&pool, "shopping.cart.v1.CartEvents", ViewOptions::default())
            .unwrap()
            .register(handlers)
            .unwrap()
    }

    fn append_item() -> UpdateHandlers {
        UpdateHandlers::new().on(
            "ItemAdded",
            fold(|event: ItemAdded, prev: Option<Cart>, _ctx| {
                let mut cart = prev.unwrap_or_default();
                cart.items.push(event.item);
                Ok(UpdateOutcome::Updated(cart))
            }),
        )
    }

    #[tokio::test]
    async fn first_event_sees_no_previous_state() {
        let engine = definition(append_item()).engine();
        let event = ViewEvent::new("ItemAdded", "cart-1", json!({"item": "A"}));

        let outcome = engine.handle(&event, None).await.unwrap();
        let state = outcome.into_state().unwrap();
        assert_eq!(state.type_name(), "shopping.cart.v1.Cart");
        assert_eq!(state.value(), &json!({"items": ["A"]}));
    }

    #[tokio::test]
    async fn folds_onto_previous_state() {
        let engine = definition(append_item()).engine();
        let previous = ViewState::new("shopping.cart.v1.Cart", json!({"items": ["A"]}));
        let event = ViewEvent::new("ItemAdded", "cart-1", json!({"item": "B"}));

        let state = engine
            .handle(&event, Some(previous))
            .await
            .unwrap()
            .into_state()
            .unwrap();
        assert_eq!(state.value(), &json!({"items": ["A", "B"]}));
    }

    #[tokio::test]
    async fn method_without_handler_is_unhandled() {
        let engine = definition(append_item()).engine();
        let event = ViewEvent::new("ItemRemoved", "cart-1", json!({"item": "A"}));

        let err = engine.handle(&event, None).await.unwrap_err();
        assert!(matches!(err, UpdateError::UnhandledEvent { ref method, .. } if method == "ItemRemoved"));
    }

    #[tokio::test]
    async fn method_outside_contract_is_unhandled() {
        let engine = definition(append_item()).engine();
        let event = ViewEvent::new("Teleported", "cart-1", json!({}));

        let err = engine.handle(&event, None).await.unwrap_err();
        assert!(matches!(err, UpdateError::UnhandledEvent { .. }));
    }

    #[tokio::test]
    async fn handler_error_is_scoped_to_the_event() {
        let handlers = UpdateHandlers::new().on(
            "ItemAdded",
            fold(|event: ItemAdded, _prev: Option<Cart>, ctx| {
                Err::<UpdateOutcome<Cart>, _>(HandlerError::new(format!(
                    "rejected {} for {}",
                    event.item,
                    ctx.instance_key()
                )))
            }),
        );
        let engine = definition(handlers).engine();
        let event = ViewEvent::new("ItemAdded", "cart-2", json!({"item": "X"}));

        let err = engine.handle(&event, None).await.unwrap_err();
        match err {
            UpdateError::HandlerExecution { key, source, .. } => {
                assert_eq!(key.as_str(), "cart-2");
                assert_eq!(source.message(), "rejected X for cart-2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn handler_panic_becomes_execution_error() {
        let handlers = UpdateHandlers::new().on(
            "ItemAdded",
            fold(|_event: ItemAdded, _prev: Option<Cart>, _ctx| -> Result<UpdateOutcome<Cart>, HandlerError> {
                panic!("corrupt cart")
            }),
        );
        let engine = definition(handlers).engine();
        let event = ViewEvent::new("ItemAdded", "cart-3", json!({"item": "X"}));

        let err = engine.handle(&event, None).await.unwrap_err();
        assert!(err.to_string().contains("handler panicked: corrupt cart"));
    }

    #[tokio::test]
    async fn no_update_is_idempotent() {
        let handlers = UpdateHandlers::new().on(
            "ItemAdded",
            fold(|_event: ItemAdded, _prev: Option<Cart>, _ctx| Ok(UpdateOutcome::NoUpdate)),
        );
        let engine = definition(handlers).engine();
        let previous = ViewState::new("shopping.cart.v1.Cart", json!({"items": ["A"]}));
        let event = ViewEvent::new("ItemAdded", "cart-1", json!({"item": "B"}));

        for _ in 0..2 {
            let outcome = engine.handle(&event, Some(previous.clone())).await.unwrap();
            assert_eq!(outcome, UpdateOutcome::NoUpdate);
        }
    }

    #[tokio::test]
    async fn mistyped_previous_state_is_rejected() {
        let engine = definition(append_item()).engine();
        let previous = ViewState::new("shopping.cart.v1.ItemAdded", json!({"item": "A"}));
        let event = ViewEvent::new("ItemAdded", "cart-1", json!({"item": "B"}));

        let err = engine.handle(&event, Some(previous)).await.unwrap_err();
        assert!(matches!(err, UpdateError::StateTypeMismatch { .. }));
    }

    struct Returns(Value);

    #[async_trait::async_trait]
    impl crate::handler::UpdateHandler for Returns {
        async fn apply(
            &self,
            _event: Value,
            _previous: Option<Value>,
            _ctx: &UpdateContext<'_>,
        ) -> Result<UpdateOutcome<Value>, HandlerError> {
            Ok(UpdateOutcome::Updated(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn payload_must_match_input_type() {
        let handlers = UpdateHandlers::new().on("ItemAdded", Returns(json!({"items": []})));
        let engine = definition(handlers).engine();

        for payload in [json!(42), json!({"item": 7}), json!({"sku": "A"})] {
            let event = ViewEvent::new("ItemAdded", "cart-1", payload);
            let err = engine.handle(&event, None).await.unwrap_err();
            match err {
                UpdateError::InvalidPayload { expected, .. } => {
                    assert_eq!(expected, "shopping.cart.v1.ItemAdded");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[tokio::test]
    async fn returned_state_must_match_output_type() {
        for state in [json!("not a cart"), json!({"items": "A"}), json!({"items": [1]})] {
            let handlers = UpdateHandlers::new().on("ItemAdded", Returns(state));
            let engine = definition(handlers).engine();
            let event = ViewEvent::new("ItemAdded", "cart-1", json!({"item": "A"}));

            let err = engine.handle(&event, None).await.unwrap_err();
            assert!(matches!(err, UpdateError::InvalidState { .. }), "{err}");
            assert!(!err.is_fatal_for_key());
        }
    }

    #[tokio::test]
    async fn context_carries_view_and_event_metadata() {
        let handlers = UpdateHandlers::new().on(
            "ItemAdded",
            fold(|_event: ItemAdded, _prev: Option<Cart>, ctx| {
                assert_eq!(ctx.view_id(), "CartEvents");
                assert_eq!(ctx.method(), "ItemAdded");
                assert_eq!(ctx.metadata()["ce-source"], "checkout");
                Ok(UpdateOutcome::Updated(Cart::default()))
            }),
        );
        let engine = definition(handlers).engine();
        let event = ViewEvent::new("ItemAdded", "cart-1", json!({"item": "B"}))
            .with_metadata("ce-source", "checkout");

        assert!(engine.handle(&event, None).await.unwrap().is_updated());
    }
}
