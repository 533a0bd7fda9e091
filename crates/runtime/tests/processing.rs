//! Integration tests: cart view → processor → in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::InstanceKey;
use descriptor::{DescriptorPool, FileBuilder};
use futures_util::stream;
use runtime::{ErrorPolicy, InMemoryViewStore, RuntimeConfig, RuntimeError, ViewProcessor};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use view::{
    HandlerError, UpdateContext, UpdateError, UpdateHandler, UpdateHandlers, UpdateOutcome,
    ViewBuilder, ViewDefinition, ViewEvent, ViewOptions, fold,
};

#[derive(Deserialize)]
struct ItemAdded {
    item: String,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
struct Cart {
    items: Vec<String>,
}

fn cart_pool() -> Arc<DescriptorPool> {
    let file = FileBuilder::new("shopping/cart/v1/cart.proto", "shopping.cart.v1")
        .message("ItemAdded", |m| m.string("item"))
        .message("ItemRemoved", |m| m.string("item"))
        .message("CartCheckedOut", |m| m.string("cart_id"))
        .message("Cart", |m| m.repeated_string("items"))
        .service("CartEvents", |s| {
            s.transform_update("ItemAdded", "ItemAdded", "Cart", "carts")
                .transform_update("ItemRemoved", "ItemRemoved", "Cart", "carts")
                .transform_update("CartCheckedOut", "CartCheckedOut", "Cart", "carts")
        });
    Arc::new(DescriptorPool::from_sets([file.into_set()]))
}

/// `ItemAdded` appends; an item named "poison" makes the handler fail.
fn cart_view(extra: UpdateHandlers) -> ViewDefinition {
    let handlers = extra.on(
        "ItemAdded",
        fold(|event: ItemAdded, prev: Option<Cart>, _ctx| {
            if event.item == "poison" {
                return Err(HandlerError::new("poisoned item"));
            }
            let mut cart = prev.unwrap_or_default();
            cart.items.push(event.item);
            Ok(UpdateOutcome::Updated(cart))
        }),
    );
    ViewBuilder::from_pool(&cart_pool(), "shopping.cart.v1.CartEvents", ViewOptions::default())
        .unwrap()
        .register(handlers)
        .unwrap()
}

fn added(key: &str, item: &str) -> ViewEvent {
    ViewEvent::new("ItemAdded", key, json!({ "item": item }))
}

async fn cart(processor: &ViewProcessor<InMemoryViewStore>, key: &str) -> Option<Cart> {
    processor
        .state(&InstanceKey::new(key))
        .await
        .unwrap()
        .map(|state| state.decode().unwrap())
}

#[tokio::test]
async fn two_items_for_one_cart() {
    let processor = ViewProcessor::new(&cart_view(UpdateHandlers::new()), InMemoryViewStore::new());

    processor.process(&added("cart-1", "A")).await.unwrap();
    processor.process(&added("cart-1", "B")).await.unwrap();

    assert_eq!(
        cart(&processor, "cart-1").await,
        Some(Cart {
            items: vec!["A".into(), "B".into()]
        })
    );
}

#[tokio::test]
async fn unhandled_event_leaves_state_unchanged() {
    let processor = ViewProcessor::new(&cart_view(UpdateHandlers::new()), InMemoryViewStore::new());
    processor.process(&added("cart-1", "A")).await.unwrap();

    let removed = ViewEvent::new("ItemRemoved", "cart-1", json!({"item": "A"}));
    let err = processor.process(&removed).await.unwrap_err();

    assert!(matches!(err, RuntimeError::Update(UpdateError::UnhandledEvent { .. })));
    assert_eq!(cart(&processor, "cart-1").await.unwrap().items, ["A"]);
}

#[tokio::test]
async fn failure_for_one_cart_does_not_touch_another() {
    let processor = ViewProcessor::new(&cart_view(UpdateHandlers::new()), InMemoryViewStore::new());
    processor.process(&added("cart-1", "A")).await.unwrap();

    let err = processor.process(&added("cart-2", "poison")).await.unwrap_err();
    match err {
        RuntimeError::Update(UpdateError::HandlerExecution { key, .. }) => {
            assert_eq!(key.as_str(), "cart-2");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(cart(&processor, "cart-1").await.unwrap().items, ["A"]);
    assert!(cart(&processor, "cart-2").await.is_none());
}

#[tokio::test]
async fn no_update_twice_keeps_stored_state() {
    let checkout = UpdateHandlers::new().on(
        "CartCheckedOut",
        fold(|_event: Value, _prev: Option<Cart>, _ctx| Ok(UpdateOutcome::NoUpdate)),
    );
    let processor = ViewProcessor::new(&cart_view(checkout), InMemoryViewStore::new());
    processor.process(&added("cart-1", "A")).await.unwrap();

    let checked_out = ViewEvent::new("CartCheckedOut", "cart-1", json!({"cart_id": "cart-1"}));
    for _ in 0..2 {
        let outcome = processor.process(&checked_out).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::NoUpdate);
        assert_eq!(cart(&processor, "cart-1").await.unwrap().items, ["A"]);
    }
}

#[tokio::test]
async fn run_keeps_per_key_order_across_many_keys() {
    let processor = Arc::new(ViewProcessor::new(
        &cart_view(UpdateHandlers::new()),
        InMemoryViewStore::new(),
    ));

    let mut events = Vec::new();
    for i in 0..20 {
        for key in ["cart-a", "cart-b", "cart-c"] {
            events.push(added(key, &i.to_string()));
        }
    }

    let report = Arc::clone(&processor).run(stream::iter(events)).await;
    assert!(report.is_clean());
    assert_eq!(report.processed, 60);
    assert_eq!(report.updated, 60);

    let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    for key in ["cart-a", "cart-b", "cart-c"] {
        assert_eq!(cart(&processor, key).await.unwrap().items, expected);
    }
}

#[tokio::test]
async fn run_halts_failed_key_by_default() {
    let processor = Arc::new(ViewProcessor::new(
        &cart_view(UpdateHandlers::new()),
        InMemoryViewStore::new(),
    ));
    let events = vec![
        added("cart-1", "A"),
        added("cart-2", "A"),
        added("cart-2", "poison"),
        added("cart-2", "B"),
        added("cart-1", "B"),
    ];

    let report = Arc::clone(&processor).run(stream::iter(events)).await;

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key.as_str(), "cart-2");
    assert_eq!(report.halted_keys, [InstanceKey::new("cart-2")]);
    assert_eq!(report.dropped, 1);
    assert_eq!(cart(&processor, "cart-1").await.unwrap().items, ["A", "B"]);
    assert_eq!(cart(&processor, "cart-2").await.unwrap().items, ["A"]);
}

#[tokio::test]
async fn run_skips_failed_event_under_skip_policy() {
    let config = RuntimeConfig {
        error_policy: ErrorPolicy::Skip,
        ..RuntimeConfig::default()
    };
    let processor = Arc::new(ViewProcessor::with_config(
        &cart_view(UpdateHandlers::new()),
        InMemoryViewStore::new(),
        config,
    ));
    let events = vec![
        added("cart-2", "A"),
        added("cart-2", "poison"),
        added("cart-2", "B"),
    ];

    let report = Arc::clone(&processor).run(stream::iter(events)).await;

    assert_eq!(report.failures.len(), 1);
    assert!(report.halted_keys.is_empty());
    assert_eq!(cart(&processor, "cart-2").await.unwrap().items, ["A", "B"]);
}

#[tokio::test]
async fn run_always_halts_on_unhandled_event() {
    let config = RuntimeConfig {
        error_policy: ErrorPolicy::Skip,
        ..RuntimeConfig::default()
    };
    let processor = Arc::new(ViewProcessor::with_config(
        &cart_view(UpdateHandlers::new()),
        InMemoryViewStore::new(),
        config,
    ));
    let events = vec![
        added("cart-1", "A"),
        ViewEvent::new("ItemRemoved", "cart-1", json!({"item": "A"})),
        added("cart-1", "B"),
    ];

    let report = Arc::clone(&processor).run(stream::iter(events)).await;

    assert_eq!(report.halted_keys, [InstanceKey::new("cart-1")]);
    assert_eq!(cart(&processor, "cart-1").await.unwrap().items, ["A"]);
}

/// Takes far longer than the test is willing to wait.
struct SlowHandler;

#[async_trait]
impl UpdateHandler for SlowHandler {
    async fn apply(
        &self,
        _event: Value,
        _previous: Option<Value>,
        _ctx: &UpdateContext<'_>,
    ) -> Result<UpdateOutcome<Value>, HandlerError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(UpdateOutcome::Updated(json!({"items": ["late"]})))
    }
}

#[tokio::test]
async fn cancelled_fold_persists_nothing() {
    let slow = UpdateHandlers::new().on("ItemRemoved", SlowHandler);
    let processor = ViewProcessor::new(&cart_view(slow), InMemoryViewStore::new());
    processor.process(&added("cart-1", "A")).await.unwrap();

    let removed = ViewEvent::new("ItemRemoved", "cart-1", json!({"item": "A"}));
    let result = tokio::time::timeout(Duration::from_millis(50), processor.process(&removed)).await;
    assert!(result.is_err());

    assert_eq!(cart(&processor, "cart-1").await.unwrap().items, ["A"]);
}
