//! Shopping-cart view over `shopping.cart.v1.CartEvents`.
//!
//! Carts are keyed by cart id. `ItemAdded` and `ItemRemoved` adjust the
//! line quantities; `CartCheckedOut` marks the cart closed, and events that
//! arrive for a closed cart leave it unchanged.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use descriptor::{DescriptorPool, DescriptorSource, FileBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use view::{
    ConfigurationError, HandlerError, UpdateHandlers, UpdateOutcome, ViewBuilder, ViewDefinition,
    ViewEvent, ViewOptions, fold,
};

pub const CART_SERVICE: &str = "shopping.cart.v1.CartEvents";

/// Errors that stop the demo.
#[derive(Debug, Error)]
pub enum DemoError {
    #[error("View configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] descriptor::DescriptorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid event on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Registry error: {0}")]
    Registry(#[from] runtime::RegistryError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] runtime::RuntimeError),
}

#[derive(Debug, Deserialize)]
pub struct ItemAdded {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ItemRemoved {
    pub product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CartCheckedOut {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub cart_id: String,
    pub items: Vec<LineItem>,
    pub checked_out: bool,
}

/// The cart service descriptor, as protoc would emit it.
pub fn cart_descriptor() -> Arc<DescriptorPool> {
    let file = FileBuilder::new("shopping/cart/v1/cart_view.proto", "shopping.cart.v1")
        .message("ItemAdded", |m| m.string("product_id").string("name").uint32("quantity"))
        .message("ItemRemoved", |m| m.string("product_id"))
        .message("CartCheckedOut", |m| m)
        .message("LineItem", |m| m.string("product_id").string("name").uint32("quantity"))
        .message("Cart", |m| {
            m.string("cart_id")
                .repeated_message("items", "shopping.cart.v1.LineItem")
                .bool("checked_out")
        })
        .message("GetCartRequest", |m| m.string("cart_id"))
        .service("CartEvents", |s| {
            s.transform_update("ItemAdded", "ItemAdded", "Cart", "carts")
                .transform_update("ItemRemoved", "ItemRemoved", "Cart", "carts")
                .transform_update("CartCheckedOut", "CartCheckedOut", "Cart", "carts")
                .query("GetCart", "GetCartRequest", "Cart", "SELECT * FROM carts WHERE cart_id = :cart_id")
        });
    Arc::new(DescriptorPool::from_sets([file.into_set()]))
}

/// Loads the pool from descriptor files, or falls back to the built-in one.
pub fn load_pool(files: &[PathBuf], include_dirs: &[PathBuf]) -> Result<Arc<DescriptorPool>, DemoError> {
    if files.is_empty() {
        return Ok(cart_descriptor());
    }
    Ok(DescriptorSource::new(files.iter().cloned())
        .include_dirs(include_dirs.iter().cloned())
        .load()?)
}

pub fn cart_handlers() -> UpdateHandlers {
    UpdateHandlers::new()
        .on(
            "ItemAdded",
            fold(|event: ItemAdded, prev: Option<Cart>, ctx| {
                let mut cart = prev.unwrap_or_else(|| Cart {
                    cart_id: ctx.instance_key().to_string(),
                    ..Cart::default()
                });
                if cart.checked_out {
                    return Ok(UpdateOutcome::NoUpdate);
                }
                match cart.items.iter_mut().find(|i| i.product_id == event.product_id) {
                    Some(line) => {
                        line.quantity = line.quantity.checked_add(event.quantity).ok_or_else(|| {
                            HandlerError::new(format!("quantity of {} overflows", line.product_id))
                        })?;
                    }
                    None => cart.items.push(LineItem {
                        product_id: event.product_id,
                        name: event.name,
                        quantity: event.quantity,
                    }),
                }
                Ok(UpdateOutcome::Updated(cart))
            }),
        )
        .on(
            "ItemRemoved",
            fold(|event: ItemRemoved, prev: Option<Cart>, _ctx| {
                let Some(mut cart) = prev else {
                    return Ok(UpdateOutcome::NoUpdate);
                };
                if cart.checked_out {
                    return Ok(UpdateOutcome::NoUpdate);
                }
                let before = cart.items.len();
                cart.items.retain(|i| i.product_id != event.product_id);
                if cart.items.len() == before {
                    return Ok(UpdateOutcome::NoUpdate);
                }
                Ok(UpdateOutcome::Updated(cart))
            }),
        )
        .on(
            "CartCheckedOut",
            fold(|_event: CartCheckedOut, prev: Option<Cart>, _ctx| match prev {
                Some(mut cart) if !cart.checked_out => {
                    cart.checked_out = true;
                    Ok(UpdateOutcome::Updated(cart))
                }
                _ => Ok(UpdateOutcome::NoUpdate),
            }),
        )
}

/// Defines the cart view over a resolved pool.
pub fn cart_view(pool: &Arc<DescriptorPool>, options: ViewOptions) -> Result<ViewDefinition, DemoError> {
    Ok(ViewBuilder::from_pool(pool, CART_SERVICE, options)?.register(cart_handlers())?)
}

/// Parses one JSON-encoded [`ViewEvent`] per non-blank line.
pub fn read_events(reader: impl BufRead) -> Result<Vec<ViewEvent>, DemoError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|source| DemoError::Parse {
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::InstanceKey;
    use runtime::{InMemoryViewStore, ViewProcessor};
    use serde_json::json;

    fn processor() -> ViewProcessor<InMemoryViewStore> {
        let view = cart_view(&cart_descriptor(), ViewOptions::default()).unwrap();
        ViewProcessor::new(&view, InMemoryViewStore::new())
    }

    fn added(cart: &str, product: &str, quantity: u32) -> ViewEvent {
        ViewEvent::new(
            "ItemAdded",
            cart,
            json!({"product_id": product, "name": product.to_lowercase(), "quantity": quantity}),
        )
    }

    async fn cart(processor: &ViewProcessor<InMemoryViewStore>, key: &str) -> Cart {
        processor
            .state(&InstanceKey::new(key))
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap()
    }

    #[tokio::test]
    async fn adding_same_product_accumulates_quantity() {
        let processor = processor();
        processor.process(&added("cart-1", "SKU-1", 2)).await.unwrap();
        processor.process(&added("cart-1", "SKU-1", 3)).await.unwrap();

        let cart = cart(&processor, "cart-1").await;
        assert_eq!(cart.cart_id, "cart-1");
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
    }

    #[tokio::test]
    async fn quantity_overflow_fails_the_event() {
        let processor = processor();
        processor.process(&added("cart-1", "SKU-1", u32::MAX)).await.unwrap();

        let err = processor.process(&added("cart-1", "SKU-1", 1)).await.unwrap_err();
        assert!(err.to_string().contains("quantity of SKU-1 overflows"), "{err}");
        assert_eq!(cart(&processor, "cart-1").await.items[0].quantity, u32::MAX);
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_before_folding() {
        let processor = processor();
        let event = ViewEvent::new("ItemAdded", "cart-1", json!({"product_id": "SKU-1", "quantity": -2}));

        let err = processor.process(&event).await.unwrap_err();
        assert!(matches!(
            err,
            runtime::RuntimeError::Update(view::UpdateError::InvalidPayload { .. })
        ));
        assert!(processor.state(&InstanceKey::new("cart-1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removing_unknown_product_is_no_update() {
        let processor = processor();
        processor.process(&added("cart-1", "SKU-1", 1)).await.unwrap();

        let removed = ViewEvent::new("ItemRemoved", "cart-1", json!({"product_id": "SKU-9"}));
        let outcome = processor.process(&removed).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::NoUpdate);
    }

    #[tokio::test]
    async fn checked_out_cart_ignores_later_items() {
        let processor = processor();
        processor.process(&added("cart-1", "SKU-1", 1)).await.unwrap();
        processor
            .process(&ViewEvent::new("CartCheckedOut", "cart-1", json!({})))
            .await
            .unwrap();
        let outcome = processor.process(&added("cart-1", "SKU-2", 1)).await.unwrap();

        assert_eq!(outcome, UpdateOutcome::NoUpdate);
        let cart = cart(&processor, "cart-1").await;
        assert!(cart.checked_out);
        assert_eq!(cart.items.len(), 1);
    }

    #[test]
    fn view_id_defaults_to_cart_events() {
        let view = cart_view(&cart_descriptor(), ViewOptions::default()).unwrap();
        assert_eq!(view.id(), "CartEvents");
    }

    #[test]
    fn read_events_skips_blank_lines_and_reports_bad_ones() {
        let input = concat!(
            r#"{"method":"ItemAdded","instance_key":"cart-1","payload":{"product_id":"A","name":"a","quantity":1}}"#,
            "\n\n",
            "not json\n",
        );
        let err = read_events(input.as_bytes()).unwrap_err();
        assert!(matches!(err, DemoError::Parse { line: 3, .. }));

        let events = read_events(&input.as_bytes()[..input.find('\n').unwrap()]).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].instance_key.as_str(), "cart-1");
    }
}
