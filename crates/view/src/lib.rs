//! View definitions and the update engine.
//!
//! A view binds a gRPC service contract to user-supplied fold handlers:
//! - [`ViewBuilder`] resolves the service and validates handler bindings
//! - [`ViewDefinition`] is the immutable result, registered as a [`Component`]
//! - [`UpdateEngine`] folds one [`ViewEvent`] into the previous [`ViewState`]
//! - [`fold`] adapts a typed closure into an [`UpdateHandler`]
//! - [`shape`] checks payloads and states against their message types

pub mod component;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod event;
pub mod handler;
pub mod registry;
pub mod shape;
pub mod state;

pub use common::{EventId, InstanceKey};
pub use component::{Component, ComponentType};
pub use context::UpdateContext;
pub use definition::{ViewBuilder, ViewDefinition, ViewOptions};
pub use engine::UpdateEngine;
pub use error::{ConfigurationError, UpdateError};
pub use event::ViewEvent;
pub use handler::{Fold, HandlerError, UpdateHandler, fold};
pub use registry::{HandlerRegistry, HandlerSlot, UpdateHandlers};
pub use shape::ShapeError;
pub use state::{UpdateOutcome, ViewState};
