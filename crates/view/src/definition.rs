//! View definition: identifier, service contract and handler bindings.

use std::path::PathBuf;
use std::sync::Arc;

use descriptor::{DescriptorPool, DescriptorSource, MessageDescriptor, ServiceContract};

use crate::component::{Component, ComponentType};
use crate::engine::UpdateEngine;
use crate::error::ConfigurationError;
use crate::registry::{HandlerRegistry, UpdateHandlers};

/// Definition-time options.
#[derive(Debug, Clone)]
pub struct ViewOptions {
    /// Persistence key of the view. Defaults to the service's simple name.
    pub view_id: Option<String>,
    /// Directories searched for descriptor files. Defaults to `["."]`.
    pub include_dirs: Vec<PathBuf>,
    default_dirs: bool,
}

impl ViewOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view_id(mut self, view_id: impl Into<String>) -> Self {
        self.view_id = Some(view_id.into());
        self
    }

    /// Replaces the default search path on first call, then appends.
    pub fn include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        if self.default_dirs {
            self.include_dirs.clear();
            self.default_dirs = false;
        }
        self.include_dirs.push(dir.into());
        self
    }
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            view_id: None,
            include_dirs: vec![PathBuf::from(".")],
            default_dirs: true,
        }
    }
}

/// A view whose service is resolved but whose handlers are not yet bound.
///
/// [`register`](Self::register) consumes the builder, so a definition is
/// bound exactly once.
#[derive(Debug)]
pub struct ViewBuilder {
    id: String,
    contract: ServiceContract,
}

impl ViewBuilder {
    /// Loads descriptor files and resolves `service_name` from them.
    pub fn load<I, P>(
        descriptors: I,
        service_name: &str,
        options: ViewOptions,
    ) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let pool = DescriptorSource::new(descriptors)
            .include_dirs(options.include_dirs.iter().cloned())
            .load()?;
        Self::from_pool(&pool, service_name, options)
    }

    /// Resolves `service_name` from a pool that may be shared with other views.
    pub fn from_pool(
        pool: &Arc<DescriptorPool>,
        service_name: &str,
        options: ViewOptions,
    ) -> Result<Self, ConfigurationError> {
        let contract = pool.resolve_service(service_name)?;
        Self::from_contract(contract, options)
    }

    pub fn from_contract(
        contract: ServiceContract,
        options: ViewOptions,
    ) -> Result<Self, ConfigurationError> {
        let id = match options.view_id {
            Some(id) => id,
            None => contract.simple_name().to_string(),
        };
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(ConfigurationError::InvalidViewId(id));
        }
        Ok(Self { id, contract })
    }

    pub fn view_id(&self) -> &str {
        &self.id
    }

    pub fn contract(&self) -> &ServiceContract {
        &self.contract
    }

    /// Validates the handlers and produces the immutable definition.
    #[tracing::instrument(skip(self, handlers), fields(view_id = %self.id, handlers = handlers.len()))]
    pub fn register(self, handlers: UpdateHandlers) -> Result<ViewDefinition, ConfigurationError> {
        let registry = HandlerRegistry::validate(&self.contract, handlers)?;
        tracing::info!(service = self.contract.full_name(), "view defined");
        Ok(ViewDefinition {
            inner: Arc::new(Inner {
                id: self.id,
                contract: self.contract,
                registry: Arc::new(registry),
            }),
        })
    }
}

#[derive(Debug)]
struct Inner {
    id: String,
    contract: ServiceContract,
    registry: Arc<HandlerRegistry>,
}

/// An immutable, validated view. Cloning shares the definition.
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    inner: Arc<Inner>,
}

impl ViewDefinition {
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn contract(&self) -> &ServiceContract {
        &self.inner.contract
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Returns the engine that folds events for this view.
    pub fn engine(&self) -> UpdateEngine {
        UpdateEngine::new(self.inner.id.as_str(), Arc::clone(&self.inner.registry))
    }
}

impl Component for ViewDefinition {
    fn component_type(&self) -> ComponentType {
        ComponentType::View
    }

    fn component_id(&self) -> &str {
        self.id()
    }

    fn service_name(&self) -> &str {
        self.inner.contract.full_name()
    }

    fn lookup_type(&self, name: &str) -> Option<&MessageDescriptor> {
        self.inner.contract.lookup_type(name)
    }

    fn engine(&self) -> UpdateEngine {
        ViewDefinition::engine(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use descriptor::FileBuilder;

    fn pool() -> Arc<DescriptorPool> {
        let file = FileBuilder::new("cart.proto", "shopping.cart.v1")
            .message("ItemAdded", |m| m.string("item"))
            .message("Cart", |m| m.repeated_string("items"))
            .service("CartEvents", |s| {
                s.transform_update("ItemAdded", "ItemAdded", "Cart", "carts")
            });
        Arc::new(DescriptorPool::from_sets([file.into_set()]))
    }

    #[test]
    fn view_id_defaults_to_service_simple_name() {
        let builder =
            ViewBuilder::from_pool(&pool(), "shopping.cart.v1.CartEvents", ViewOptions::default())
                .unwrap();
        assert_eq!(builder.view_id(), "CartEvents");
    }

    #[test]
    fn view_id_can_be_overridden() {
        let options = ViewOptions::new().view_id("carts_v2");
        let builder = ViewBuilder::from_pool(&pool(), "shopping.cart.v1.CartEvents", options).unwrap();
        assert_eq!(builder.view_id(), "carts_v2");
    }

    #[test]
    fn blank_view_id_is_rejected() {
        let options = ViewOptions::new().view_id("my view");
        let err = ViewBuilder::from_pool(&pool(), "shopping.cart.v1.CartEvents", options).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidViewId(_)));
    }

    #[test]
    fn unknown_service_fails_at_definition() {
        let err = ViewBuilder::from_pool(&pool(), "shopping.cart.v1.Missing", ViewOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Descriptor(_)));
    }

    #[test]
    fn include_dir_replaces_default() {
        let options = ViewOptions::new().include_dir("protos").include_dir("vendor");
        assert_eq!(options.include_dirs, [PathBuf::from("protos"), PathBuf::from("vendor")]);
    }

    #[test]
    fn explicit_current_dir_is_kept() {
        let options = ViewOptions::new().include_dir(".").include_dir("protos");
        assert_eq!(options.include_dirs, [PathBuf::from("."), PathBuf::from("protos")]);
    }

    #[test]
    fn definition_is_a_view_component() {
        let definition =
            ViewBuilder::from_pool(&pool(), "shopping.cart.v1.CartEvents", ViewOptions::default())
                .unwrap()
                .register(UpdateHandlers::new())
                .unwrap();

        assert_eq!(definition.component_type(), ComponentType::View);
        assert_eq!(definition.component_type().as_str(), "view");
        assert_eq!(definition.component_id(), "CartEvents");
        assert_eq!(definition.service_name(), "shopping.cart.v1.CartEvents");
        assert!(definition.lookup_type("shopping.cart.v1.Cart").is_some());
        assert!(definition.lookup_type("shopping.cart.v1.Nope").is_none());

        let component: &dyn Component = &definition;
        assert_eq!(component.engine().view_id(), "CartEvents");
    }
}
