//! Components hosted by the runtime.

use std::sync::Arc;

use view::{Component, ComponentType};

use crate::error::RegistryError;

/// The set of components the host exposes, keyed by component id.
#[derive(Default)]
pub struct ComponentRegistry {
    components: Vec<Arc<dyn Component>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component. Component ids double as persistence keys, so a
    /// second component with the same id is rejected.
    pub fn register(&mut self, component: Arc<dyn Component>) -> Result<(), RegistryError> {
        let id = component.component_id();
        if self.get(id).is_some() {
            return Err(RegistryError::DuplicateComponent(id.to_string()));
        }
        tracing::info!(
            component_id = id,
            component_type = %component.component_type(),
            service = component.service_name(),
            "component registered"
        );
        self.components.push(component);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Component>> {
        self.components.iter().find(|c| c.component_id() == id)
    }

    /// Components of a given type, in registration order.
    pub fn of_type(&self, component_type: ComponentType) -> impl Iterator<Item = &Arc<dyn Component>> {
        self.components
            .iter()
            .filter(move |c| c.component_type() == component_type)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
