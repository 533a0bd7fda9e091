//! Handler bindings and their validation against the service contract.

use std::collections::HashSet;
use std::sync::Arc;

use descriptor::{DescriptorError, MessageDescriptor, MethodDescriptor, ServiceContract};

use crate::error::ConfigurationError;
use crate::handler::UpdateHandler;

/// Handlers collected by the view author, not yet validated.
#[derive(Default, Clone)]
pub struct UpdateHandlers {
    entries: Vec<(String, Arc<dyn UpdateHandler>)>,
}

impl UpdateHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a handler to an update method.
    pub fn on(self, method: impl Into<String>, handler: impl UpdateHandler + 'static) -> Self {
        self.on_shared(method, Arc::new(handler))
    }

    /// Binds an already shared handler.
    pub fn on_shared(mut self, method: impl Into<String>, handler: Arc<dyn UpdateHandler>) -> Self {
        self.entries.push((method.into(), handler));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Arc<dyn UpdateHandler>)> for UpdateHandlers {
    fn from_iter<T: IntoIterator<Item = (String, Arc<dyn UpdateHandler>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// One transform-update method, its resolved message types and its handler,
/// if bound.
pub struct HandlerSlot {
    method: MethodDescriptor,
    input: MessageDescriptor,
    output: MessageDescriptor,
    handler: Option<Arc<dyn UpdateHandler>>,
}

impl HandlerSlot {
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Event message type.
    pub fn input(&self) -> &MessageDescriptor {
        &self.input
    }

    /// State message type.
    pub fn output(&self) -> &MessageDescriptor {
        &self.output
    }

    pub fn handler(&self) -> Option<&Arc<dyn UpdateHandler>> {
        self.handler.as_ref()
    }
}

/// Validated dispatch table.
///
/// Indexed by the contract's method positions; only transform-update methods
/// own a slot. Events are routed only through these slots, so a name outside
/// the contract can never reach a handler.
pub struct HandlerRegistry {
    contract: ServiceContract,
    slots: Box<[Option<HandlerSlot>]>,
}

impl HandlerRegistry {
    /// Checks every binding against the contract and builds the table.
    pub fn validate(
        contract: &ServiceContract,
        handlers: UpdateHandlers,
    ) -> Result<Self, ConfigurationError> {
        let mut slots = Vec::with_capacity(contract.methods().len());
        for method in contract.methods() {
            let slot = if method.is_transform_update() {
                Some(HandlerSlot {
                    input: resolve(contract, method, &method.input_type)?,
                    output: resolve(contract, method, &method.output_type)?,
                    method: method.clone(),
                    handler: None,
                })
            } else {
                None
            };
            slots.push(slot);
        }

        let mut seen = HashSet::new();
        for (method, handler) in handlers.entries {
            if !seen.insert(method.clone()) {
                return Err(ConfigurationError::DuplicateHandler { method });
            }
            let Some(index) = contract.method_index(&method) else {
                return Err(ConfigurationError::UnknownMethod {
                    service: contract.full_name().to_string(),
                    method,
                });
            };
            let Some(slot) = slots[index].as_mut() else {
                return Err(ConfigurationError::NotTransformMethod {
                    service: contract.full_name().to_string(),
                    method,
                });
            };
            slot.handler = Some(handler);
        }

        let mut bound = slots.iter().flatten().filter(|s| s.handler.is_some());
        if let Some(first) = bound.next() {
            let expected = &first.method.output_type;
            if let Some(other) = bound.find(|s| &s.method.output_type != expected) {
                return Err(ConfigurationError::ConflictingStateTypes {
                    service: contract.full_name().to_string(),
                    method: other.method.name.clone(),
                    expected: expected.clone(),
                    actual: other.method.output_type.clone(),
                });
            }
        }

        for slot in slots.iter().flatten().filter(|s| s.handler.is_none()) {
            tracing::warn!(
                service = contract.full_name(),
                method = %slot.method.name,
                "transform-update method has no handler; its events will be rejected"
            );
        }

        Ok(Self {
            contract: contract.clone(),
            slots: slots.into_boxed_slice(),
        })
    }

    /// Contract the table was validated against.
    pub fn contract(&self) -> &ServiceContract {
        &self.contract
    }

    /// Finds the slot an event for `method` is routed to.
    pub fn slot(&self, method: &str) -> Option<&HandlerSlot> {
        let index = self.contract.method_index(method)?;
        self.slots.get(index)?.as_ref()
    }

    /// Returns the handler bound to `method`, if any.
    pub fn handler(&self, method: &str) -> Option<&Arc<dyn UpdateHandler>> {
        self.slot(method).and_then(HandlerSlot::handler)
    }

    /// Names of methods with a bound handler.
    pub fn handled_methods(&self) -> impl Iterator<Item = &str> {
        self.slots()
            .filter(|s| s.handler.is_some())
            .map(|s| s.method.name.as_str())
    }

    /// Slots of all transform-update methods, in declaration order.
    pub fn slots(&self) -> impl Iterator<Item = &HandlerSlot> {
        self.slots.iter().flatten()
    }
}

fn resolve(
    contract: &ServiceContract,
    method: &MethodDescriptor,
    type_name: &str,
) -> Result<MessageDescriptor, ConfigurationError> {
    contract.lookup_type(type_name).cloned().ok_or_else(|| {
        DescriptorError::UnresolvedType {
            service: contract.full_name().to_string(),
            method: method.name.clone(),
            type_name: type_name.to_string(),
        }
        .into()
    })
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handled", &self.handled_methods().collect::<Vec<_>>())
            .field("slots", &self.slots().count())
            .finish()
    }
}
