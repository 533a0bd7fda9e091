//! Resolved service contract a view is bound against.

use std::sync::Arc;

use crate::pool::{DescriptorPool, MessageDescriptor};
use crate::proto::MethodOptions;

/// How a service method participates in a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodKind {
    /// Consumes events into the table. Only `transform_updates` methods are
    /// routed to user handlers; a view rejects events for the others as
    /// unhandled.
    Update { table: String, transform_updates: bool },
    /// Read-only query over the table.
    Query { query: String },
    /// No view annotation.
    Unannotated,
}

impl MethodKind {
    pub(crate) fn from_options(options: Option<&MethodOptions>) -> Self {
        let Some(view) = options.and_then(|o| o.view.as_ref()) else {
            return Self::Unannotated;
        };
        if let Some(update) = &view.update {
            Self::Update {
                table: update.table.clone(),
                transform_updates: update.transform_updates,
            }
        } else if let Some(query) = &view.query {
            Self::Query {
                query: query.query.clone(),
            }
        } else {
            Self::Unannotated
        }
    }
}

/// A method signature of the bound service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    /// Fully-qualified event (input) type.
    pub input_type: String,
    /// Fully-qualified state (output) type.
    pub output_type: String,
    pub kind: MethodKind,
}

impl MethodDescriptor {
    /// Returns true if events for this method must be folded by a handler.
    pub fn is_transform_update(&self) -> bool {
        matches!(
            self.kind,
            MethodKind::Update {
                transform_updates: true,
                ..
            }
        )
    }
}

/// The resolved methods of one service plus type lookup into its pool.
///
/// Read-only after construction; cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct ServiceContract {
    pool: Arc<DescriptorPool>,
    full_name: String,
    methods: Vec<MethodDescriptor>,
}

impl ServiceContract {
    pub(crate) fn new(
        pool: Arc<DescriptorPool>,
        full_name: String,
        methods: Vec<MethodDescriptor>,
    ) -> Self {
        Self {
            pool,
            full_name,
            methods,
        }
    }

    /// Fully-qualified service name, e.g. `shopping.cart.v1.CartEvents`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Last dot-separated segment of the service name.
    pub fn simple_name(&self) -> &str {
        self.full_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.full_name)
    }

    /// All methods, in declaration order.
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Position of a method in declaration order. Handler tables are indexed
    /// by it.
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.method(name).is_some()
    }

    pub fn is_transform_update(&self, name: &str) -> bool {
        self.method(name)
            .is_some_and(MethodDescriptor::is_transform_update)
    }

    /// Methods flagged with `transform_updates`.
    pub fn transform_methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.iter().filter(|m| m.is_transform_update())
    }

    /// Event type consumed by a method.
    pub fn input_type(&self, method: &str) -> Option<&MessageDescriptor> {
        self.method(method)
            .and_then(|m| self.pool.message(&m.input_type))
    }

    /// State type produced by a method.
    pub fn output_type(&self, method: &str) -> Option<&MessageDescriptor> {
        self.method(method)
            .and_then(|m| self.pool.message(&m.output_type))
    }

    /// Resolves any message type known to the underlying pool.
    pub fn lookup_type(&self, name: &str) -> Option<&MessageDescriptor> {
        self.pool.message(name)
    }

    pub fn pool(&self) -> &Arc<DescriptorPool> {
        &self.pool
    }
}
