//! Surface a view exposes to the component registry that hosts it.

use descriptor::MessageDescriptor;

use crate::engine::UpdateEngine;

/// Stable tag telling the host what kind of component it is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    View,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
        }
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A component the host can expose and feed.
pub trait Component: Send + Sync {
    fn component_type(&self) -> ComponentType;

    /// Identifier unique among registered components.
    fn component_id(&self) -> &str;

    /// Fully-qualified name of the gRPC service the component implements.
    fn service_name(&self) -> &str;

    /// Resolves a message type from the component's descriptors.
    fn lookup_type(&self, name: &str) -> Option<&MessageDescriptor>;

    /// Entry point the host feeds events through.
    fn engine(&self) -> UpdateEngine;
}
