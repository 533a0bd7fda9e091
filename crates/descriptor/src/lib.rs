//! Descriptor resolution for view components.
//!
//! This crate turns protobuf descriptor sets into the contract a view is
//! bound against:
//! - [`DescriptorSource`] locates descriptor files across include dirs
//! - [`DescriptorPool`] indexes every message and service of the loaded files
//! - [`ServiceContract`] answers method and type questions for one service
//! - [`FileBuilder`] assembles descriptor sets in code

pub mod builder;
pub mod contract;
pub mod error;
pub mod pool;
pub mod proto;
pub mod source;

pub use builder::{FileBuilder, MessageBuilder, ServiceBuilder};
pub use contract::{MethodDescriptor, MethodKind, ServiceContract};
pub use error::{DescriptorError, Result};
pub use pool::{DescriptorPool, FieldDescriptor, FieldKind, MessageDescriptor};
pub use proto::VIEW_OPTIONS_FIELD;
pub use source::DescriptorSource;

/// Strips the leading `.` protoc puts on fully-qualified type references.
pub fn normalize_type_name(name: &str) -> &str {
    name.strip_prefix('.').unwrap_or(name)
}
