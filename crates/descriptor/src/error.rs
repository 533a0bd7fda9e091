//! Descriptor error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading descriptors or resolving a service.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// A descriptor file was not found in any of the searched locations.
    #[error("Descriptor file {file} not found (searched: {searched:?})")]
    NotFound {
        file: PathBuf,
        searched: Vec<PathBuf>,
    },

    /// Reading a descriptor file failed.
    #[error("Failed to read descriptor {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The descriptor bytes are not a valid `FileDescriptorSet`.
    #[error("Malformed descriptor set: {0}")]
    Decode(#[from] prost::DecodeError),

    /// No service with the given fully-qualified name exists in the pool.
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// A method references a message type that is not in the pool.
    #[error("Method {service}.{method} references unknown type {type_name}")]
    UnresolvedType {
        service: String,
        method: String,
        type_name: String,
    },
}

/// Result type for descriptor operations.
pub type Result<T> = std::result::Result<T, DescriptorError>;
