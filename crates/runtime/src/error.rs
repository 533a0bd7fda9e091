//! Runtime error types.

use thiserror::Error;
use view::UpdateError;

/// Errors raised by a view store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors raised when registering components.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("A component with id {0} is already registered")]
    DuplicateComponent(String),
}

/// Errors that can occur while hosting a view.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The update engine rejected or failed the event.
    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl RuntimeError {
    /// Returns true if no further events should be delivered for the key.
    pub fn is_fatal_for_key(&self) -> bool {
        match self {
            Self::Update(err) => err.is_fatal_for_key(),
            Self::Store(_) | Self::Registry(_) => true,
        }
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
