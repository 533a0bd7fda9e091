//! Reference runtime for view components.
//!
//! Hosts view definitions the way a platform runtime would:
//! - [`ViewStore`] persists state per view and instance key
//! - [`ViewProcessor`] delivers events in order per key and stores the fold
//!   results, running distinct keys in parallel
//! - [`ComponentRegistry`] keeps the components the host exposes
//! - [`RuntimeConfig`] carries environment-driven settings

pub mod config;
pub mod error;
pub mod memory;
pub mod processor;
pub mod registry;
pub mod store;

pub use config::{ErrorPolicy, RuntimeConfig};
pub use error::{RegistryError, Result, RuntimeError, StoreError};
pub use memory::InMemoryViewStore;
pub use processor::{EventFailure, RunReport, ViewProcessor};
pub use registry::ComponentRegistry;
pub use store::ViewStore;
