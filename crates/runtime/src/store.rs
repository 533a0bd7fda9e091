//! Persistence contract for view state.

use async_trait::async_trait;
use common::InstanceKey;
use view::ViewState;

use crate::error::StoreError;

/// Stores the latest state of every instance key of every view.
///
/// The processor only calls [`save`](Self::save) after a fold has completed,
/// so implementations never see partial state.
#[async_trait]
pub trait ViewStore: Send + Sync {
    /// Loads the state of a key, or `None` if the key was never updated.
    async fn load(&self, view_id: &str, key: &InstanceKey) -> Result<Option<ViewState>, StoreError>;

    /// Replaces the state of a key.
    async fn save(&self, view_id: &str, key: &InstanceKey, state: ViewState) -> Result<(), StoreError>;

    /// Returns all states of a view, ordered by key.
    async fn list(&self, view_id: &str) -> Result<Vec<(InstanceKey, ViewState)>, StoreError>;
}
