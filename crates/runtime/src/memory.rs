use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::InstanceKey;
use tokio::sync::RwLock;
use view::ViewState;

use crate::error::StoreError;
use crate::store::ViewStore;

/// In-memory view store for tests and the demo.
#[derive(Clone, Default)]
pub struct InMemoryViewStore {
    tables: Arc<RwLock<HashMap<String, BTreeMap<InstanceKey, ViewState>>>>,
}

impl InMemoryViewStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys stored for a view.
    pub async fn count(&self, view_id: &str) -> usize {
        self.tables
            .read()
            .await
            .get(view_id)
            .map_or(0, BTreeMap::len)
    }

    /// Clears all views.
    pub async fn clear(&self) {
        self.tables.write().await.clear();
    }
}

#[async_trait]
impl ViewStore for InMemoryViewStore {
    async fn load(&self, view_id: &str, key: &InstanceKey) -> Result<Option<ViewState>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .get(view_id)
            .and_then(|table| table.get(key))
            .cloned())
    }

    async fn save(&self, view_id: &str, key: &InstanceKey, state: ViewState) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .entry(view_id.to_string())
            .or_default()
            .insert(key.clone(), state);
        Ok(())
    }

    async fn list(&self, view_id: &str) -> Result<Vec<(InstanceKey, ViewState)>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .get(view_id)
            .map(|table| {
                table
                    .iter()
                    .map(|(key, state)| (key.clone(), state.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
