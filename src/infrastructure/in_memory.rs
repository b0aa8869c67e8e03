use crate::domain::ports::ConfigSource;
use crate::domain::store::ConfigStore;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A configuration source that serves a store already held in memory.
///
/// The store can be swapped at runtime; every `load` returns a snapshot.
#[derive(Default, Clone)]
pub struct InMemoryConfigSource {
    store: Arc<RwLock<ConfigStore>>,
}

impl InMemoryConfigSource {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Replaces the served store. Snapshots already handed out are unaffected.
    pub async fn replace(&self, store: ConfigStore) {
        let mut current = self.store.write().await;
        *current = store;
    }
}

#[async_trait]
impl ConfigSource for InMemoryConfigSource {
    async fn load(&self) -> Result<ConfigStore> {
        let store = self.store.read().await;
        Ok(store.clone())
    }
}
