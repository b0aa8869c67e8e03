use super::store::ConfigStore;
use crate::error::Result;
use async_trait::async_trait;

/// Loads the configuration tables from wherever they are kept.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn load(&self) -> Result<ConfigStore>;
}

pub type ConfigSourceBox = Box<dyn ConfigSource>;
