//! Store component.
//!
//! First in the chain so it is the last to stop. The store itself is closed
//! by the application, not here.

use std::sync::Arc;

use tracing::info;

use super::{ComponentContext, ComponentError, ServiceComponent};
use crate::runtime::store::RootStore;

pub const NAME: &str = "store";

pub struct StoreComponent {
    store: Arc<dyn RootStore>,
}

impl StoreComponent {
    pub fn new(store: Arc<dyn RootStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RootStore> {
        &self.store
    }
}

#[async_trait::async_trait]
impl ServiceComponent for StoreComponent {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn init(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        if self.store.is_closed() {
            return Err(ComponentError::new(NAME, "root store is closed"));
        }
        Ok(())
    }

    async fn start(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        info!(
            backend = %self.store.backend(),
            version = self.store.latest_version(),
            "store ready"
        );
        Ok(())
    }

    async fn stop(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        Ok(())
    }
}
