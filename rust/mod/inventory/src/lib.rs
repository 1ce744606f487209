pub mod api;
pub mod ledger;
pub mod model;
pub mod service;

use std::sync::Arc;

use axum::Router;
use docflow::{permissions_of, DocFlow};
use fabrica_core::{Module, ServiceError};

use ledger::StockLedger;
use model::{Devolucion, StockAdjustment};
use service::{InventoryService, STOCK_READ};

/// The inventory module: stock ledger, adjustments and customer returns.
pub struct InventoryModule {
    service: InventoryService,
}

impl InventoryModule {
    pub fn new(flow: Arc<DocFlow>) -> Result<Self, ServiceError> {
        Ok(Self {
            service: InventoryService::new(flow)?,
        })
    }

    pub fn service(&self) -> &InventoryService {
        &self.service
    }

    pub fn ledger(&self) -> Arc<StockLedger> {
        Arc::clone(self.service.ledger())
    }
}

impl Module for InventoryModule {
    fn name(&self) -> &str {
        "inventory"
    }

    fn routes(&self) -> Router {
        api::router(self.service.clone())
    }

    fn permissions(&self) -> Vec<&'static str> {
        let mut perms = vec![STOCK_READ];
        perms.extend(permissions_of::<StockAdjustment>());
        perms.extend(permissions_of::<Devolucion>());
        perms
    }
}
