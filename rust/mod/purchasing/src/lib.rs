pub mod api;
pub mod config;
pub mod model;
pub mod service;

use std::sync::Arc;

use axum::Router;
use docflow::{permissions_of, DocFlow};
use fabrica_core::Module;
use inventory::ledger::StockLedger;

pub use config::PurchasingConfig;
use model::{PurchaseOrder, APPROVE_HIGH_PERMISSION};
use service::PurchasingService;

/// The purchasing module: purchase orders from draft to goods receipt.
pub struct PurchasingModule {
    service: PurchasingService,
}

impl PurchasingModule {
    pub fn new(flow: Arc<DocFlow>, ledger: Arc<StockLedger>, config: PurchasingConfig) -> Self {
        Self {
            service: PurchasingService::new(flow, ledger, config),
        }
    }

    pub fn service(&self) -> &PurchasingService {
        &self.service
    }
}

impl Module for PurchasingModule {
    fn name(&self) -> &str {
        "purchasing"
    }

    fn routes(&self) -> Router {
        api::router(self.service.clone())
    }

    fn permissions(&self) -> Vec<&'static str> {
        let mut perms = permissions_of::<PurchaseOrder>();
        perms.push(APPROVE_HIGH_PERMISSION);
        perms
    }
}
