pub mod api;
pub mod model;
pub mod receivables;
pub mod service;

use std::sync::Arc;

use axum::Router;
use docflow::{permissions_of, DocFlow};
use fabrica_core::{Module, ServiceError};

use model::Invoice;
use service::{SalesService, RECEIVABLES_READ};

/// The sales module: invoices, payments and customer receivables.
pub struct SalesModule {
    service: SalesService,
}

impl SalesModule {
    pub fn new(flow: Arc<DocFlow>) -> Result<Self, ServiceError> {
        Ok(Self {
            service: SalesService::new(flow)?,
        })
    }

    pub fn service(&self) -> &SalesService {
        &self.service
    }
}

impl Module for SalesModule {
    fn name(&self) -> &str {
        "sales"
    }

    fn routes(&self) -> Router {
        api::router(self.service.clone())
    }

    fn permissions(&self) -> Vec<&'static str> {
        let mut perms = permissions_of::<Invoice>();
        perms.push(RECEIVABLES_READ);
        perms
    }
}
