pub mod api;
pub mod model;
pub mod service;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use docflow::{permissions_of, DocFlow};
use fabrica_core::Module;
use tokio_util::sync::CancellationToken;

use model::{Loto, Permit, WorkOrder};
use service::CmmsService;
use worker::WatchdogConfig;

/// The CMMS module: work orders, permits to work and lockout-tagout.
///
/// Creating the module starts the permit expiry watchdog; it runs until
/// [`shutdown`](Self::shutdown) is called.
pub struct CmmsModule {
    service: CmmsService,
    watchdog: CancellationToken,
}

impl CmmsModule {
    /// Create the module and start the watchdog. Must be called inside a
    /// tokio runtime.
    pub fn new(flow: Arc<DocFlow>, config: WatchdogConfig) -> Self {
        let service = CmmsService::new(flow);
        let watchdog = worker::start(service.clone(), config);
        Self { service, watchdog }
    }

    pub fn service(&self) -> &CmmsService {
        &self.service
    }

    /// Stop background work.
    pub fn shutdown(&self) {
        self.watchdog.cancel();
    }
}

impl Module for CmmsModule {
    fn name(&self) -> &str {
        "cmms"
    }

    fn routes(&self) -> Router {
        api::router(self.service.clone())
    }

    fn permissions(&self) -> Vec<&'static str> {
        let mut perms = permissions_of::<WorkOrder>();
        perms.extend(permissions_of::<Permit>());
        perms.extend(permissions_of::<Loto>());
        perms
    }
}
