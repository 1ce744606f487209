pub mod api;
pub mod model;
pub mod service;

use std::sync::Arc;

use axum::Router;
use fabrica_core::Module;
use fabrica_sql::SQLStore;

pub use model::Claims;
use service::{AuthConfig, AuthError, AuthService};

/// The auth module: login, users and roles.
pub struct AuthModule {
    service: Arc<AuthService>,
}

impl AuthModule {
    pub fn new(sql: Arc<dyn SQLStore>, config: AuthConfig) -> Result<Self, AuthError> {
        Ok(Self {
            service: AuthService::new(sql, config)?,
        })
    }

    /// Shared service, used by the server to verify tokens.
    pub fn service(&self) -> Arc<AuthService> {
        Arc::clone(&self.service)
    }
}

impl Module for AuthModule {
    fn name(&self) -> &str {
        "auth"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.service))
    }

    fn permissions(&self) -> Vec<&'static str> {
        vec![
            api::users::USER_CREATE,
            api::users::USER_LIST,
            api::roles::ROLE_CREATE,
            api::roles::ROLE_LIST,
        ]
    }
}
