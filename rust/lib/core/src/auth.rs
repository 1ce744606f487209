//! Authenticated caller identity.
//!
//! Modules never decode tokens themselves. The server's auth middleware
//! verifies the token, builds a [`Principal`] and stores it in the request
//! extensions; handlers take `Principal` as an extractor and call
//! [`Principal::require`] with the permission string of the action.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::{ServiceError, ViewMode};

/// Actor name recorded for background jobs.
pub const SYSTEM_ACTOR: &str = "system";

/// The caller of an operation, scoped to one company (tenant).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    pub company_id: String,
    /// Granted permission strings, e.g. `cmms:permit:approve` or `cmms:*`.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Root bypasses every permission check (still tenant-scoped).
    #[serde(default)]
    pub root: bool,
    /// View mode resolved for this request.
    #[serde(default)]
    pub view_mode: ViewMode,
}

impl Principal {
    /// Principal used by background jobs acting on a company's documents.
    pub fn system(company_id: &str) -> Self {
        Self {
            user_id: SYSTEM_ACTOR.to_string(),
            company_id: company_id.to_string(),
            permissions: Vec::new(),
            root: true,
            view_mode: ViewMode::Extended,
        }
    }

    /// Whether this principal holds `permission`.
    ///
    /// A grant matches when it is equal to the permission, is `*`, or ends in
    /// `:*` and the permission starts with the grant's prefix.
    pub fn allows(&self, permission: &str) -> bool {
        if self.root {
            return true;
        }
        self.permissions.iter().any(|grant| grant_matches(grant, permission))
    }

    /// Fail with `PermissionDenied` unless [`allows`](Self::allows).
    pub fn require(&self, permission: &str) -> Result<(), ServiceError> {
        if self.allows(permission) {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(format!(
                "user {} lacks permission {}",
                self.user_id, permission
            )))
        }
    }
}

fn grant_matches(grant: &str, permission: &str) -> bool {
    if grant == "*" || grant == permission {
        return true;
    }
    match grant.strip_suffix('*') {
        Some(prefix) if prefix.ends_with(':') => permission.starts_with(prefix),
        _ => false,
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("missing authentication".into()))
    }
}
