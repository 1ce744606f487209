use serde::{Deserialize, Serialize};

use fabrica_core::{Principal, ViewMode};

/// Username reserved for the configured superadmin.
pub const ROOT_USERNAME: &str = "root";

/// A user account. The password hash never leaves the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub company_id: String,
    /// Role ids within the user's company.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Whether the user may switch to the T2 view.
    #[serde(default)]
    pub extended_view: bool,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

fn default_active() -> bool {
    true
}

/// A named permission set, scoped to one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub company_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub extended_view: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRole {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// JWT claims payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Subject: user id, or `root`.
    pub sub: String,
    pub company_id: String,
    /// Flattened permissions of every role the user holds.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub root: bool,
    #[serde(default)]
    pub extended_view: bool,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

impl Claims {
    /// The caller these claims describe, in the requested view mode.
    ///
    /// Extended view needs the `extendedView` claim (root always has it).
    pub fn principal(&self, view_mode: ViewMode) -> Option<Principal> {
        if view_mode == ViewMode::Extended && !(self.extended_view || self.root) {
            return None;
        }
        Some(Principal {
            user_id: self.sub.clone(),
            company_id: self.company_id.clone(),
            permissions: self.permissions.clone(),
            root: self.root,
            view_mode,
        })
    }
}

/// Login request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Company the root account acts in. Ignored for normal users.
    #[serde(default)]
    pub company_id: Option<String>,
}

/// Login response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}
