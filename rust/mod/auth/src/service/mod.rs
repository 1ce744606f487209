pub mod password;
pub mod role;
pub mod schema;
pub mod token;
pub mod user;

use std::sync::Arc;

use jsonwebtoken::{DecodingKey, EncodingKey, Validation};
use thiserror::Error;

use fabrica_sql::{SQLError, SQLStore};

/// Auth service error type.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl From<AuthError> for fabrica_core::ServiceError {
    fn from(e: AuthError) -> Self {
        use fabrica_core::ServiceError;
        match e {
            AuthError::NotFound(m) => ServiceError::NotFound(m),
            AuthError::Conflict(m) => ServiceError::Conflict(m),
            AuthError::Validation(m) => ServiceError::Validation(m),
            AuthError::Unauthorized(m) => ServiceError::Unauthorized(m),
            AuthError::Forbidden(m) => ServiceError::PermissionDenied(m),
            AuthError::Storage(m) => ServiceError::Storage(m),
            AuthError::Internal(m) => ServiceError::Internal(m),
        }
    }
}

impl From<SQLError> for AuthError {
    fn from(e: SQLError) -> Self {
        let msg = e.to_string();
        if msg.contains("UNIQUE constraint") {
            AuthError::Conflict(msg)
        } else {
            AuthError::Storage(msg)
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Internal(format!("json: {e}"))
    }
}

/// Configuration for the auth service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT signing secret (HS256).
    pub jwt_secret: String,
    /// Access token lifetime in seconds.
    pub expire_secs: u64,
    /// argon2id PHC string of the root password.
    pub root_password_hash: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            expire_secs: 86400, // 24h
            root_password_hash: String::new(),
        }
    }
}

/// Users, roles and token issuance.
pub struct AuthService {
    pub(crate) sql: Arc<dyn SQLStore>,
    pub(crate) config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthService {
    /// Create the service, initializing the DB schema.
    pub fn new(sql: Arc<dyn SQLStore>, config: AuthConfig) -> Result<Arc<Self>, AuthError> {
        if config.jwt_secret.is_empty() {
            return Err(AuthError::Validation("JWT secret must not be empty".into()));
        }
        schema::init_schema(sql.as_ref())?;
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        Ok(Arc::new(Self {
            sql,
            config,
            encoding_key,
            decoding_key,
            validation: Validation::default(),
        }))
    }
}
