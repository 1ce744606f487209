use jsonwebtoken::{decode, encode, Header};
use tracing::{info, warn};

use crate::model::{Claims, LoginRequest, LoginResponse, ROOT_USERNAME};
use crate::service::password::verify_password;
use crate::service::{AuthError, AuthService};

/// Company the root account acts in when the login names none.
pub const DEFAULT_COMPANY: &str = "default";

impl AuthService {
    /// Verify credentials and issue an access token.
    ///
    /// `root` is checked against the configured hash; everyone else against
    /// the users table. Failures never say which part was wrong.
    pub fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let exp = now + self.config.expire_secs as i64;

        let claims = if req.username == ROOT_USERNAME {
            if !verify_password(&req.password, &self.config.root_password_hash) {
                warn!("root login failed");
                return Err(invalid_credentials());
            }
            Claims {
                sub: ROOT_USERNAME.to_string(),
                company_id: req
                    .company_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_COMPANY.to_string()),
                permissions: Vec::new(),
                root: true,
                extended_view: true,
                iat: now,
                exp,
            }
        } else {
            let Some((user, hash)) = self.find_credentials(&req.username)? else {
                warn!("login failed for unknown user {}", req.username);
                return Err(invalid_credentials());
            };
            if !verify_password(&req.password, &hash) {
                warn!("login failed for {}", req.username);
                return Err(invalid_credentials());
            }
            Claims {
                permissions: self.permissions_for(&user.company_id, &user.roles)?,
                sub: user.id,
                company_id: user.company_id,
                root: false,
                extended_view: user.extended_view,
                iat: now,
                exp,
            }
        };

        let token = self.issue_token(&claims)?;
        info!("{} logged in to company {}", req.username, claims.company_id);
        Ok(LoginResponse {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.expire_secs,
        })
    }

    /// Sign claims as an HS256 JWT.
    pub fn issue_token(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("failed to encode JWT: {e}")))
    }

    /// Validate signature and expiry and return the claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::Unauthorized(format!("invalid token: {e}")))
    }
}

fn invalid_credentials() -> AuthError {
    AuthError::Unauthorized("invalid credentials".into())
}
