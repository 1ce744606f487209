//! Authentication middleware.
//!
//! Takes the JWT from `Authorization: Bearer <token>` or the
//! `fabrica_token` cookie, validates it, resolves the view mode from
//! `x-view-mode` and stores the resulting `Principal` in the request
//! extensions for handlers to extract.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;

use auth::api::TOKEN_COOKIE;
use auth::service::AuthService;
use fabrica_core::view::VIEW_MODE_HEADER;
use fabrica_core::{ServiceError, ViewMode};

pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    if is_public_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let token = extract_token(request.headers())
        .ok_or_else(|| ServiceError::Unauthorized("missing authorization token".into()))?;
    let claims = auth.verify_token(&token)?;

    let view_mode = match request.headers().get(VIEW_MODE_HEADER) {
        None => ViewMode::Standard,
        Some(v) => ViewMode::parse(v.to_str().unwrap_or_default())?,
    };
    let principal = claims.principal(view_mode).ok_or_else(|| {
        ServiceError::PermissionDenied(format!("user {} may not use the T2 view", claims.sub))
    })?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Bearer header first, then the session cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    bearer.or_else(|| {
        CookieJar::from_headers(headers)
            .get(TOKEN_COOKIE)
            .map(|c| c.value().to_string())
    })
}

/// Check if a request path is public (no auth required).
fn is_public_path(path: &str) -> bool {
    matches!(path, "/health" | "/version" | "/auth/login" | "/auth/logout")
}
