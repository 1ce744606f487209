mod login;
pub(crate) mod roles;
pub(crate) mod users;

use std::sync::Arc;

use axum::Router;

use crate::service::AuthService;

pub use login::TOKEN_COOKIE;

/// Router state.
pub type AppState = Arc<AuthService>;

/// Build the auth router, nested under `/auth` by the server.
///
/// Routes:
/// - `POST /login`, `POST /logout`, `GET /me`
/// - `POST /users`, `GET /users`, `GET /users/{id}`
/// - `POST /roles`, `GET /roles`
pub fn router(service: AppState) -> Router {
    Router::new()
        .merge(login::routes())
        .merge(users::routes())
        .merge(roles::routes())
        .with_state(service)
}
