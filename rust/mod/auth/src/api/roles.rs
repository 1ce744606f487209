use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use fabrica_core::{Principal, ServiceError};

use crate::api::AppState;
use crate::model::{CreateRole, Role};

pub const ROLE_CREATE: &str = "auth:role:create";
pub const ROLE_LIST: &str = "auth:role:list";

pub fn routes() -> Router<AppState> {
    Router::new().route("/roles", get(list_roles).post(create_role))
}

async fn create_role(
    State(svc): State<AppState>,
    principal: Principal,
    Json(input): Json<CreateRole>,
) -> Result<Json<Role>, ServiceError> {
    principal.require(ROLE_CREATE)?;
    Ok(Json(svc.create_role(&principal.company_id, input)?))
}

async fn list_roles(
    State(svc): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Role>>, ServiceError> {
    principal.require(ROLE_LIST)?;
    Ok(Json(svc.list_roles(&principal.company_id)?))
}
