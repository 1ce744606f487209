use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use fabrica_core::{ListParams, ListResult, Principal, ServiceError};

use crate::api::AppState;
use crate::model::{CreateUser, User};

pub const USER_CREATE: &str = "auth:user:create";
pub const USER_LIST: &str = "auth:user:list";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user))
}

async fn create_user(
    State(svc): State<AppState>,
    principal: Principal,
    Json(input): Json<CreateUser>,
) -> Result<Json<User>, ServiceError> {
    principal.require(USER_CREATE)?;
    Ok(Json(svc.create_user(&principal.company_id, input)?))
}

async fn list_users(
    State(svc): State<AppState>,
    principal: Principal,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResult<User>>, ServiceError> {
    principal.require(USER_LIST)?;
    Ok(Json(svc.list_users(&principal.company_id, &params)?))
}

async fn get_user(
    State(svc): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<User>, ServiceError> {
    principal.require(USER_LIST)?;
    Ok(Json(svc.get_user(&principal.company_id, &id)?))
}
