use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use docflow::{document_routes, Doc, NoteRequest};
use fabrica_core::{Principal, ServiceError};

use crate::model::{Loto, LotoData, ReleaseRequest};
use crate::service::CmmsService;

pub fn router() -> Router<CmmsService> {
    document_routes::<Loto, CmmsService>("/lotos")
        .route("/lotos", post(create_loto))
        .route("/lotos/{id}/@verify", post(verify_loto))
        .route("/lotos/{id}/@release", post(release_point))
}

async fn create_loto(
    State(svc): State<CmmsService>,
    principal: Principal,
    Json(data): Json<LotoData>,
) -> Result<Json<Doc<Loto>>, ServiceError> {
    Ok(Json(svc.create_loto(&principal, data)?))
}

async fn verify_loto(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<Doc<Loto>>, ServiceError> {
    Ok(Json(svc.verify_loto(&principal, &id, req.note.as_deref())?))
}

async fn release_point(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<Doc<Loto>>, ServiceError> {
    Ok(Json(svc.release_loto_point(&principal, &id, req.point_id.trim())?))
}
