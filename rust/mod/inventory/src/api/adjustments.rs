use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use docflow::{document_routes, Doc, NoteRequest, ReasonRequest};
use fabrica_core::{Principal, ServiceError};

use crate::model::{AdjustmentData, StockAdjustment};
use crate::service::InventoryService;

pub fn router() -> Router<InventoryService> {
    document_routes::<StockAdjustment, InventoryService>("/adjustments")
        .route("/adjustments", post(create_adjustment))
        .route("/adjustments/{id}/@submit", post(submit_adjustment))
        .route("/adjustments/{id}/@approve", post(approve_adjustment))
        .route("/adjustments/{id}/@reject", post(reject_adjustment))
        .route("/adjustments/{id}/@cancel", post(cancel_adjustment))
}

type AdjustmentResult = Result<Json<Doc<StockAdjustment>>, ServiceError>;

async fn create_adjustment(
    State(svc): State<InventoryService>,
    principal: Principal,
    Json(data): Json<AdjustmentData>,
) -> AdjustmentResult {
    Ok(Json(svc.create_adjustment(&principal, data)?))
}

async fn submit_adjustment(
    State(svc): State<InventoryService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> AdjustmentResult {
    Ok(Json(svc.submit_adjustment(&principal, &id, req.note.as_deref())?))
}

async fn approve_adjustment(
    State(svc): State<InventoryService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> AdjustmentResult {
    Ok(Json(svc.approve_adjustment(&principal, &id, req.note.as_deref())?))
}

async fn reject_adjustment(
    State(svc): State<InventoryService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> AdjustmentResult {
    let reason = req.required("reject")?;
    Ok(Json(svc.reject_adjustment(&principal, &id, reason)?))
}

async fn cancel_adjustment(
    State(svc): State<InventoryService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> AdjustmentResult {
    Ok(Json(svc.cancel_adjustment(&principal, &id, req.note.as_deref())?))
}
