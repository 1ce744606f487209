use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use docflow::{document_routes, Doc, NoteRequest, ReasonRequest};
use fabrica_core::{Principal, ServiceError};

use crate::model::{CompleteRequest, StartRequest, WorkOrder, WorkOrderData};
use crate::service::CmmsService;

pub fn router() -> Router<CmmsService> {
    document_routes::<WorkOrder, CmmsService>("/work-orders")
        .route("/work-orders", post(create_work_order))
        .route("/work-orders/{id}/@start", post(start_work_order))
        .route("/work-orders/{id}/@hold", post(hold_work_order))
        .route("/work-orders/{id}/@complete", post(complete_work_order))
        .route("/work-orders/{id}/@cancel", post(cancel_work_order))
}

// ---------------------------------------------------------------------------
// POST /work-orders
// ---------------------------------------------------------------------------

async fn create_work_order(
    State(svc): State<CmmsService>,
    principal: Principal,
    Json(data): Json<WorkOrderData>,
) -> Result<Json<Doc<WorkOrder>>, ServiceError> {
    Ok(Json(svc.create_work_order(&principal, data)?))
}

// ---------------------------------------------------------------------------
// POST /work-orders/:id/@start
// ---------------------------------------------------------------------------

async fn start_work_order(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<StartRequest>,
) -> Result<Json<Doc<WorkOrder>>, ServiceError> {
    let wo = svc.start_work_order(&principal, &id, req.permit_id, req.note.as_deref())?;
    Ok(Json(wo))
}

// ---------------------------------------------------------------------------
// POST /work-orders/:id/@hold
// ---------------------------------------------------------------------------

async fn hold_work_order(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<Doc<WorkOrder>>, ServiceError> {
    let reason = req.required("hold")?;
    Ok(Json(svc.hold_work_order(&principal, &id, reason)?))
}

// ---------------------------------------------------------------------------
// POST /work-orders/:id/@complete
// ---------------------------------------------------------------------------

async fn complete_work_order(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<Doc<WorkOrder>>, ServiceError> {
    let wo = svc.complete_work_order(&principal, &id, &req.notes, req.labor_hours)?;
    Ok(Json(wo))
}

// ---------------------------------------------------------------------------
// POST /work-orders/:id/@cancel
// ---------------------------------------------------------------------------

async fn cancel_work_order(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<Doc<WorkOrder>>, ServiceError> {
    Ok(Json(svc.cancel_work_order(&principal, &id, req.note.as_deref())?))
}
