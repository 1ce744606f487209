use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};

use docflow::{document_routes, Doc, IdempotencyKey, NoteRequest, ReasonRequest};
use fabrica_core::{Principal, ServiceError};

use crate::model::{Invoice, InvoiceData, PaymentRequest};
use crate::service::SalesService;

pub fn router() -> Router<SalesService> {
    document_routes::<Invoice, SalesService>("/invoices")
        .route("/invoices", post(create_invoice))
        .route("/invoices/{id}/@issue", post(issue_invoice))
        .route("/invoices/{id}/@pay", post(pay_invoice))
        .route("/invoices/{id}/@void", post(void_invoice))
        .route("/invoices/{id}/@cancel", post(cancel_invoice))
}

type InvoiceResult = Result<Json<Doc<Invoice>>, ServiceError>;

async fn create_invoice(
    State(svc): State<SalesService>,
    principal: Principal,
    Json(data): Json<InvoiceData>,
) -> InvoiceResult {
    Ok(Json(svc.create_invoice(&principal, data)?))
}

async fn issue_invoice(
    State(svc): State<SalesService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> InvoiceResult {
    Ok(Json(svc.issue_invoice(&principal, &id, req.note.as_deref())?))
}

// ---------------------------------------------------------------------------
// POST /invoices/{id}/@pay   (honours Idempotency-Key)
// ---------------------------------------------------------------------------

async fn pay_invoice(
    State(svc): State<SalesService>,
    principal: Principal,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PaymentRequest>,
) -> InvoiceResult {
    let key = IdempotencyKey::from_headers(&headers, &serde_json::to_value(&req)?)?;
    Ok(Json(svc.record_payment(&principal, &id, &req, key.as_ref())?))
}

async fn void_invoice(
    State(svc): State<SalesService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> InvoiceResult {
    let reason = req.required("void")?;
    Ok(Json(svc.void_invoice(&principal, &id, reason)?))
}

async fn cancel_invoice(
    State(svc): State<SalesService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> InvoiceResult {
    Ok(Json(svc.cancel_invoice(&principal, &id, req.note.as_deref())?))
}
