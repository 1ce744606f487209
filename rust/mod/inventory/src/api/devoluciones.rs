use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use docflow::{document_routes, Doc, NoteRequest, ReasonRequest};
use fabrica_core::{Principal, ServiceError};

use crate::model::{Devolucion, DevolucionData};
use crate::service::InventoryService;

pub fn router() -> Router<InventoryService> {
    document_routes::<Devolucion, InventoryService>("/devoluciones")
        .route("/devoluciones", post(create_devolucion))
        .route("/devoluciones/{id}/@submit", post(submit_devolucion))
        .route("/devoluciones/{id}/@accept", post(accept_devolucion))
        .route("/devoluciones/{id}/@reject", post(reject_devolucion))
        .route("/devoluciones/{id}/@process", post(process_devolucion))
        .route("/devoluciones/{id}/@cancel", post(cancel_devolucion))
}

type DevolucionResult = Result<Json<Doc<Devolucion>>, ServiceError>;

async fn create_devolucion(
    State(svc): State<InventoryService>,
    principal: Principal,
    Json(data): Json<DevolucionData>,
) -> DevolucionResult {
    Ok(Json(svc.create_devolucion(&principal, data)?))
}

async fn submit_devolucion(
    State(svc): State<InventoryService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> DevolucionResult {
    Ok(Json(svc.submit_devolucion(&principal, &id, req.note.as_deref())?))
}

async fn accept_devolucion(
    State(svc): State<InventoryService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> DevolucionResult {
    Ok(Json(svc.accept_devolucion(&principal, &id, req.note.as_deref())?))
}

async fn reject_devolucion(
    State(svc): State<InventoryService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> DevolucionResult {
    let reason = req.required("reject")?;
    Ok(Json(svc.reject_devolucion(&principal, &id, reason)?))
}

async fn process_devolucion(
    State(svc): State<InventoryService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> DevolucionResult {
    Ok(Json(svc.process_devolucion(&principal, &id, req.note.as_deref())?))
}

async fn cancel_devolucion(
    State(svc): State<InventoryService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> DevolucionResult {
    Ok(Json(svc.cancel_devolucion(&principal, &id, req.note.as_deref())?))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Extension;
    use tower::ServiceExt;

    use crate::service::tests::{clerk, service};

    #[tokio::test]
    async fn accept_from_draft_is_rejected() {
        let app = crate::api::router(service()).layer(Extension(clerk()));
        let body = serde_json::json!({
            "customerId": "cust-9",
            "warehouseId": "main",
            "reason": "defective",
            "lines": [{"itemId": "valve", "quantity": 2, "condition": "GOOD"}],
        });
        let resp = app
            .clone()
            .oneshot(
                Request::post("/devoluciones")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let created: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(created["status"], "BORRADOR");
        let id = created["id"].as_str().unwrap();

        let resp = app
            .oneshot(
                Request::post(format!("/devoluciones/{id}/@accept"))
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let err: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(err["code"], "INVALID_TRANSITION");
    }
}
