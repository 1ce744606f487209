use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use docflow::{document_routes, Doc, NoteRequest, ReasonRequest};
use fabrica_core::{Principal, ServiceError};

use crate::model::{PurchaseOrder, PurchaseOrderData, ReceiveRequest};
use crate::service::PurchasingService;

/// Build the purchasing router.
///
/// Routes:
/// - `/orders`: create, list, get, patch, history, actions
/// - `POST /orders/{id}/@submit|@approve|@reject|@send|@receive|@cancel`
pub fn router(service: PurchasingService) -> Router {
    document_routes::<PurchaseOrder, PurchasingService>("/orders")
        .route("/orders", post(create_order))
        .route("/orders/{id}/@submit", post(submit_order))
        .route("/orders/{id}/@approve", post(approve_order))
        .route("/orders/{id}/@reject", post(reject_order))
        .route("/orders/{id}/@send", post(send_order))
        .route("/orders/{id}/@receive", post(receive_order))
        .route("/orders/{id}/@cancel", post(cancel_order))
        .with_state(service)
}

type OrderResult = Result<Json<Doc<PurchaseOrder>>, ServiceError>;

// ---------------------------------------------------------------------------
// POST /orders
// ---------------------------------------------------------------------------

async fn create_order(
    State(svc): State<PurchasingService>,
    principal: Principal,
    Json(data): Json<PurchaseOrderData>,
) -> OrderResult {
    Ok(Json(svc.create_order(&principal, data)?))
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

async fn submit_order(
    State(svc): State<PurchasingService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> OrderResult {
    Ok(Json(svc.submit_order(&principal, &id, req.note.as_deref())?))
}

async fn approve_order(
    State(svc): State<PurchasingService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> OrderResult {
    Ok(Json(svc.approve_order(&principal, &id, req.note.as_deref())?))
}

async fn reject_order(
    State(svc): State<PurchasingService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> OrderResult {
    let reason = req.required("reject")?;
    Ok(Json(svc.reject_order(&principal, &id, reason)?))
}

// ---------------------------------------------------------------------------
// Fulfilment
// ---------------------------------------------------------------------------

async fn send_order(
    State(svc): State<PurchasingService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> OrderResult {
    Ok(Json(svc.send_order(&principal, &id, req.note.as_deref())?))
}

async fn receive_order(
    State(svc): State<PurchasingService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<ReceiveRequest>,
) -> OrderResult {
    Ok(Json(svc.receive_order(&principal, &id, &req.lines, req.note.as_deref())?))
}

async fn cancel_order(
    State(svc): State<PurchasingService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> OrderResult {
    Ok(Json(svc.cancel_order(&principal, &id, req.note.as_deref())?))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::{Extension, Router};
    use tower::ServiceExt;

    use crate::service::tests::{buyer, service};
    use crate::service::PurchasingService;

    fn app(svc: PurchasingService, perms: &[&str]) -> Router {
        super::router(svc).layer(Extension(buyer(perms)))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn order_flow_over_http() {
        let svc = service();
        let all = ["purchasing:*"];
        let resp = app(svc.clone(), &all)
            .oneshot(post_json(
                "/orders",
                serde_json::json!({
                    "supplierId": "acme",
                    "warehouseId": "main",
                    "lines": [{"itemId": "gasket", "quantity": 8, "unitPriceCents": 125}],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let po = body_json(resp).await;
        assert_eq!(po["number"], "PO-000001");
        assert_eq!(po["data"]["lines"][0]["lineId"], "L1");
        let id = po["id"].as_str().unwrap().to_string();

        for action in ["submit", "approve", "send"] {
            let resp = app(svc.clone(), &all)
                .oneshot(post_json(&format!("/orders/{id}/@{action}"), serde_json::json!({})))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{action}");
        }

        let resp = app(svc.clone(), &all)
            .oneshot(post_json(
                &format!("/orders/{id}/@receive"),
                serde_json::json!({"lines": [{"lineId": "L1", "quantity": 3}]}),
            ))
            .await
            .unwrap();
        let po = body_json(resp).await;
        assert_eq!(po["status"], "PARTIALLY_RECEIVED");
        assert_eq!(po["data"]["lines"][0]["receivedQty"], 3);

        let resp = app(svc, &all)
            .oneshot(
                Request::post(format!("/orders/{id}/@cancel"))
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn approve_without_permission_is_403() {
        let svc = service();
        let clerk = ["purchasing:order:create", "purchasing:order:submit"];
        let resp = app(svc.clone(), &clerk)
            .oneshot(post_json(
                "/orders",
                serde_json::json!({
                    "supplierId": "acme",
                    "warehouseId": "main",
                    "lines": [{"itemId": "gasket", "quantity": 1, "unitPriceCents": 10}],
                }),
            ))
            .await
            .unwrap();
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();
        app(svc.clone(), &clerk)
            .oneshot(post_json(&format!("/orders/{id}/@submit"), serde_json::json!({})))
            .await
            .unwrap();

        let resp = app(svc, &clerk)
            .oneshot(post_json(&format!("/orders/{id}/@approve"), serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(resp).await["code"], "PERMISSION_DENIED");
    }
}
