use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use docflow::{document_routes, Doc, NoteRequest, ReasonRequest};
use fabrica_core::{Principal, ServiceError};

use crate::model::{CloseRequest, Permit, PermitData};
use crate::service::CmmsService;

pub fn router() -> Router<CmmsService> {
    document_routes::<Permit, CmmsService>("/permits")
        .route("/permits", post(create_permit))
        .route("/permits/{id}/@submit", post(submit_permit))
        .route("/permits/{id}/@approve", post(approve_permit))
        .route("/permits/{id}/@reject", post(reject_permit))
        .route("/permits/{id}/@activate", post(activate_permit))
        .route("/permits/{id}/@suspend", post(suspend_permit))
        .route("/permits/{id}/@resume", post(resume_permit))
        .route("/permits/{id}/@close", post(close_permit))
        .route("/permits/{id}/@cancel", post(cancel_permit))
}

type PermitResult = Result<Json<Doc<Permit>>, ServiceError>;

// ---------------------------------------------------------------------------
// POST /permits
// ---------------------------------------------------------------------------

async fn create_permit(
    State(svc): State<CmmsService>,
    principal: Principal,
    Json(data): Json<PermitData>,
) -> PermitResult {
    Ok(Json(svc.create_permit(&principal, data)?))
}

// ---------------------------------------------------------------------------
// Approval chain
// ---------------------------------------------------------------------------

async fn submit_permit(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> PermitResult {
    Ok(Json(svc.submit_permit(&principal, &id, req.note.as_deref())?))
}

async fn approve_permit(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> PermitResult {
    Ok(Json(svc.approve_permit(&principal, &id, req.note.as_deref())?))
}

async fn reject_permit(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> PermitResult {
    let reason = req.required("reject")?;
    Ok(Json(svc.reject_permit(&principal, &id, reason)?))
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

async fn activate_permit(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> PermitResult {
    Ok(Json(svc.activate_permit(&principal, &id, req.note.as_deref())?))
}

async fn suspend_permit(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> PermitResult {
    let reason = req.required("suspend")?;
    Ok(Json(svc.suspend_permit(&principal, &id, reason)?))
}

async fn resume_permit(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> PermitResult {
    Ok(Json(svc.resume_permit(&principal, &id, req.note.as_deref())?))
}

async fn close_permit(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<CloseRequest>,
) -> PermitResult {
    Ok(Json(svc.close_permit(&principal, &id, &req.notes)?))
}

async fn cancel_permit(
    State(svc): State<CmmsService>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> PermitResult {
    Ok(Json(svc.cancel_permit(&principal, &id, req.note.as_deref())?))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::{Extension, Router};
    use tower::ServiceExt;

    use crate::service::tests::{active_permit, service, user};
    use crate::service::CmmsService;

    fn app(svc: CmmsService, who: &str) -> Router {
        crate::api::router(svc).layer(Extension(user(who)))
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

    fn permit_body() -> serde_json::Value {
        let now = chrono::Utc::now();
        serde_json::json!({
            "permitType": "CONFINED_SPACE",
            "location": "Tank 2",
            "hazards": ["oxygen deficiency"],
            "ppe": ["harness"],
            "validFrom": (now - chrono::Duration::hours(1)).to_rfc3339(),
            "validUntil": (now + chrono::Duration::hours(4)).to_rfc3339(),
        })
    }

    #[tokio::test]
    async fn submit_twice_is_400_invalid_transition() {
        let svc = service();

        let resp = app(svc.clone(), "ana")
            .oneshot(post_json("/permits", permit_body()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let created = body_json(resp).await;
        assert_eq!(created["status"], "DRAFT");
        assert_eq!(created["number"], "PTW-000001");
        assert_eq!(created["data"]["requestedBy"], "ana");
        let id = created["id"].as_str().unwrap().to_string();

        let uri = format!("/permits/{id}/@submit");
        let resp = app(svc.clone(), "ana")
            .oneshot(post_json(&uri, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "PENDING_APPROVAL");

        let resp = app(svc, "ana")
            .oneshot(post_json(&uri, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err = body_json(resp).await;
        assert_eq!(err["code"], "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn reject_needs_reason_and_history_is_recorded() {
        let svc = service();
        let resp = app(svc.clone(), "ana")
            .oneshot(post_json("/permits", permit_body()))
            .await
            .unwrap();
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();
        app(svc.clone(), "ana")
            .oneshot(post_json(&format!("/permits/{id}/@submit"), serde_json::json!({})))
            .await
            .unwrap();

        let resp = app(svc.clone(), "sam")
            .oneshot(post_json(
                &format!("/permits/{id}/@reject"),
                serde_json::json!({"reason": "  "}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "VALIDATION_FAILED");

        let resp = app(svc.clone(), "sam")
            .oneshot(post_json(
                &format!("/permits/{id}/@reject"),
                serde_json::json!({"reason": "no gas test"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "REJECTED");
        assert_eq!(json["data"]["rejectionReason"], "no gas test");

        let resp = app(svc, "sam")
            .oneshot(
                Request::get(format!("/permits/{id}/history"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let history = body_json(resp).await;
        assert_eq!(history.as_array().unwrap().len(), 3);
        assert_eq!(history[2]["note"], "no gas test");
        assert_eq!(history[2]["actor"], "sam");
    }

    #[tokio::test]
    async fn work_order_routes_are_mounted() {
        let svc = service();
        let resp = app(svc.clone(), "ana")
            .oneshot(post_json(
                "/work-orders",
                serde_json::json!({"machineId": "lathe-2", "title": "Lubricate"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let wo = body_json(resp).await;
        assert_eq!(wo["status"], "PENDING");
        assert_eq!(wo["data"]["priority"], "MEDIUM");
        let id = wo["id"].as_str().unwrap().to_string();

        let resp = app(svc, "ana")
            .oneshot(post_json(&format!("/work-orders/{id}/@start"), serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["status"], "IN_PROGRESS");
    }

    #[tokio::test]
    async fn active_permit_actions_leave_expiry_to_the_watchdog() {
        let svc = service();
        let p = active_permit(&svc);
        let resp = app(svc, "sam")
            .oneshot(
                Request::get(format!("/permits/{}/actions", p.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        let actions: Vec<&str> = json["actions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a.as_str().unwrap())
            .collect();
        assert!(actions.contains(&"close"));
        assert!(!actions.contains(&"expire"));
    }
}
