use std::sync::Arc;

use axum::extract::{FromRef, Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use fabrica_core::{ListResult, Principal, ServiceError};

use crate::engine::DocFlow;
use crate::model::{AuditEntry, Doc, DocQuery, Lifecycle, UpdateRequest};
use crate::rules::{available_actions, may_run};

/// Read and edit routes shared by every document kind.
///
/// Routes (relative to the module):
/// - `GET {path}`: list (status, parentId, limit, page, cursor)
/// - `GET {path}/{id}`: get
/// - `PATCH {path}/{id}`: merge-patch `data` while editable
/// - `GET {path}/{id}/history`: audit trail
/// - `GET {path}/{id}/actions`: actions the caller may take now
///
/// Domain modules add `POST {path}` and `POST {path}/{id}/@<action>` on top.
pub fn document_routes<L, S>(path: &str) -> Router<S>
where
    L: Lifecycle,
    S: Clone + Send + Sync + 'static,
    Arc<DocFlow>: FromRef<S>,
{
    Router::new()
        .route(path, get(list_documents::<L>))
        .route(
            &format!("{path}/{{id}}"),
            get(get_document::<L>).patch(update_document::<L>),
        )
        .route(&format!("{path}/{{id}}/history"), get(document_history::<L>))
        .route(&format!("{path}/{{id}}/actions"), get(document_actions::<L>))
}

async fn list_documents<L: Lifecycle>(
    State(flow): State<Arc<DocFlow>>,
    principal: Principal,
    Query(query): Query<DocQuery>,
) -> Result<Json<ListResult<Doc<L>>>, ServiceError> {
    Ok(Json(flow.list::<L>(&principal, &query)?))
}

async fn get_document<L: Lifecycle>(
    State(flow): State<Arc<DocFlow>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Doc<L>>, ServiceError> {
    Ok(Json(flow.get::<L>(&principal, &id)?))
}

async fn update_document<L: Lifecycle>(
    State(flow): State<Arc<DocFlow>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<Doc<L>>, ServiceError> {
    let doc = flow.update::<L>(&principal, &id, req.expected_version, &req.data)?;
    Ok(Json(doc))
}

async fn document_history<L: Lifecycle>(
    State(flow): State<Arc<DocFlow>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditEntry>>, ServiceError> {
    Ok(Json(flow.history::<L>(&principal, &id)?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionsResponse {
    status: String,
    actions: Vec<&'static str>,
}

async fn document_actions<L: Lifecycle>(
    State(flow): State<Arc<DocFlow>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<ActionsResponse>, ServiceError> {
    let doc = flow.get::<L>(&principal, &id)?;
    let actions = available_actions(L::RULES, doc.status)
        .into_iter()
        .filter(|action| {
            L::RULES
                .iter()
                .any(|r| {
                    r.action == *action && r.from.contains(&doc.status) && may_run(&principal, r)
                })
        })
        .collect();
    Ok(Json(ActionsResponse {
        status: doc.status.to_string(),
        actions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Extension;
    use tower::ServiceExt;

    use crate::engine::tests::{flow, user, Ticket, TicketData};

    fn app(flow: Arc<DocFlow>, principal: Principal) -> Router {
        document_routes::<Ticket, Arc<DocFlow>>("/tickets")
            .with_state(flow)
            .layer(Extension(principal))
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn seeded() -> (Arc<DocFlow>, Principal, String) {
        let flow = Arc::new(flow());
        let p = user("c1", &["test:ticket:*"]);
        let doc = flow
            .create::<Ticket>(
                &p,
                TicketData { title: "conveyor".into(), assignee: None, reporter: None },
                None,
            )
            .unwrap();
        (flow, p, doc.id)
    }

    #[tokio::test]
    async fn get_and_list() {
        let (flow, p, id) = seeded();

        let resp = app(flow.clone(), p.clone())
            .oneshot(Request::get(format!("/tickets/{id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["number"], "TK-000001");
        assert_eq!(json["status"], "OPEN");
        assert_eq!(json["viewMode"], "T1");
        assert_eq!(json["data"]["title"], "conveyor");

        let resp = app(flow, p)
            .oneshot(Request::get("/tickets?status=OPEN&limit=10").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["total"], 1);
        assert!(json.get("nextCursor").is_none());
    }

    #[tokio::test]
    async fn other_company_gets_404() {
        let (flow, _, id) = seeded();
        let resp = app(flow, user("c2", &["*"]))
            .oneshot(Request::get(format!("/tickets/{id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn patch_and_history() {
        let (flow, p, id) = seeded();
        let resp = app(flow.clone(), p.clone())
            .oneshot(
                Request::patch(format!("/tickets/{id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"expectedVersion":1,"data":{"assignee":"ana"}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["version"], 2);
        assert_eq!(json["data"]["assignee"], "ana");

        let resp = app(flow, p)
            .oneshot(Request::get(format!("/tickets/{id}/history")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        let actions: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["action"].as_str().unwrap())
            .collect();
        assert_eq!(actions, vec!["create", "update"]);
    }

    #[tokio::test]
    async fn actions_respect_permissions() {
        let (flow, _, id) = seeded();

        let resp = app(flow.clone(), user("c1", &["test:ticket:read", "test:ticket:assign"]))
            .oneshot(Request::get(format!("/tickets/{id}/actions")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["status"], "OPEN");
        assert_eq!(json["actions"], serde_json::json!(["assign"]));

        let resp = app(flow, user("c1", &["test:ticket:read"]))
            .oneshot(Request::get(format!("/tickets/{id}/actions")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["actions"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn missing_principal_is_401() {
        let (flow, _, id) = seeded();
        let resp = document_routes::<Ticket, Arc<DocFlow>>("/tickets")
            .with_state(flow)
            .oneshot(Request::get(format!("/tickets/{id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
