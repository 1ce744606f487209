//! Route registration: module routes plus system endpoints.

use std::sync::Arc;

use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use auth::service::AuthService;
use fabrica_core::Module;

use crate::auth_middleware;

/// Build the complete router.
///
/// Each module is nested under `/{name}`; `/meta/permissions` lists the
/// permission strings each module checks.
pub fn build_router(auth: Arc<AuthService>, modules: &[&dyn Module]) -> Router {
    let mut catalog = serde_json::Map::new();
    for module in modules {
        catalog.insert(module.name().to_string(), serde_json::json!(module.permissions()));
    }
    let catalog = serde_json::Value::Object(catalog);

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route(
            "/meta/permissions",
            get(move || async move { Json(catalog) }),
        );

    for module in modules {
        app = app.nest(&format!("/{}", module.name()), module.routes());
    }

    app.layer(middleware::from_fn_with_state(
        auth,
        auth_middleware::auth_middleware,
    ))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
    }))
}

async fn version() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "fabricad",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use tower::ServiceExt;

    use auth::service::password::hash_password;
    use auth::service::{AuthConfig, AuthService};
    use auth::{AuthModule, Claims};
    use cmms::worker::WatchdogConfig;
    use cmms::CmmsModule;
    use docflow::DocFlow;
    use fabrica_sql::{SQLStore, SqliteStore};

    struct Harness {
        app: Router,
        auth: Arc<AuthService>,
        cmms: CmmsModule,
    }

    fn harness() -> Harness {
        let sql: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let auth_module = AuthModule::new(
            Arc::clone(&sql),
            AuthConfig {
                jwt_secret: "test-secret".into(),
                expire_secs: 3600,
                root_password_hash: hash_password("root-pass-1").unwrap(),
            },
        )
        .unwrap();
        let flow = Arc::new(DocFlow::new(sql).unwrap());
        let cmms = CmmsModule::new(flow, WatchdogConfig::default());
        let auth = auth_module.service();
        let app = super::build_router(Arc::clone(&auth), &[&auth_module, &cmms]);
        Harness { app, auth, cmms }
    }

    fn token(auth: &AuthService, perms: &[&str], extended_view: bool) -> String {
        let now = unix_now();
        auth.issue_token(&Claims {
            sub: "ana".into(),
            company_id: "plant-1".into(),
            permissions: perms.iter().map(|p| p.to_string()).collect(),
            root: false,
            extended_view,
            iat: now,
            exp: now + 600,
        })
        .unwrap()
    }

    fn unix_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public_and_modules_are_not() {
        let h = harness();
        let resp = h
            .app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = h
            .app
            .oneshot(Request::get("/cmms/permits").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["code"], "UNAUTHENTICATED");
        h.cmms.shutdown();
    }

    #[tokio::test]
    async fn login_cookie_authenticates_module_routes() {
        let h = harness();
        let resp = h
            .app
            .clone()
            .oneshot(
                Request::post("/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "username": "root",
                            "password": "root-pass-1",
                            "companyId": "plant-1",
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        let pair = cookie.split(';').next().unwrap().to_string();

        let resp = h
            .app
            .clone()
            .oneshot(
                Request::get("/auth/me")
                    .header(header::COOKIE, pair.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let me = body_json(resp).await;
        assert_eq!(me["userId"], "root");
        assert_eq!(me["companyId"], "plant-1");

        let resp = h
            .app
            .oneshot(
                Request::post("/cmms/work-orders")
                    .header(header::COOKIE, pair.as_str())
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"machineId": "press-4", "title": "Replace seal"})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["number"], "WO-000001");
        h.cmms.shutdown();
    }

    #[tokio::test]
    async fn extended_view_needs_the_claim() {
        let h = harness();
        let request = |token: &str| {
            Request::get("/cmms/work-orders")
                .header("authorization", format!("Bearer {token}"))
                .header("x-view-mode", "T2")
                .body(Body::empty())
                .unwrap()
        };

        let standard = token(&h.auth, &["cmms:*"], false);
        let resp = h.app.clone().oneshot(request(&standard)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let extended = token(&h.auth, &["cmms:*"], true);
        let resp = h.app.clone().oneshot(request(&extended)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = h
            .app
            .oneshot(
                Request::get("/cmms/work-orders")
                    .header("authorization", format!("Bearer {extended}"))
                    .header("x-view-mode", "T9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        h.cmms.shutdown();
    }

    #[tokio::test]
    async fn permission_catalog_lists_modules() {
        let h = harness();
        let t = token(&h.auth, &[], false);
        let resp = h
            .app
            .oneshot(
                Request::get("/meta/permissions")
                    .header("authorization", format!("Bearer {t}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let catalog = body_json(resp).await;
        let cmms = catalog["cmms"].as_array().unwrap();
        assert!(cmms.iter().any(|p| p == "cmms:permit:approve"));
        assert!(catalog["auth"].as_array().unwrap().iter().any(|p| p == "auth:user:create"));
        h.cmms.shutdown();
    }
}
