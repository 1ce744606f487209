use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use fabrica_core::{Principal, ServiceError};

use crate::api::AppState;
use crate::model::{LoginRequest, LoginResponse};

/// Cookie carrying the access token for browser clients.
pub const TOKEN_COOKIE: &str = "fabrica_token";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

/// POST /auth/login: token in the body and in an HttpOnly cookie.
async fn login(
    State(svc): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ServiceError> {
    let resp = svc.login(&req)?;
    let cookie = Cookie::build((TOKEN_COOKIE, resp.access_token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    Ok((jar.add(cookie), Json(resp)))
}

/// POST /auth/logout: drop the cookie. Bearer tokens simply expire.
async fn logout(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(TOKEN_COOKIE).path("/"))
}

/// GET /auth/me: the caller as the server sees it.
async fn me(principal: Principal) -> Json<Principal> {
    Json(principal)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::service::tests::{service, ROOT_PASSWORD};

    fn login_request(password: &str) -> Request<Body> {
        Request::post("/login")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"username": "root", "password": password, "companyId": "plant-1"})
                    .to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn login_sets_http_only_cookie() {
        let svc = service();
        let resp = crate::api::router(svc.clone())
            .oneshot(login_request(ROOT_PASSWORD))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("fabrica_token="));
        assert!(cookie.contains("HttpOnly"));

        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let claims = svc.verify_token(json["accessToken"].as_str().unwrap()).unwrap();
        assert_eq!(claims.company_id, "plant-1");
    }

    #[tokio::test]
    async fn bad_password_is_401() {
        let resp = crate::api::router(service())
            .oneshot(login_request("guess"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_expires_the_cookie() {
        let resp = crate::api::router(service())
            .oneshot(
                Request::post("/logout")
                    .header(header::COOKIE, "fabrica_token=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let cookie = resp.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("fabrica_token="));
        assert!(cookie.contains("Max-Age=0"));
    }
}
