use std::net::SocketAddr;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, routes};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::home::home_routes())
        .merge(auth::router())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{header, Request, Response, StatusCode},
    };
    use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        auth::{
            claims::TokenKind,
            cookie::path_matches,
            handlers::{LOGOUT_ROUTE, REFRESH_ROUTE},
            repo::UserStore,
        },
        config::{tests::test_config, TokenStoreKind},
    };

    async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
        app.clone().oneshot(req).await.unwrap()
    }

    fn login_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_with_cookie(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().method("POST").uri(uri);
        if let Some(value) = cookie {
            req = req.header(header::COOKIE, format!("refresh_token={value}"));
        }
        req.body(Body::empty()).unwrap()
    }

    fn set_cookie(res: &Response<Body>) -> String {
        res.headers()
            .get(header::SET_COOKIE)
            .expect("Set-Cookie header")
            .to_str()
            .unwrap()
            .to_string()
    }

    fn cookie_value(set_cookie: &str) -> String {
        set_cookie
            .split(';')
            .next()
            .and_then(|kv| kv.strip_prefix("refresh_token="))
            .expect("refresh_token cookie")
            .to_string()
    }

    fn cookie_path(set_cookie: &str) -> String {
        set_cookie
            .split("; ")
            .find_map(|attr| attr.strip_prefix("Path="))
            .expect("Path attribute")
            .to_string()
    }

    fn cookie_expires(set_cookie: &str) -> OffsetDateTime {
        let raw = set_cookie
            .split("; ")
            .find_map(|attr| attr.strip_prefix("Expires="))
            .expect("Expires attribute");
        PrimitiveDateTime::parse(
            raw,
            format_description!(
                "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
            ),
        )
        .unwrap()
        .assume_utc()
    }

    async fn json_body(res: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn login_refresh_logout_scenario() {
        let (state, users) = AppState::fake().await;
        let app = build_app(state.clone());

        // login
        let res = send(&app, login_request(r#"{"username":"alice","password":"secret"}"#)).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let first_cookie = set_cookie(&res);
        assert!(first_cookie.contains("HttpOnly"));
        assert!(first_cookie.contains("Path=/auth;"));
        let body = json_body(res).await;
        let first_refresh = body["refresh_token"].as_str().unwrap().to_string();
        assert!(body["access_token"].is_string());
        assert_eq!(cookie_value(&first_cookie), first_refresh);

        // refresh with that cookie
        let res = send(&app, post_with_cookie(REFRESH_ROUTE, Some(&first_refresh))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let second_cookie = set_cookie(&res);
        let body = json_body(res).await;
        assert_ne!(body["refresh_token"].as_str().unwrap(), first_refresh);
        assert_ne!(cookie_value(&second_cookie), cookie_value(&first_cookie));

        // refresh with an expired refresh token
        let alice = users.find_by_username("alice").await.unwrap().unwrap();
        let stale = state
            .keys
            .sign_at(
                &alice.identity(),
                TokenKind::Refresh,
                Duration::from_secs(60),
                OffsetDateTime::now_utc() - time::Duration::minutes(10),
            )
            .unwrap();
        let res = send(&app, post_with_cookie(REFRESH_ROUTE, Some(&stale))).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(res).await, serde_json::json!({ "error": "unauthorized" }));

        // logout
        let res = send(&app, post_with_cookie(LOGOUT_ROUTE, None)).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let cleared = set_cookie(&res);
        assert_eq!(cookie_value(&cleared), "");
        assert!(cleared.contains("Max-Age=0"));
        assert!(cookie_expires(&cleared) < OffsetDateTime::now_utc());
        assert!(cookie_expires(&cleared) < cookie_expires(&second_cookie));
    }

    #[tokio::test]
    async fn login_failures_are_400_with_error_body() {
        let (state, _) = AppState::fake().await;
        let app = build_app(state);

        let res = send(&app, login_request(r#"{"username":"alice","password":"nope"}"#)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(json_body(res).await["error"], "invalid credentials");

        let res = send(&app, login_request(r#"{"username":"bob","password":"secret"}"#)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "invalid credentials");

        let res = send(&app, login_request("{not json")).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(res).await["error"].is_string());
    }

    #[tokio::test]
    async fn refresh_without_cookie() {
        let (state, _) = AppState::fake().await;
        let res = send(&build_app(state), post_with_cookie(REFRESH_ROUTE, None)).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(res.headers().get(header::SET_COOKIE).is_none());

        let mut cfg = test_config();
        cfg.refresh_silent_when_missing = true;
        let (state, _) = AppState::fake_with(cfg).await;
        let res = send(&build_app(state), post_with_cookie(REFRESH_ROUTE, None)).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn logout_with_stale_cookie_still_succeeds() {
        let (state, _) = AppState::fake().await;
        let res = send(&build_app(state), post_with_cookie(LOGOUT_ROUTE, Some("stale.token.value"))).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(cookie_value(&set_cookie(&res)), "");
    }

    #[tokio::test]
    async fn issued_cookie_reaches_logout_and_logout_revokes_it() {
        let mut cfg = test_config();
        cfg.token_store = TokenStoreKind::Memory;
        let (state, _) = AppState::fake_with(cfg).await;
        let app = build_app(state);

        let res = send(&app, login_request(r#"{"username":"alice","password":"secret"}"#)).await;
        let issued = set_cookie(&res);
        let path = cookie_path(&issued);
        assert!(path_matches(&path, REFRESH_ROUTE), "{path} must cover {REFRESH_ROUTE}");
        assert!(path_matches(&path, LOGOUT_ROUTE), "{path} must cover {LOGOUT_ROUTE}");

        // what a browser would send to the logout route
        let token = cookie_value(&issued);
        let res = send(&app, post_with_cookie(LOGOUT_ROUTE, Some(&token))).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(cookie_path(&set_cookie(&res)), path);

        let res = send(&app, post_with_cookie(REFRESH_ROUTE, Some(&token))).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn root_logout_still_clears_cookie() {
        let (state, _) = AppState::fake().await;
        let res = send(&build_app(state), post_with_cookie("/logout", None)).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(cookie_value(&set_cookie(&res)), "");
    }

    #[tokio::test]
    async fn me_requires_access_token() {
        let (state, _) = AppState::fake().await;
        let app = build_app(state);

        let res = send(&app, login_request(r#"{"username":"alice","password":"secret"}"#)).await;
        let body = json_body(res).await;
        let access = body["access_token"].as_str().unwrap().to_string();
        let refresh = body["refresh_token"].as_str().unwrap().to_string();

        let me = |token: &str| {
            Request::builder()
                .uri("/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap()
        };

        let res = send(&app, me(&access)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["username"], "alice");

        let res = send(&app, me(&refresh)).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = send(&app, Request::builder().uri("/me").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn home_reports_status() {
        let (state, _) = AppState::fake().await;
        let res = send(&build_app(state), Request::builder().uri("/").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["status"], "active");
        assert_eq!(body["message"], "Welcome to the forum");
    }
}
