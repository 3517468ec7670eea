//! HTTP-level tests for the auth module
//!
//! These drive the full router (gate, handlers, session store) against an
//! in-memory database:
//! - Password registration and login
//! - Session cookie lifecycle
//! - Google code flow and ID-token flow
//! - Request gate behavior

#[cfg(test)]
mod tests {
    use super::super::*;
    use axum::{
        extract::Extension,
        http::{HeaderMap, StatusCode},
        middleware,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::sync::Arc;

    use crate::app::build_router;
    use crate::app::test_support::*;
    use crate::auth::models::{AuthContext, Role, GOOGLE_PROVIDER};
    use crate::common::AppState;
    use crate::services::google::test_support::{
        claims, sign, signed_id_token, unreachable_keys_verifier, KEY_A_KID, KEY_A_PEM,
    };
    use crate::services::{auth_providers, users};

    async fn count(state: &AppState, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&state.db)
            .await
            .unwrap();
        n
    }

    // ========================================================================
    // Password flow
    // ========================================================================

    #[tokio::test]
    async fn test_register_then_login_then_me() {
        let state = test_state().await;
        let app = build_router(state.clone());

        let registered = send(
            &app,
            json_request(
                "POST",
                "/api/auth/register",
                json!({ "email": "A@X.com", "password": "pw1", "name": "Ada" }),
                None,
            ),
        )
        .await;
        assert_eq!(registered.status, StatusCode::CREATED);
        assert_eq!(registered.set_cookie("session_token"), None);
        let user = registered.json();
        assert_eq!(user["email"], "a@x.com");
        assert_eq!(user["name"], "Ada");
        assert_eq!(user["role"], "user");

        let login = send(
            &app,
            json_request(
                "POST",
                "/api/auth/login",
                json!({ "email": "a@x.com", "password": "pw1" }),
                None,
            ),
        )
        .await;
        assert_eq!(login.status, StatusCode::OK);
        assert_eq!(login.json(), json!({ "ok": true, "user_id": user["id"] }));
        let token = login.set_cookie("session_token").unwrap();
        assert!(!token.is_empty());

        let me = send(
            &app,
            get_request("/api/auth/me", Some(&format!("session_token={}", token))),
        )
        .await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(
            me.json(),
            json!({ "id": user["id"], "email": "a@x.com", "name": "Ada", "role": "user" })
        );
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let state = test_state().await;
        let app = build_router(state.clone());
        let body = json!({ "email": "a@x.com", "password": "pw1" });

        let first = send(&app, json_request("POST", "/api/auth/register", body.clone(), None)).await;
        assert_eq!(first.status, StatusCode::CREATED);

        let second = send(&app, json_request("POST", "/api/auth/register", body, None)).await;
        assert_eq!(second.status, StatusCode::CONFLICT);
        assert_eq!(second.json()["error"], "email already registered");

        assert_eq!(count(&state, "users").await, 1);
        assert_eq!(count(&state, "user_auth_providers").await, 1);
    }

    #[tokio::test]
    async fn test_register_requires_fields() {
        let app = build_router(test_state().await);

        let missing = send(
            &app,
            json_request("POST", "/api/auth/register", json!({ "email": "a@x.com" }), None),
        )
        .await;
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);

        let malformed = send(
            &app,
            json_request(
                "POST",
                "/api/auth/register",
                json!({ "email": "not-an-email", "password": "pw" }),
                None,
            ),
        )
        .await;
        assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let state = test_state().await;
        let app = build_router(state.clone());

        send(
            &app,
            json_request(
                "POST",
                "/api/auth/register",
                json!({ "email": "a@x.com", "password": "right" }),
                None,
            ),
        )
        .await;
        users::create_password_user(&state.db, "broken@x.com", None, Role::User, "garbage")
            .await
            .unwrap();
        users::create_oauth_user(&state.db, "g@x.com", None, GOOGLE_PROVIDER, "sub-1")
            .await
            .unwrap();

        let attempts = [
            json!({ "email": "a@x.com", "password": "wrong" }),
            json!({ "email": "nobody@x.com", "password": "whatever" }),
            json!({ "email": "broken@x.com", "password": "whatever" }),
            json!({ "email": "g@x.com", "password": "whatever" }),
        ];

        let mut bodies = Vec::new();
        for attempt in attempts {
            let response = send(&app, json_request("POST", "/api/auth/login", attempt, None)).await;
            assert_eq!(response.status, StatusCode::UNAUTHORIZED);
            assert_eq!(response.set_cookie("session_token"), None);
            bodies.push(response.body);
        }
        assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(count(&state, "sessions").await, 0);
    }

    #[tokio::test]
    async fn test_login_requires_fields() {
        let app = build_router(test_state().await);
        let response = send(
            &app,
            json_request("POST", "/api/auth/login", json!({ "password": "pw" }), None),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_json_400() {
        let app = build_router(test_state().await);

        let cases = [
            ("/api/auth/login", r#"{"email": 5, "password": "x"}"#),
            ("/api/auth/login", "not json"),
            ("/api/auth/register", r#"{"email": "a@x.com", "password": ["pw"]}"#),
            ("/api/auth/google", r#"{"id_token": 7}"#),
        ];

        for (uri, body) in cases {
            let response = send(&app, raw_json_request(uri, body)).await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "{} {}", uri, body);
            assert_eq!(
                response.json(),
                json!({ "error": "invalid_body", "code": "BAD_REQUEST" })
            );
        }
    }

    #[tokio::test]
    async fn test_whitespace_password_is_checked_not_missing() {
        let app = build_router(test_state().await);

        let registered = send(
            &app,
            json_request(
                "POST",
                "/api/auth/register",
                json!({ "email": "a@x.com", "password": "pw1" }),
                None,
            ),
        )
        .await;
        assert_eq!(registered.status, StatusCode::CREATED);

        let response = send(
            &app,
            json_request(
                "POST",
                "/api/auth/login",
                json!({ "email": "a@x.com", "password": "   " }),
                None,
            ),
        )
        .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.json()["error"], "invalid_credentials");
        assert_eq!(response.set_cookie(cookies::SESSION_COOKIE), None);
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    #[tokio::test]
    async fn test_me_without_cookie_or_with_stale_cookie() {
        let app = build_router(test_state().await);

        let anonymous = send(&app, get_request("/api/auth/me", None)).await;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
        assert_eq!(anonymous.json()["error"], "not_authenticated");

        let stale = send(&app, get_request("/api/auth/me", Some("session_token=bogus"))).await;
        assert_eq!(stale.status, StatusCode::UNAUTHORIZED);
        assert_eq!(stale.json()["error"], "invalid_session");
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let state = test_state().await;
        let app = build_router(state.clone());
        let (_, cookie) = signed_in(&state, "a@x.com", Role::User).await;

        let logout = send(&app, json_request("POST", "/api/auth/logout", json!({}), Some(&cookie))).await;
        assert_eq!(logout.status, StatusCode::OK);
        assert_eq!(logout.json(), json!({ "ok": true }));
        assert_eq!(logout.set_cookie("session_token").as_deref(), Some(""));

        let me = send(&app, get_request("/api/auth/me", Some(&cookie))).await;
        assert_eq!(me.status, StatusCode::UNAUTHORIZED);
        assert_eq!(me.json()["error"], "invalid_session");

        // Repeat logout and logout without a cookie both succeed
        let again = send(&app, json_request("POST", "/api/auth/logout", json!({}), Some(&cookie))).await;
        assert_eq!(again.status, StatusCode::OK);
        let anonymous = send(&app, json_request("POST", "/api/auth/logout", json!({}), None)).await;
        assert_eq!(anonymous.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_me_for_vanished_user() {
        let state = test_state().await;
        let app = build_router(state.clone());
        let (user, cookie) = signed_in(&state, "a@x.com", Role::User).await;

        sqlx::query("PRAGMA foreign_keys = OFF").execute(&state.db).await.unwrap();
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(&user.id)
            .execute(&state.db)
            .await
            .unwrap();

        let me = send(&app, get_request("/api/auth/me", Some(&cookie))).await;
        assert_eq!(me.status, StatusCode::NOT_FOUND);
        assert_eq!(me.json()["error"], "user_not_found");
    }

    // ========================================================================
    // Google code flow
    // ========================================================================

    #[tokio::test]
    async fn test_google_start_sets_state_and_redirects() {
        let app = build_router(test_state().await);
        let response = send(&app, get_request("/api/auth/google/start", None)).await;

        assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
        let location = response.location().unwrap();
        assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(location.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fapi%2Fauth%2Fgoogle%2Fcallback"));

        let oauth_state = response.set_cookie("oauth_state").unwrap();
        assert!(!oauth_state.is_empty());
        assert!(location.contains(&format!("state={}", oauth_state)));
    }

    #[tokio::test]
    async fn test_callback_rejects_bad_state_without_calling_google() {
        use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id_token": "x" })))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = test_config();
        config.google.token_endpoint = format!("{}/token", server.uri());
        let app = build_router(test_state_with(config).await);

        let mismatched = send(
            &app,
            get_request(
                "/api/auth/google/callback?code=abc&state=attacker",
                Some("oauth_state=expected"),
            ),
        )
        .await;
        assert_eq!(mismatched.status, StatusCode::BAD_REQUEST);
        assert_eq!(mismatched.json()["error"], "invalid_state");
        assert_eq!(mismatched.set_cookie("oauth_state").as_deref(), Some(""));

        let no_cookie = send(
            &app,
            get_request("/api/auth/google/callback?code=abc&state=expected", None),
        )
        .await;
        assert_eq!(no_cookie.status, StatusCode::BAD_REQUEST);
        assert_eq!(no_cookie.json()["error"], "invalid_state");

        let no_code = send(
            &app,
            get_request("/api/auth/google/callback?state=expected", Some("oauth_state=expected")),
        )
        .await;
        assert_eq!(no_code.status, StatusCode::BAD_REQUEST);
        assert_eq!(no_code.json()["error"], "missing_code");
        assert_eq!(no_code.set_cookie("oauth_state").as_deref(), Some(""));

        server.verify().await;
    }

    #[tokio::test]
    async fn test_callback_signs_in_and_redirects_to_dashboard() {
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=good-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id_token": signed_id_token("google-sub-1", Some("new@x.com")),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config();
        config.google.token_endpoint = format!("{}/token", server.uri());
        let state = test_state_with(config).await;
        let app = build_router(state.clone());

        let response = send(
            &app,
            get_request(
                "/api/auth/google/callback?code=good-code&state=s1",
                Some("oauth_state=s1"),
            ),
        )
        .await;

        assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.location(), Some("/dashboard"));
        assert_eq!(response.set_cookie("oauth_state").as_deref(), Some(""));
        let token = response.set_cookie("session_token").unwrap();

        let session = state.sessions.get_by_token(&token).await.unwrap().unwrap();
        let user = users::find_user_by_id(&state.db, &session.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.email, "new@x.com");
        assert_eq!(user.name.as_deref(), Some("Test User"));
    }

    #[tokio::test]
    async fn test_callback_token_exchange_failure() {
        use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let mut config = test_config();
        config.google.token_endpoint = format!("{}/token", server.uri());
        let app = build_router(test_state_with(config).await);

        let response = send(
            &app,
            get_request("/api/auth/google/callback?code=c&state=s", Some("oauth_state=s")),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["error"], "token_exchange_failed");
        assert_eq!(response.set_cookie("oauth_state").as_deref(), Some(""));
    }

    // ========================================================================
    // Google ID-token flow
    // ========================================================================

    #[tokio::test]
    async fn test_google_token_creates_then_reuses_user() {
        let state = test_state().await;
        let app = build_router(state.clone());
        let body = json!({ "id_token": signed_id_token("sub-42", Some("g@x.com")) });

        let first = send(&app, json_request("POST", "/api/auth/google", body.clone(), None)).await;
        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(first.json()["ok"], true);
        assert!(first.set_cookie("session_token").is_some());
        let user_id = first.json()["user_id"].as_str().unwrap().to_string();

        let second = send(&app, json_request("POST", "/api/auth/google", body, None)).await;
        assert_eq!(second.json()["user_id"], user_id.as_str());

        assert_eq!(count(&state, "users").await, 1);
        assert_eq!(count(&state, "user_auth_providers").await, 1);
        assert_eq!(count(&state, "sessions").await, 2);
    }

    #[tokio::test]
    async fn test_google_token_links_existing_account_by_email() {
        let state = test_state().await;
        let app = build_router(state.clone());
        let existing = users::create_password_user(&state.db, "a@x.com", None, Role::User, "{}")
            .await
            .unwrap();

        let body = json!({ "id_token": signed_id_token("sub-7", Some("A@x.com")) });
        let response = send(&app, json_request("POST", "/api/auth/google", body, None)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["user_id"], existing.id.as_str());

        let bindings = auth_providers::test_support::list_auth_providers_for_user(&state.db, &existing.id)
            .await
            .unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(count(&state, "users").await, 1);
    }

    #[tokio::test]
    async fn test_google_token_without_email_uses_placeholder() {
        let state = test_state().await;
        let app = build_router(state.clone());

        let body = json!({ "id_token": signed_id_token("sub-noemail", None) });
        let response = send(&app, json_request("POST", "/api/auth/google", body, None)).await;
        assert_eq!(response.status, StatusCode::OK);

        let user = users::find_user_by_email(&state.db, "sub-noemail@users.google.local")
            .await
            .unwrap();
        assert!(user.is_some());
    }

    #[tokio::test]
    async fn test_google_token_rejections() {
        let app = build_router(test_state().await);

        let missing = send(&app, json_request("POST", "/api/auth/google", json!({}), None)).await;
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
        assert_eq!(missing.json()["error"], "id_token required");

        let mut wrong_audience = claims("sub-1", Some("a@x.com"));
        wrong_audience["aud"] = "someone-else".into();
        let token = sign(&wrong_audience, KEY_A_PEM, Some(KEY_A_KID));
        let rejected = send(
            &app,
            json_request("POST", "/api/auth/google", json!({ "id_token": token }), None),
        )
        .await;
        assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);
        assert_eq!(rejected.json()["error"], "invalid_token");
        assert_eq!(rejected.set_cookie("session_token"), None);
    }

    #[tokio::test]
    async fn test_google_token_key_outage_is_internal_error() {
        let state = test_state_with_verifier(unreachable_keys_verifier()).await;
        let app = build_router(state.clone());

        let body = json!({ "id_token": signed_id_token("sub-1", Some("a@x.com")) });
        let response = send(&app, json_request("POST", "/api/auth/google", body, None)).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.json()["error"], "internal_error");
        assert_eq!(response.set_cookie(cookies::SESSION_COOKIE), None);
        assert_eq!(count(&state, "users").await, 0);
    }

    // ========================================================================
    // Request gate
    // ========================================================================

    /// Router exposing what the gate attached to the request.
    fn echo_router(state: Arc<AppState>) -> Router {
        async fn echo(headers: HeaderMap, context: Option<AuthContext>) -> Json<serde_json::Value> {
            Json(json!({
                "x_user_id": headers.get("x-user-id").and_then(|v| v.to_str().ok()),
                "user_id": context.map(|c| c.user_id),
            }))
        }

        Router::new()
            .route("/api/echo", get(echo))
            .route("/products/echo", get(echo))
            .route("/dashboard", get(echo))
            .layer(middleware::from_fn(request_gate))
            .layer(Extension(state))
    }

    #[tokio::test]
    async fn test_gate_redirects_protected_paths_without_cookie() {
        let app = build_router(test_state().await);

        for path in ["/dashboard", "/admin/users", "/api/admin/users", "/api/orders"] {
            let response = send(&app, get_request(path, None)).await;
            assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT, "{}", path);
            assert_eq!(response.location(), Some("/login"), "{}", path);
        }

        let health = send(&app, get_request("/health", None)).await;
        assert_eq!(health.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_gate_clears_invalid_cookie() {
        let app = build_router(test_state().await);
        let response = send(&app, get_request("/dashboard", Some("session_token=expired"))).await;

        assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.location(), Some("/login"));
        assert_eq!(response.set_cookie("session_token").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_gate_attaches_identity_and_strips_forged_header() {
        let state = test_state().await;
        let (user, cookie) = signed_in(&state, "a@x.com", Role::User).await;
        let app = echo_router(state);

        let mut request = get_request("/api/echo", Some(&cookie));
        request
            .headers_mut()
            .insert("x-user-id", "U_someone_else".parse().unwrap());
        let api = send(&app, request).await;
        assert_eq!(api.status, StatusCode::OK);
        assert_eq!(
            api.json(),
            json!({ "x_user_id": user.id, "user_id": user.id })
        );

        // UI paths get the typed context but no header
        let ui = send(&app, get_request("/dashboard", Some(&cookie))).await;
        assert_eq!(ui.json(), json!({ "x_user_id": null, "user_id": user.id }));

        // Anonymous public page: forged header removed, no context
        let mut anonymous = get_request("/products/echo", None);
        anonymous
            .headers_mut()
            .insert("x-user-id", "U_forged".parse().unwrap());
        let public = send(&app, anonymous).await;
        assert_eq!(public.status, StatusCode::OK);
        assert_eq!(public.json(), json!({ "x_user_id": null, "user_id": null }));
    }
}
