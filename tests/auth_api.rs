#![cfg(feature = "inmem-store")]

use actix_web::cookie::Cookie;
use actix_web::{test, web, App};
use parlor::repo::inmem::InMemRepo;
use parlor::repo::UserRepo;
use parlor::{config, AppState, SessionStore};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

fn fresh_repo() -> InMemRepo {
    // isolate snapshot state per test run
    std::env::set_var("PARLOR_DATA_DIR", tempfile::tempdir().unwrap().path());
    InMemRepo::new()
}

fn session_cookie<B>(resp: &actix_web::dev::ServiceResponse<B>) -> Cookie<'static> {
    resp.response()
        .cookies()
        .find(|c| c.name() == "session")
        .expect("login should set a session cookie")
        .into_owned()
}

macro_rules! app {
    ($repo:expr, $sessions:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState {
                    repo: Arc::new($repo.clone()),
                }))
                .app_data(web::Data::new($sessions.clone()))
                .configure(config),
        )
        .await
    };
}

#[actix_web::test]
#[serial]
async fn register_rejects_duplicates_and_empty_input() {
    let repo = fresh_repo();
    let sessions = SessionStore::new();
    let app = app!(repo, sessions);

    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(&json!({"username": "alice", "password": "secret"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["success"], true);

    // same username again
    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(&json!({"username": "alice", "password": "other"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("exists"));

    // empty username / password
    for payload in [
        json!({"username": "   ", "password": "pw"}),
        json!({"username": "bob", "password": ""}),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/register")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }
}

#[actix_web::test]
#[serial]
async fn login_rejects_bad_credentials() {
    let repo = fresh_repo();
    let sessions = SessionStore::new();
    let app = app!(repo, sessions);

    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(&json!({"username": "alice", "password": "secret"}))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    // wrong password
    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(&json!({"username": "alice", "password": "wrong"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["success"], false);

    // unknown user
    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(&json!({"username": "nobody", "password": "secret"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial]
async fn banned_user_cannot_log_in() {
    let repo = fresh_repo();
    let sessions = SessionStore::new();
    let app = app!(repo, sessions);

    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(&json!({"username": "mallory", "password": "secret"}))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let user = repo.find_user("mallory").await.unwrap().unwrap();
    repo.set_banned(user.id, true).await.unwrap();

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(&json!({"username": "mallory", "password": "secret"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(body["message"].as_str().unwrap().contains("banned"));
}

#[actix_web::test]
#[serial]
async fn session_lifecycle_login_check_logout() {
    let repo = fresh_repo();
    let sessions = SessionStore::new();
    let app = app!(repo, sessions);

    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(&json!({"username": "alice", "email": "a@example.com", "password": "secret"}))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    // anonymous check
    let req = test::TestRequest::get().uri("/api/check_login").to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["logged_in"], false);

    // login
    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(&json!({"username": "alice", "password": "secret"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let cookie = session_cookie(&resp);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["is_admin"], false);

    // authenticated check
    let req = test::TestRequest::get()
        .uri("/api/check_login")
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["logged_in"], true);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["is_admin"], false);

    // logout
    let req = test::TestRequest::post()
        .uri("/api/logout")
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // old cookie no longer maps to a session
    let req = test::TestRequest::get()
        .uri("/api/check_login")
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["logged_in"], false);
}

#[actix_web::test]
#[serial]
async fn logout_without_a_session_still_succeeds() {
    let repo = fresh_repo();
    let sessions = SessionStore::new();
    let app = app!(repo, sessions);

    let req = test::TestRequest::post().uri("/api/logout").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["success"], true);
}
