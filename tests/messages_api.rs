#![cfg(feature = "inmem-store")]

use actix_web::cookie::Cookie;
use actix_web::{test, web, App};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parlor::repo::inmem::InMemRepo;
use parlor::repo::{SettingsRepo, MAX_IMAGE_SIZE_KEY};
use parlor::{config, AppState, SessionStore};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

fn fresh_repo() -> InMemRepo {
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

/// Register `name` and log them in, returning the session cookie.
macro_rules! login {
    ($app:expr, $name:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/register")
            .set_json(&json!({"username": $name, "password": "pw"}))
            .to_request();
        assert!(test::call_service(&$app, req).await.status().is_success());
        let req = test::TestRequest::post()
            .uri("/api/login")
            .set_json(&json!({"username": $name, "password": "pw"}))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), 200);
        session_cookie(&resp)
    }};
}

const BOUNDARY: &str = "----parlortestboundary";

fn text_part(body: &mut Vec<u8>, name: &str, value: &str) {
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
            .as_bytes(),
    );
}

/// Build a `/api/send_message` multipart body.
fn message_form(
    message_type: &str,
    content: Option<&str>,
    url: Option<&str>,
    image: Option<&[u8]>,
) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    text_part(&mut body, "message_type", message_type);
    if let Some(c) = content {
        text_part(&mut body, "content", c);
    }
    if let Some(u) = url {
        text_part(&mut body, "url", u);
    }
    if let Some(bytes) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                 filename=\"upload.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

macro_rules! send {
    ($app:expr, $cookie:expr, $form:expr) => {{
        let (ct, body) = $form;
        let req = test::TestRequest::post()
            .uri("/api/send_message")
            .cookie($cookie.clone())
            .insert_header(("Content-Type", ct))
            .set_payload(body)
            .to_request();
        test::call_service(&$app, req).await
    }};
}

#[actix_web::test]
#[serial]
async fn send_requires_a_session() {
    let repo = fresh_repo();
    let sessions = SessionStore::new();
    let app = app!(repo, sessions);

    let (ct, body) = message_form("text", Some("hello"), None, None);
    let req = test::TestRequest::post()
        .uri("/api/send_message")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial]
async fn per_type_validation() {
    let repo = fresh_repo();
    let sessions = SessionStore::new();
    let app = app!(repo, sessions);
    let cookie = login!(app, "alice");

    // text with whitespace-only content fails
    let resp = send!(app, cookie, message_form("text", Some("   "), None, None));
    assert_eq!(resp.status(), 400);

    // text with content passes
    let resp = send!(app, cookie, message_form("text", Some("hello"), None, None));
    assert_eq!(resp.status(), 200);

    // image without an image fails
    let resp = send!(app, cookie, message_form("image", None, None, None));
    assert_eq!(resp.status(), 400);

    // url without a url fails; a caption alone is not enough
    let resp = send!(app, cookie, message_form("url", Some("caption"), None, None));
    assert_eq!(resp.status(), 400);

    // url with a url passes, caption optional
    let resp = send!(
        app,
        cookie,
        message_form("url", None, Some("https://example.com"), None)
    );
    assert_eq!(resp.status(), 200);

    // text+image needs at least one of the two
    let resp = send!(app, cookie, message_form("text+image", None, None, None));
    assert_eq!(resp.status(), 400);
    let resp = send!(
        app,
        cookie,
        message_form("text+image", Some("just text"), None, None)
    );
    assert_eq!(resp.status(), 200);

    // unknown tag
    let resp = send!(app, cookie, message_form("video", Some("x"), None, None));
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(body["message"].as_str().unwrap().contains("message type"));
}

#[actix_web::test]
#[serial]
async fn image_size_cap_is_a_hard_boundary() {
    let repo = fresh_repo();
    let sessions = SessionStore::new();
    let app = app!(repo, sessions);
    let cookie = login!(app, "alice");

    repo.set_setting(MAX_IMAGE_SIZE_KEY, "16").await.unwrap();

    // exactly at the cap: accepted
    let resp = send!(app, cookie, message_form("image", None, None, Some(&[0xAB; 16])));
    assert_eq!(resp.status(), 200);

    // one byte over: rejected, and the limit is named in the message
    let resp = send!(app, cookie, message_form("image", None, None, Some(&[0xAB; 17])));
    assert_eq!(resp.status(), 413);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("16"));
}

#[actix_web::test]
#[serial]
async fn posted_image_bytes_round_trip() {
    let repo = fresh_repo();
    let sessions = SessionStore::new();
    let app = app!(repo, sessions);
    let cookie = login!(app, "alice");

    let original: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
    let resp = send!(app, cookie, message_form("image", None, None, Some(&original)));
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/messages")
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["username"], "alice");
    assert_eq!(messages[0]["message_type"], "image");
    let encoded = messages[0]["image_data"].as_str().unwrap();
    assert_eq!(BASE64.decode(encoded).unwrap(), original);
}

#[actix_web::test]
#[serial]
async fn feed_is_session_gated_but_not_an_error() {
    let repo = fresh_repo();
    let sessions = SessionStore::new();
    let app = app!(repo, sessions);
    let cookie = login!(app, "alice");

    let resp = send!(app, cookie, message_form("text", Some("hi"), None, None));
    assert_eq!(resp.status(), 200);

    // anonymous callers get an empty list, not a failure
    let req = test::TestRequest::get().uri("/api/messages").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 0);
}

#[actix_web::test]
#[serial]
async fn feed_returns_newest_fifty_in_chronological_order() {
    let repo = fresh_repo();
    let sessions = SessionStore::new();
    let app = app!(repo, sessions);
    let cookie = login!(app, "alice");

    for i in 0..55 {
        let text = format!("message-{i}");
        let resp = send!(app, cookie, message_form("text", Some(&text), None, None));
        assert_eq!(resp.status(), 200);
    }

    let req = test::TestRequest::get()
        .uri("/api/messages")
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let messages = body["messages"].as_array().unwrap();

    // window of 50, oldest first, covering the most recent posts
    assert_eq!(messages.len(), 50);
    assert_eq!(messages[0]["content"], "message-5");
    assert_eq!(messages[49]["content"], "message-54");
    let timestamps: Vec<chrono::DateTime<chrono::Utc>> = messages
        .iter()
        .map(|m| m["timestamp"].as_str().unwrap().parse().unwrap())
        .collect();
    assert!(
        timestamps.windows(2).all(|w| w[0] <= w[1]),
        "timestamps must be non-decreasing"
    );
}
