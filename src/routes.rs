use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpResponse};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::TryStreamExt as _;
use serde_json::json;

use crate::auth::{Auth, SessionStore, SESSION_COOKIE};
use crate::error::ApiError;
use crate::models::*;
use crate::repo::{Repo, RepoError, DEFAULT_MAX_IMAGE_SIZE, MAX_IMAGE_SIZE_KEY};
use crate::require_admin;

/// Fixed recent-window for the polled feed.
pub const FEED_LIMIT: i64 = 50;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::resource("/register").route(web::post().to(register)))
            .service(web::resource("/login").route(web::post().to(login)))
            .service(web::resource("/logout").route(web::post().to(logout)))
            .service(web::resource("/check_login").route(web::get().to(check_login)))
            .service(web::resource("/send_message").route(web::post().to(send_message)))
            .service(web::resource("/messages").route(web::get().to(get_messages)))
            .service(web::resource("/admin/settings").route(web::get().to(admin_settings)))
            .service(
                web::resource("/admin/update_settings")
                    .route(web::post().to(admin_update_settings)),
            )
            .service(web::resource("/admin/users").route(web::get().to(admin_users)))
            .service(web::resource("/admin/toggle_ban").route(web::post().to(admin_toggle_ban)))
            .service(web::resource("/admin/delete_user").route(web::post().to(admin_delete_user)))
            .service(
                web::resource("/admin/delete_all_messages")
                    .route(web::post().to(admin_delete_all_messages)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
}

// ---------------- Auth endpoints ----------------------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created"),
        (status = 400, description = "Missing username or password"),
        (status = 409, description = "Username already exists")
    )
)]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let username = payload.username.trim().to_string();
    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::InvalidInput(
            "username and password are required".into(),
        ));
    }
    let email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from);
    let password_hash = crate::auth::hash_password(&payload.password).map_err(|e| {
        log::error!("password hashing failed: {e}");
        ApiError::Storage
    })?;
    match data
        .repo
        .create_user(NewUser {
            username,
            password_hash,
            email,
            is_admin: false,
        })
        .await
    {
        Ok(_) => Ok(HttpResponse::Ok().json(json!({ "success": true }))),
        Err(RepoError::Conflict) => Err(ApiError::DuplicateUsername),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session established (cookie set)"),
        (status = 401, description = "Invalid username or password"),
        (status = 403, description = "Account banned")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::InvalidInput(
            "username and password are required".into(),
        ));
    }
    let user = match data.repo.find_user(username).await? {
        Some(u) if crate::auth::verify_password(&payload.password, &u.password_hash) => u,
        _ => return Err(ApiError::InvalidCredentials),
    };
    if user.is_banned {
        return Err(ApiError::AccountBanned);
    }
    let session = sessions.issue(user.id, &user.username, user.is_admin);
    let cookie = Cookie::build(SESSION_COOKIE, session.token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    Ok(HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({ "success": true, "is_admin": user.is_admin })))
}

#[utoipa::path(
    post,
    path = "/api/logout",
    responses((status = 200, description = "Session destroyed (always succeeds)"))
)]
pub async fn logout(
    auth: Option<Auth>,
    sessions: web::Data<SessionStore>,
) -> Result<HttpResponse, ApiError> {
    if let Some(Auth(session)) = auth {
        sessions.revoke(&session.token);
    }
    let mut removal = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    removal.make_removal();
    Ok(HttpResponse::Ok()
        .cookie(removal)
        .json(json!({ "success": true })))
}

#[utoipa::path(
    get,
    path = "/api/check_login",
    responses((status = 200, description = "Current session state"))
)]
pub async fn check_login(auth: Option<Auth>) -> Result<HttpResponse, ApiError> {
    let body = match auth {
        Some(Auth(session)) => json!({
            "logged_in": true,
            "username": session.username,
            "is_admin": session.is_admin,
        }),
        None => json!({ "logged_in": false }),
    };
    Ok(HttpResponse::Ok().json(body))
}

// ---------------- Message feed ------------------------------------

async fn max_image_size(data: &AppState) -> Result<u64, ApiError> {
    // read fresh per validation; admin updates apply to the next post
    Ok(data
        .repo
        .get_setting(MAX_IMAGE_SIZE_KEY)
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_IMAGE_SIZE))
}

async fn read_text_field(mut field: actix_multipart::Field) -> Result<String, ApiError> {
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| {
        log::error!("multipart read error: {e}");
        ApiError::InvalidInput("malformed form data".into())
    })? {
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes)
        .map_err(|_| ApiError::InvalidInput("form field is not valid UTF-8".into()))
}

#[utoipa::path(
    post,
    path = "/api/send_message",
    responses(
        (status = 200, description = "Message stored"),
        (status = 400, description = "Missing content for the message type"),
        (status = 401, description = "Not logged in"),
        (status = 413, description = "Image exceeds the configured size cap")
    )
)]
pub async fn send_message(
    auth: Auth,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let limit = max_image_size(&data).await?;

    let mut message_type_raw: Option<String> = None;
    let mut content: Option<String> = None;
    let mut url: Option<String> = None;
    let mut image_bytes: Option<Vec<u8>> = None;

    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::InvalidInput("malformed form data".into())
    })? {
        let name = match field.content_disposition().get_name() {
            Some(n) => n.to_string(),
            None => continue,
        };
        match name.as_str() {
            "image" => {
                let mut bytes: Vec<u8> = Vec::new();
                let mut field_stream = field;
                while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
                    log::error!("multipart read error: {e}");
                    ApiError::InvalidInput("malformed form data".into())
                })? {
                    // enforced while streaming: exactly `limit` bytes pass,
                    // one byte over fails
                    if (bytes.len() + chunk.len()) as u64 > limit {
                        return Err(ApiError::PayloadTooLarge { limit });
                    }
                    bytes.extend_from_slice(&chunk);
                }
                if !bytes.is_empty() {
                    image_bytes = Some(bytes);
                }
            }
            "message_type" => message_type_raw = Some(read_text_field(field).await?),
            "content" => content = Some(read_text_field(field).await?),
            "url" => url = Some(read_text_field(field).await?),
            _ => continue,
        }
    }

    let message_type = MessageType::parse(message_type_raw.as_deref().unwrap_or(""))
        .ok_or(ApiError::InvalidMessageType)?;
    let content = content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());

    match message_type {
        MessageType::Text => {
            if content.is_none() {
                return Err(ApiError::InvalidInput("message content required".into()));
            }
        }
        MessageType::Image => {
            if image_bytes.is_none() {
                return Err(ApiError::InvalidInput("image required".into()));
            }
        }
        MessageType::TextImage => {
            if content.is_none() && image_bytes.is_none() {
                return Err(ApiError::InvalidInput("text or image required".into()));
            }
        }
        MessageType::Url => {
            if url.is_none() {
                return Err(ApiError::InvalidInput("url required".into()));
            }
        }
    }

    let image_data = image_bytes.map(|b| BASE64.encode(b));
    data.repo
        .create_message(NewMessage {
            user_id: auth.0.user_id,
            username: auth.0.username.clone(),
            message_type,
            content,
            image_data,
            url,
        })
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[utoipa::path(
    get,
    path = "/api/messages",
    responses(
        (status = 200, description = "Recent messages oldest to newest (empty list when anonymous)", body = [MessageView])
    )
)]
pub async fn get_messages(
    auth: Option<Auth>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    if auth.is_none() {
        // the feed is session-gated, but anonymity is not an error
        return Ok(HttpResponse::Ok().json(json!({ "messages": [] })));
    }
    let mut messages = data.repo.recent_messages(FEED_LIMIT).await?;
    // fetched newest-first; clients render oldest to newest
    messages.reverse();
    let views: Vec<MessageView> = messages.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(json!({ "messages": views })))
}

// ---------------- Admin endpoints ---------------------------------

#[utoipa::path(
    get,
    path = "/api/admin/settings",
    responses(
        (status = 200, description = "Current image-size cap"),
        (status = 403, description = "Forbidden - admins only")
    )
)]
pub async fn admin_settings(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_admin!(auth);
    let max = max_image_size(&data).await?;
    Ok(HttpResponse::Ok().json(json!({ "max_image_size": max })))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct UpdateSettingsRequest {
    pub max_image_size: u64,
}

#[utoipa::path(
    post,
    path = "/api/admin/update_settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Cap updated; applies to the next post"),
        (status = 400, description = "Invalid size"),
        (status = 403, description = "Forbidden - admins only")
    )
)]
pub async fn admin_update_settings(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateSettingsRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin!(auth);
    if payload.max_image_size == 0 {
        return Err(ApiError::InvalidInput(
            "max_image_size must be positive".into(),
        ));
    }
    data.repo
        .set_setting(MAX_IMAGE_SIZE_KEY, &payload.max_image_size.to_string())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "All users, newest first", body = [UserView]),
        (status = 403, description = "Forbidden - admins only")
    )
)]
pub async fn admin_users(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_admin!(auth);
    let users: Vec<UserView> = data
        .repo
        .list_users()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(HttpResponse::Ok().json(json!({ "users": users })))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct ToggleBanRequest {
    pub user_id: Id,
    pub ban: bool,
}

#[utoipa::path(
    post,
    path = "/api/admin/toggle_ban",
    request_body = ToggleBanRequest,
    responses(
        (status = 200, description = "Ban flag updated; banning revokes live sessions"),
        (status = 403, description = "Forbidden - admins only"),
        (status = 404, description = "No such user")
    )
)]
pub async fn admin_toggle_ban(
    auth: Auth,
    data: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    payload: web::Json<ToggleBanRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin!(auth);
    data.repo.set_banned(payload.user_id, payload.ban).await?;
    if payload.ban {
        // a ban takes effect immediately, not at next login
        sessions.revoke_user(payload.user_id);
    }
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct DeleteUserRequest {
    pub user_id: Id,
}

#[utoipa::path(
    post,
    path = "/api/admin/delete_user",
    request_body = DeleteUserRequest,
    responses(
        (status = 200, description = "User and their messages deleted"),
        (status = 400, description = "Cannot delete own account"),
        (status = 403, description = "Forbidden - admins only"),
        (status = 404, description = "No such user")
    )
)]
pub async fn admin_delete_user(
    auth: Auth,
    data: web::Data<AppState>,
    sessions: web::Data<SessionStore>,
    payload: web::Json<DeleteUserRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin!(auth);
    if payload.user_id == auth.0.user_id {
        return Err(ApiError::SelfDeleteForbidden);
    }
    data.repo.delete_user(payload.user_id).await?;
    sessions.revoke_user(payload.user_id);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[utoipa::path(
    post,
    path = "/api/admin/delete_all_messages",
    responses(
        (status = 200, description = "Message store emptied"),
        (status = 403, description = "Forbidden - admins only")
    )
)]
pub async fn admin_delete_all_messages(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_admin!(auth);
    data.repo.delete_all_messages().await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
