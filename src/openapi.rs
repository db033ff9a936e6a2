use crate::models::{MessageType, MessageView, UserView};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::login,
        crate::routes::logout,
        crate::routes::check_login,
        crate::routes::send_message,
        crate::routes::get_messages,
        crate::routes::admin_settings,
        crate::routes::admin_update_settings,
        crate::routes::admin_users,
        crate::routes::admin_toggle_ban,
        crate::routes::admin_delete_user,
        crate::routes::admin_delete_all_messages,
    ),
    components(schemas(
        MessageType, MessageView, UserView,
        crate::routes::RegisterRequest, crate::routes::LoginRequest,
        crate::routes::UpdateSettingsRequest, crate::routes::ToggleBanRequest,
        crate::routes::DeleteUserRequest,
    )),
    tags(
        (name = "auth", description = "Registration, login and session state"),
        (name = "messages", description = "The polled message feed"),
        (name = "admin", description = "Admin-only settings and user management"),
    )
)]
pub struct ApiDoc;
