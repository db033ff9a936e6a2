use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Tag describing which content fields a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    #[serde(rename = "text+image")]
    #[sqlx(rename = "text+image")]
    TextImage,
    Url,
}

impl MessageType {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "text+image" => Some(Self::TextImage),
            "url" => Some(Self::Url),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::TextImage => "text+image",
            Self::Url => "url",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub password_hash: String, // never serialized to API clients; see UserView
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_banned: bool,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub is_admin: bool,
}

/// Admin-facing projection of a user (no credential material).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub id: Id,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_banned: bool,
    pub is_admin: bool,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        UserView {
            id: u.id,
            username: u.username,
            email: u.email,
            created_at: u.created_at,
            is_banned: u.is_banned,
            is_admin: u.is_admin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Id,
    pub user_id: Option<Id>,
    pub username: String, // snapshot of the poster's name at write time
    pub message_type: MessageType,
    pub content: Option<String>,
    pub image_data: Option<String>, // base64 of the original upload bytes
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub user_id: Id,
    pub username: String,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub image_data: Option<String>,
    pub url: Option<String>,
}

/// Feed item as returned by `/api/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageView {
    pub id: Id,
    pub username: String,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub image_data: Option<String>,
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<Message> for MessageView {
    fn from(m: Message) -> Self {
        MessageView {
            id: m.id,
            username: m.username,
            message_type: m.message_type,
            content: m.content,
            image_data: m.image_data,
            url: m.url,
            timestamp: m.timestamp,
        }
    }
}
