use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a new user. `Conflict` when the username is already taken
    /// (uniqueness is the store's job, not the caller's).
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn find_user(&self, username: &str) -> RepoResult<Option<User>>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    /// All users, newest registration first.
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    async fn set_banned(&self, id: Id, banned: bool) -> RepoResult<()>;
    /// Delete the user and every message they authored (two-step cascade).
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    /// Store a message with a server-assigned id and timestamp.
    async fn create_message(&self, new: NewMessage) -> RepoResult<Message>;
    /// The `limit` most recent messages, newest first. Callers that need
    /// chronological order reverse the result themselves.
    async fn recent_messages(&self, limit: i64) -> RepoResult<Vec<Message>>;
    async fn delete_all_messages(&self) -> RepoResult<()>;
}

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn get_setting(&self, key: &str) -> RepoResult<Option<String>>;
    /// Upsert semantics: one row per key.
    async fn set_setting(&self, key: &str, value: &str) -> RepoResult<()>;
}

pub trait Repo: UserRepo + MessageRepo + SettingsRepo {}

impl<T> Repo for T where T: UserRepo + MessageRepo + SettingsRepo {}

pub const MAX_IMAGE_SIZE_KEY: &str = "max_image_size";
pub const DEFAULT_MAX_IMAGE_SIZE: u64 = 1024 * 1024; // 1 MiB
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Seed the default admin account and the default image-size cap.
/// Idempotent; safe to run on every startup.
pub async fn seed_defaults(repo: &dyn Repo, admin_password: &str) -> RepoResult<()> {
    if repo.get_setting(MAX_IMAGE_SIZE_KEY).await?.is_none() {
        repo.set_setting(MAX_IMAGE_SIZE_KEY, &DEFAULT_MAX_IMAGE_SIZE.to_string())
            .await?;
    }
    if repo.find_user(DEFAULT_ADMIN_USERNAME).await?.is_none() {
        let hash = crate::auth::hash_password(admin_password)
            .map_err(|e| RepoError::Internal(e.to_string()))?;
        match repo
            .create_user(NewUser {
                username: DEFAULT_ADMIN_USERNAME.into(),
                password_hash: hash,
                email: None,
                is_admin: true,
            })
            .await
        {
            Ok(_) => {}
            // lost the race against a concurrent boot; the account exists
            Err(RepoError::Conflict) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        messages: HashMap<Id, Message>,
        settings: HashMap<String, String>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("PARLOR_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!(
                            "[inmem] Failed to parse snapshot '{}': {e}. Starting empty.",
                            path.display()
                        );
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    eprintln!("[inmem] Failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                username: new.username,
                password_hash: new.password_hash,
                email: new.email,
                created_at: Utc::now(),
                is_banned: false,
                is_admin: new.is_admin,
            };
            s.users.insert(id, user.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(user)
        }

        async fn find_user(&self, username: &str) -> RepoResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().find(|u| u.username == username).cloned())
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_users(&self) -> RepoResult<Vec<User>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.users.values().cloned().collect();
            v.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            Ok(v)
        }

        async fn set_banned(&self, id: Id, banned: bool) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            user.is_banned = banned;
            drop(s);
            self.persist();
            Ok(())
        }

        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if s.users.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            s.messages.retain(|_, m| m.user_id != Some(id));
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl MessageRepo for InMemRepo {
        async fn create_message(&self, new: NewMessage) -> RepoResult<Message> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let message = Message {
                id,
                user_id: Some(new.user_id),
                username: new.username,
                message_type: new.message_type,
                content: new.content,
                image_data: new.image_data,
                url: new.url,
                timestamp: Utc::now(),
            };
            s.messages.insert(id, message.clone());
            drop(s);
            self.persist();
            Ok(message)
        }

        async fn recent_messages(&self, limit: i64) -> RepoResult<Vec<Message>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.messages.values().cloned().collect();
            v.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
            v.truncate(limit.max(0) as usize);
            Ok(v)
        }

        async fn delete_all_messages(&self) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.messages.clear();
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl SettingsRepo for InMemRepo {
        async fn get_setting(&self, key: &str) -> RepoResult<Option<String>> {
            let s = self.state.read().unwrap();
            Ok(s.settings.get(key).cloned())
        }

        async fn set_setting(&self, key: &str, value: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.settings.insert(key.to_string(), value.to_string());
            drop(s);
            self.persist();
            Ok(())
        }
    }
}

// SQLite implementation (feature = "sqlite-store")
#[cfg(feature = "sqlite-store")]
pub mod sqlite {
    use super::*;
    use chrono::Utc;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
    use std::str::FromStr;

    const SCHEMA: &str = r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            email TEXT,
            created_at TEXT NOT NULL,
            is_banned INTEGER NOT NULL DEFAULT 0,
            is_admin INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            username TEXT NOT NULL,
            message_type TEXT NOT NULL,
            content TEXT,
            image_data TEXT,
            url TEXT,
            timestamp TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        );
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
    "#;

    fn map_db_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
            other => RepoError::Internal(other.to_string()),
        }
    }

    #[derive(Clone)]
    pub struct SqliteRepo {
        pool: SqlitePool,
    }

    impl SqliteRepo {
        pub fn new(pool: SqlitePool) -> Self {
            Self { pool }
        }

        /// Open (creating the file if needed) and apply the schema.
        pub async fn connect(url: &str) -> anyhow::Result<Self> {
            let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(opts)
                .await?;
            let repo = Self { pool };
            repo.init_schema().await?;
            Ok(repo)
        }

        pub async fn init_schema(&self) -> anyhow::Result<()> {
            for stmt in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
            Ok(())
        }
    }

    const USER_COLUMNS: &str = "id, username, password_hash, email, created_at, is_banned, is_admin";
    const MESSAGE_COLUMNS: &str =
        "id, user_id, username, message_type, content, image_data, url, timestamp";

    #[async_trait]
    impl UserRepo for SqliteRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let rec = sqlx::query_as::<_, User>(&format!(
                "INSERT INTO users (username, password_hash, email, created_at, is_banned, is_admin) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5) RETURNING {USER_COLUMNS}"
            ))
            .bind(&new.username)
            .bind(&new.password_hash)
            .bind(&new.email)
            .bind(Utc::now())
            .bind(new.is_admin)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(rec)
        }

        async fn find_user(&self, username: &str) -> RepoResult<Option<User>> {
            sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE username = ?1"
            ))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_err)
        }

        async fn list_users(&self) -> RepoResult<Vec<User>> {
            sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn set_banned(&self, id: Id, banned: bool) -> RepoResult<()> {
            let res = sqlx::query("UPDATE users SET is_banned = ?2 WHERE id = ?1")
                .bind(id)
                .bind(banned)
                .execute(&self.pool)
                .await
                .map_err(map_db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            // messages first, then the user, in one transaction so a partial
            // failure cannot strand orphaned rows
            let mut tx = self.pool.begin().await.map_err(map_db_err)?;
            sqlx::query("DELETE FROM messages WHERE user_id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;
            let res = sqlx::query("DELETE FROM users WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            tx.commit().await.map_err(map_db_err)?;
            Ok(())
        }
    }

    #[async_trait]
    impl MessageRepo for SqliteRepo {
        async fn create_message(&self, new: NewMessage) -> RepoResult<Message> {
            let rec = sqlx::query_as::<_, Message>(&format!(
                "INSERT INTO messages (user_id, username, message_type, content, image_data, url, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING {MESSAGE_COLUMNS}"
            ))
            .bind(new.user_id)
            .bind(&new.username)
            .bind(new.message_type)
            .bind(&new.content)
            .bind(&new.image_data)
            .bind(&new.url)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(rec)
        }

        async fn recent_messages(&self, limit: i64) -> RepoResult<Vec<Message>> {
            sqlx::query_as::<_, Message>(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY timestamp DESC, id DESC LIMIT ?1"
            ))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn delete_all_messages(&self) -> RepoResult<()> {
            sqlx::query("DELETE FROM messages")
                .execute(&self.pool)
                .await
                .map_err(map_db_err)?;
            Ok(())
        }
    }

    #[async_trait]
    impl SettingsRepo for SqliteRepo {
        async fn get_setting(&self, key: &str) -> RepoResult<Option<String>> {
            let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?;
            Ok(row.map(|(v,)| v))
        }

        async fn set_setting(&self, key: &str, value: &str) -> RepoResult<()> {
            sqlx::query(
                "INSERT INTO settings (key, value) VALUES (?1, ?2) \
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
            Ok(())
        }
    }
}
