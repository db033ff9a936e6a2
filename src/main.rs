use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod error;
mod models;
mod openapi;
mod repo;
mod routes;
mod security;

use auth::SessionStore;
use openapi::ApiDoc;
use routes::{config, AppState};
use security::SecurityHeaders;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment comes from the shell / systemd / Docker; load .env only in
    // debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping chatroom server");

    #[cfg(all(feature = "inmem-store", not(feature = "sqlite-store")))]
    let repo = {
        info!("Using in-memory repository backend");
        repo::inmem::InMemRepo::new()
    };

    #[cfg(feature = "sqlite-store")]
    let repo = {
        let db_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://chatroom.db".to_string());
        info!("Using SQLite repository backend ({db_url})");
        repo::sqlite::SqliteRepo::connect(&db_url)
            .await
            .expect("Failed to open SQLite database")
    };

    let admin_password = std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| {
        warn!("ADMIN_PASSWORD not set; using the stock default for the seeded admin account");
        "admin123".to_string()
    });
    repo::seed_defaults(&repo, &admin_password)
        .await
        .expect("Failed to seed default admin and settings");

    let sessions = SessionStore::new();
    let openapi = ApiDoc::openapi();
    let repo = Arc::new(repo);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local dev frontends
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .app_data(web::Data::new(AppState { repo: repo.clone() }))
            .app_data(web::Data::new(sessions.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(("0.0.0.0", port))?;

    info!("Listening on http://0.0.0.0:{port}");

    server.run().await
}
