use actix_web::{middleware::Compress, web, App, HttpResponse, HttpServer};
use actix_cors::Cors;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod error;
mod models;
mod openapi;
mod rate_limit;
mod repo;
mod routes;
mod security;
mod session;
mod validate;

use auth::{hash_password, ADMIN_EMAIL, ADMIN_FULL_NAME, ADMIN_PASSWORD, ADMIN_PHONE};
use models::{NewUser, Role};
use openapi::ApiDoc;
use rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
use repo::inmem::InMemRepo;
use repo::UserRepo;
use routes::{config, AppState};
use security::SecurityHeaders;
use session::SessionStore;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

async fn metrics_endpoint(handle: web::Data<PrometheusHandle>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(handle.render())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker, …).
    // Load .env automatically only in debug builds to reduce manual setup.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping agora server");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .expect("Failed to create Pg pool");
        info!("Using Postgres repository backend");
        let repo = repo::pg::PgRepo::new(pool);
        repo.migrate().await.expect("Failed to run migrations");
        repo
    };

    // The single admin account; seeding is idempotent across restarts.
    let admin = repo
        .ensure_admin(NewUser {
            full_name: ADMIN_FULL_NAME.to_string(),
            email: ADMIN_EMAIL.to_string(),
            phone: ADMIN_PHONE.to_string(),
            password: hash_password(ADMIN_PASSWORD),
            role: Role::Admin,
        })
        .await
        .expect("Failed to seed admin account");
    info!("Admin account ensured (email: {})", admin.email);

    let sessions = SessionStore::from_env();
    let rl_enabled = std::env::var("RL_ENABLED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(true);
    let limits = RateLimiterFacade::new(
        InMemoryRateLimiter::new(rl_enabled),
        RateLimitConfig::from_env(),
    );
    info!("Rate limiting enabled: {rl_enabled}");

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local dev frontend ports
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "DELETE", "OPTIONS"])
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
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .route("/metrics", web::get().to(metrics_endpoint))
            .app_data(web::Data::new(prometheus.clone()))
            .app_data(web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                sessions: sessions.clone(),
                limits: limits.clone(),
            }))
    })
    .bind(("0.0.0.0", port))?;

    info!("Listening on http://0.0.0.0:{port}");

    server.run().await
}

/// Fail fast on malformed configuration instead of surprising at runtime.
fn validate_env_vars() {
    use std::env;

    if let Ok(ttl) = env::var("SESSION_TTL_SECS") {
        if ttl.parse::<i64>().is_err() {
            eprintln!("SESSION_TTL_SECS must be an integer number of seconds");
            std::process::exit(1);
        }
    }

    #[cfg(feature = "postgres-store")]
    if env::var("DATABASE_URL").is_err() {
        eprintln!("Missing required environment variable: DATABASE_URL");
        eprintln!("The postgres-store backend cannot start without it");
        std::process::exit(1);
    }
}
