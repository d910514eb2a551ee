//! Challengers Component Tracker server
//!
//! Serves the REST API and runs the notification worker and the background
//! scheduler in the same process.

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use challengers_tracker::{
    api,
    clock::SystemClock,
    config::AppConfig,
    repository::Repository,
    services::{
        email::{EmailTransport, LogMailer, SmtpMailer},
        scheduler, Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("challengers_tracker={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        "Starting Challengers Component Tracker v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Database migrations completed");

    let transport: Arc<dyn EmailTransport> = if config.email.enabled {
        tracing::info!(host = %config.email.smtp_host, "SMTP delivery enabled");
        Arc::new(SmtpMailer::new(&config.email)?)
    } else {
        tracing::warn!("Email delivery disabled, notifications will only be logged");
        Arc::new(LogMailer)
    };

    // Create repository and services
    let repository = Repository::new(pool);
    let (services, worker) = Services::new(
        repository.clone(),
        &config,
        transport,
        Arc::new(SystemClock),
    );

    tokio::spawn(worker.run());
    let _jobs = scheduler::spawn(
        &config.scheduler,
        services.scanner.clone(),
        services.notifications.clone(),
    );

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
        repository,
    };

    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authentication
        .route("/auth/login", post(api::auth::login))
        .route("/auth/me", get(api::auth::me))
        // Components
        .route(
            "/components",
            get(api::components::list_components).post(api::components::create_component),
        )
        .route("/components/overdue", get(api::components::list_overdue))
        .route(
            "/components/code/:code",
            get(api::components::get_component_by_code),
        )
        .route(
            "/components/:id",
            get(api::components::get_component).put(api::components::update_component),
        )
        .route(
            "/components/:id/checkout",
            post(api::components::checkout_component),
        )
        .route("/components/:id/return", post(api::components::return_component))
        .route("/components/:id/history", get(api::components::component_history))
        // Users
        .route("/users", get(api::users::list_users))
        .route("/users/:id", delete(api::users::delete_user))
        .route("/users/:id/preferences", patch(api::users::update_preferences))
        .route("/users/:id/role", patch(api::users::update_role))
        .route("/users/:id/history", get(api::components::user_history))
        .route("/users/:id/borrowed", get(api::components::user_borrowed))
        // Requests
        .route(
            "/requests",
            get(api::requests::list_requests).post(api::requests::create_request),
        )
        .route("/requests/:id", delete(api::requests::cancel_request))
        .route("/requests/:id/approve", patch(api::requests::approve_request))
        .route("/requests/:id/reject", patch(api::requests::reject_request))
        // Dashboard
        .route("/dashboard/stats", get(api::dashboard::get_stats))
        // Notifications and maintenance
        .route("/notifications", get(api::notifications::list_notifications))
        .route("/admin/overdue-scan", post(api::notifications::run_overdue_scan))
        .route(
            "/admin/notifications/retry",
            post(api::notifications::retry_notifications),
        )
        .with_state(state);

    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
