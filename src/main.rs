// src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use event_comments::config::Config;
use event_comments::repositories::{PgCommentRepository, PgEventLookup, PgProfileLookup};
use event_comments::routes;
use event_comments::services::{CommentService, attachments::LocalAttachmentStore};
use event_comments::state::AppState;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    let attachment_store = LocalAttachmentStore::new(&config.upload_dir);
    attachment_store
        .ensure_dir()
        .await
        .expect("Failed to create attachment directory");

    let comments = CommentService::new(
        Arc::new(PgCommentRepository::new(
            pool.clone(),
            config.comments.clone(),
        )),
        Arc::new(PgEventLookup::new(pool.clone())),
        Arc::new(PgProfileLookup::new(pool.clone())),
        Arc::new(attachment_store),
        config.comments.clone(),
    );

    // Nothing is uploading yet, so unreferenced files are leftovers.
    match comments.sweep_orphaned_attachments().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!("Removed {} orphaned attachment files", removed),
        Err(e) => tracing::error!("Failed to sweep orphaned attachments: {:?}", e),
    }

    // Create AppState
    let state = AppState {
        config: config.clone(),
        comments,
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listening address");

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}
