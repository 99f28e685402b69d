// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::comments,
    services::attachments::PUBLIC_PREFIX,
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Public comment reads, authenticated comment writes.
/// * Serves stored attachment files.
/// * Applies global middleware (Trace, CORS, body limit).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:5173"),
        HeaderValue::from_static("http://127.0.0.1:5173"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let public_routes = Router::new()
        .route("/event/{event_id}", get(comments::list_event_comments))
        .route("/{comment_id}/thread", get(comments::get_thread));

    let protected_routes = Router::new()
        .route("/event/{event_id}", post(comments::create_comment))
        .route(
            "/{comment_id}",
            put(comments::update_comment).delete(comments::delete_comment),
        )
        .route(
            "/{comment_id}/attachments/{attachment_id}",
            delete(comments::remove_attachment),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let body_limit = state.config.comments.request_body_limit();

    Router::new()
        .nest("/api/comments", public_routes.merge(protected_routes))
        .nest_service(PUBLIC_PREFIX, ServeDir::new(&state.config.upload_dir))
        // Global Middleware (applied from outside in)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
