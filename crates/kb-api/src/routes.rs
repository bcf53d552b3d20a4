//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use kb_core::config::KbConfig;
use kb_core::error::{KbError, Result};

use crate::auth::{require_admin, require_auth};
use crate::handlers;
use crate::state::AppState;

/// Body limit for JSON routes.
const JSON_BODY_LIMIT: usize = 1024 * 1024;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.api.allowed_origins);
    let upload_limit = state.config.import.max_upload_bytes;

    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/auth/check", get(handlers::auth_check));

    let user_routes = Router::new()
        .route("/api/auth/me", get(handlers::me))
        .route("/api/documents", get(handlers::list_documents))
        .route("/api/documents/{id}", get(handlers::get_document))
        .route("/api/search", get(handlers::search))
        .route("/api/categories", get(handlers::categories))
        .route("/api/stats", get(handlers::stats));

    let admin_routes = Router::new()
        .route("/api/documents", post(handlers::create_document))
        .route(
            "/api/documents/{id}",
            put(handlers::update_document).delete(handlers::delete_document),
        )
        .route("/api/documents/all", delete(handlers::delete_all))
        .route("/api/engine/stats", get(handlers::engine_stats))
        .route(
            "/api/import",
            post(handlers::import).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route_layer(from_fn(require_admin));

    // require_admin reads the principal that require_auth inserts, so auth
    // must be the outer layer.
    let protected_routes = user_routes
        .merge(admin_routes)
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind to the configured host and port and serve until Ctrl-C.
pub async fn start_server(config: &KbConfig, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", config.general.host, config.general.port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| KbError::Config(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
