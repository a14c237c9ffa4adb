pub mod auth;
pub mod error;
pub mod proxy;
pub mod routes;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(routes::health::health))
        // Auth
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/invite", post(routes::auth::invite))
        .route("/auth/register", post(routes::auth::register))
        // Backend data routes
        .route(
            "/people",
            get(routes::people::list_people).post(routes::people::create_person),
        )
        .route("/people/view", get(routes::people::view_people))
        .route(
            "/people/{index}",
            get(routes::people::get_person)
                .put(routes::people::update_person)
                .delete(routes::people::delete_person)
                .post(routes::people::override_person),
        )
        // Proxy routes
        .route(
            "/api/people",
            get(proxy::proxy_collection)
                .post(proxy::proxy_collection)
                .options(proxy::preflight),
        )
        .route(
            "/api/people/{index}",
            get(proxy::proxy_get_person)
                .put(proxy::proxy_write_person)
                .delete(proxy::proxy_write_person)
                .post(proxy::proxy_write_person)
                .options(proxy::preflight),
        )
        // CSV and publish
        .route("/csv", get(routes::csv::get_csv).post(routes::csv::post_csv))
        .route("/publish", post(routes::csv::publish))
        // Sync
        .route(
            "/sync",
            get(routes::sync::sync_preview).post(routes::sync::sync_apply),
        )
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the server on `0.0.0.0:{port}`.
pub async fn serve(app_state: AppState, port: u16, open_browser: bool) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener, open_browser).await
}

/// Start the server on a pre-bound listener so the caller can read the
/// actual port first (useful with `port = 0`).
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    tracing::info!(
        store = %app_state.store.describe(),
        backend = %app_state.backend_url,
        "birthdays server listening on http://localhost:{port}"
    );

    let auth = &app_state.config.auth;
    if auth.disabled {
        tracing::warn!("AUTH_DISABLED is set; every request acts as admin");
    } else if auth.secret.is_none() {
        tracing::warn!("AUTH_SECRET is not set; gated routes will answer 401");
    }

    if open_browser {
        let url = format!("http://localhost:{port}/health");
        let _ = open::that(&url);
    }

    axum::serve(listener, build_router(app_state)).await?;
    Ok(())
}
