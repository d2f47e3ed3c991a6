pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::{ApiState, InvocationCounters};

/// `/api` routes with CORS.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/triggers",
            post(handlers::handle_trigger).get(handlers::handle_triggers),
        )
        .route("/job-events", post(handlers::handle_job_event))
        .route("/status", get(handlers::handle_status))
        .route("/dead-letters", get(handlers::handle_dead_letters))
        .route("/notifications", get(handlers::handle_notifications))
        .route("/submissions", get(handlers::handle_submissions))
        .route("/summaries", get(handlers::handle_summaries))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    serve_listener(listener, state).await
}

/// Serve on an already-bound listener (port 0 in tests).
pub async fn serve_listener(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
