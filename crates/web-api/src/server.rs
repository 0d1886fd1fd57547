use crate::{handlers, health};
use axum::{
    routing::{get, post},
    Router,
};
use placement_engine::Engine;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct ApiServer {
    engine: Arc<Engine>,
}

impl ApiServer {
    #[must_use]
    pub const fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/allocate", post(handlers::allocate))
            .route("/api/events/impression", post(handlers::report_impression))
            .route("/api/events/click", post(handlers::report_click))
            .route("/api/decisions", get(handlers::list_decisions))
            .route("/api/decisions/aggregates", get(handlers::decision_aggregates))
            .route("/api/decisions/:decision_id", get(handlers::get_decision))
            .route(
                "/api/campaigns/:campaign_id/reconciliation",
                get(handlers::reconcile_campaign),
            )
            .route("/health", get(health::health))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.engine.clone())
    }

    /// Starts the web server listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web API listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
