mod handlers;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use fgalite_storage::StoreFactory;

use crate::metrics::{self, Metrics};
use crate::service::AuthzService;

const MAX_REQUEST_BODY_SIZE: usize = 4 * 1024 * 1024;

pub struct AppState<F: StoreFactory> {
    pub service: Arc<AuthzService<F>>,
    pub metrics: Arc<Metrics>,
}

impl<F: StoreFactory> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

async fn metrics_middleware<F: StoreFactory>(
    State(state): State<AppState<F>>,
    request: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> Response {
    state.metrics.record_request();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    if response.status().is_success() {
        state.metrics.record_success();
    } else {
        state.metrics.record_error();
    }
    tracing::debug!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request handled"
    );

    response
}

pub fn create_router<F: StoreFactory + 'static>(state: AppState<F>) -> Router {
    Router::new()
        .route(
            "/stores",
            post(handlers::create_store).get(handlers::list_stores),
        )
        .route(
            "/stores/{store_id}",
            get(handlers::get_store).delete(handlers::delete_store),
        )
        .route(
            "/stores/{store_id}/authorization-models",
            post(handlers::write_authorization_model).get(handlers::list_authorization_models),
        )
        .route(
            "/stores/{store_id}/authorization-models/{model_id}",
            get(handlers::read_authorization_model),
        )
        .route("/stores/{store_id}/write", post(handlers::write))
        .route("/stores/{store_id}/read", post(handlers::read))
        .route("/stores/{store_id}/check", post(handlers::check))
        .route("/stores/{store_id}/expand", post(handlers::expand))
        .route("/stores/{store_id}/list-objects", post(handlers::list_objects))
        .route("/stores/{store_id}/list-users", post(handlers::list_users))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/metrics",
            get(metrics::metrics_handler).with_state(Arc::clone(&state.metrics)),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .with_state(state)
}
