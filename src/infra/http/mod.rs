//! HTTP surface of the caching proxy.
//!
//! Two control endpoints live under `/__worker/`; every other request falls
//! through to [`proxy::proxy`] and is answered by the active worker.

mod middleware;
pub mod proxy;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use folio_offline_types::{WorkerMessage, WorkerStatus};
use tracing::info;
use url::Url;

use crate::{application::error::AppError, worker::Registration};

pub use middleware::RequestContext;

pub const STATUS_PATH: &str = "/__worker/status";
pub const MESSAGE_PATH: &str = "/__worker/message";

#[derive(Clone)]
pub struct ProxyState {
    pub registration: Arc<Registration>,
    pub public_origin: Url,
    pub body_limit_bytes: usize,
}

pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route(STATUS_PATH, get(worker_status))
        .route(MESSAGE_PATH, post(worker_message))
        .fallback(proxy::proxy)
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn worker_status(State(state): State<ProxyState>) -> Json<WorkerStatus> {
    Json(state.registration.status())
}

async fn worker_message(
    State(state): State<ProxyState>,
    payload: Result<Json<WorkerMessage>, JsonRejection>,
) -> Response {
    let Json(message) = match payload {
        Ok(message) => message,
        Err(rejection) => {
            return AppError::validation(format!("malformed worker message: {rejection}"))
                .into_response();
        }
    };

    let ack = state.registration.post_message(message);
    if let Some(id) = ack.activated {
        info!(worker = %id, "waiting worker activated by message");
    }
    Json(ack).into_response()
}
