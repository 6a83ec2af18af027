mod content;
mod middleware;
mod webhook;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};

use crate::application::delivery::CachedDeliveryClient;
use crate::cache::CacheManager;

pub use middleware::{REQUEST_ID_HEADER, RequestContext, log_responses, set_request_context};
pub use webhook::WEBHOOK_BODY_LIMIT;

pub const WEBHOOK_PATH: &str = "/webhooks/delivery";

#[derive(Clone)]
pub struct HttpState {
    pub delivery: CachedDeliveryClient,
    pub cache: Arc<CacheManager>,
    /// Shared webhook secret. Without one every webhook is rejected.
    pub webhook_secret: Option<Arc<str>>,
}

impl HttpState {
    pub fn new(delivery: CachedDeliveryClient, webhook_secret: Option<String>) -> Self {
        let cache = Arc::clone(delivery.cache());
        Self {
            delivery,
            cache,
            webhook_secret: webhook_secret.map(Arc::from),
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    let webhook_routes = Router::new()
        .route(WEBHOOK_PATH, post(webhook::receive_notification))
        .layer(from_fn_with_state(state.clone(), webhook::verify_signature));

    let content_routes = Router::new()
        .route("/items", get(content::items))
        .route("/items/{codename}", get(content::item))
        .route("/types", get(content::content_types))
        .route("/types/{codename}", get(content::content_type))
        .route(
            "/types/{codename}/elements/{element}",
            get(content::content_element),
        );

    Router::new()
        .merge(webhook_routes)
        .merge(content_routes)
        .route("/health", get(health))
        .with_state(state)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
