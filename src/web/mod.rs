pub mod agents;
pub mod auth;
pub mod catalog;
pub mod error;
pub mod evaluations;
pub mod forms;
pub mod general;
pub mod session;

use crate::state::SharedState;
use axum::{http::HeaderValue, routing::get, Router};
use serde::{Deserialize, Deserializer};
use tower_http::cors::{Any, CorsLayer};

/// `?is_active=&ordering=` shared by the list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub is_active: Option<bool>,
    pub ordering: Option<String>,
}

/// For PATCH bodies: a missing field stays `None`, an explicit `null`
/// becomes `Some(None)`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    let api = Router::new()
        .nest("/auth", auth::router(state.clone()))
        .nest("/roles", catalog::roles_router(state.clone()))
        .nest("/question-categories", catalog::categories_router(state.clone()))
        .nest("/questions", catalog::questions_router(state.clone()))
        .nest("/agents", agents::router(state.clone()))
        .nest("/admin", agents::admin_router(state.clone()))
        .nest("/forms", forms::router(state.clone()))
        .nest("/evaluations", evaluations::router(state.clone()))
        .nest("/answers", evaluations::answers_router(state.clone()))
        .nest("/general", general::router(state));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
}

/// Browsers on `origin` may call the API; any origin when unset.
pub fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(origin) => layer.allow_origin(origin),
        None => layer.allow_origin(Any),
    }
}
