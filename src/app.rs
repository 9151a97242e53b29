use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{
        create_item, delete_item, healthcheck, list_items, login, logout, operational_time,
        register,
    },
    state::AppState,
};

/// Routes for the items API. `allowed_origin` is the browser client's origin;
/// credentials are allowed so the client can send its bearer token.
pub fn build_router(state: AppState, allowed_origin: HeaderValue) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/operational-time", get(operational_time))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/items", get(list_items).post(create_item))
        .route("/api/items/{id}", delete(delete_item))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origin)
                .allow_credentials(true)
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
