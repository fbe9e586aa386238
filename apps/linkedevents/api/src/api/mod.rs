use axum::{Router, middleware, routing::get};
use axum_helpers::{JwtAuth, JwtConfig, optional_jwt_auth_middleware};
use domain_linked_events::{EventStore, LinkedEventsService, handlers};

pub mod health;

/// Creates the API routes without the `/v1` prefix.
/// The prefix is added by the `create_router` helper.
///
/// Bearer tokens are verified when present; anonymous callers may still read.
pub fn routes<S: EventStore + 'static>(service: LinkedEventsService<S>, jwt: &JwtConfig) -> Router {
    handlers::router(service).layer(middleware::from_fn_with_state(
        JwtAuth::new(jwt),
        optional_jwt_auth_middleware,
    ))
}

/// Creates a router with the /ready endpoint that performs actual health checks.
pub fn ready_router(state: crate::state::AppState) -> Router {
    Router::new()
        .route("/ready", get(health::ready_handler))
        .with_state(state)
}
