//! # Axum Helpers
//!
//! Shared HTTP plumbing for the Linked Events services.
//!
//! - **[`errors`]**: `AppError` and the JSON error body
//! - **[`auth`]**: HS256 bearer token verification
//! - **[`server`]**: router assembly, health endpoints, graceful shutdown
//! - **[`http`]**: CORS and security header middleware

pub mod auth;
pub mod errors;
pub mod http;
pub mod server;

pub use auth::{JwtAuth, JwtClaims, JwtConfig, MaybeClaims, optional_jwt_auth_middleware};
pub use errors::{AppError, ErrorCode, ErrorResponse};
pub use server::{
    HealthCheckFuture, HealthResponse, ShutdownCoordinator, create_production_app, create_router,
    health_router, run_health_checks, shutdown_signal,
};
