//! Bearer token verification for write endpoints.
//!
//! Tokens are HS256 JWTs issued elsewhere; this module only verifies them.
//!
//! ```ignore
//! let auth = JwtAuth::new(&JwtConfig::from_env()?);
//! let routes = Router::new()
//!     .route("/event/", post(create))
//!     .layer(axum::middleware::from_fn_with_state(auth, optional_jwt_auth_middleware));
//! ```

pub mod config;
pub mod jwt;
pub mod middleware;

pub use config::JwtConfig;
pub use jwt::{JwtAuth, JwtClaims};
pub use middleware::{MaybeClaims, optional_jwt_auth_middleware};
