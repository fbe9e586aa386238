use super::jwt::{JwtAuth, JwtClaims};
use crate::errors::AppError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::convert::Infallible;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify a bearer token when one is sent.
///
/// Anonymous requests pass through untouched. A token that fails
/// verification is rejected with 401 rather than treated as anonymous.
/// Verified claims are stored in the request extensions.
pub async fn optional_jwt_auth_middleware(
    State(auth): State<JwtAuth>,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = match bearer_token(request.headers()) {
        None => None,
        Some(token) => match auth.verify_token(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!("JWT verification failed: {}", e);
                return AppError::Unauthorized("Invalid or expired token".to_string())
                    .into_response();
            }
        },
    };

    if let Some(claims) = claims {
        tracing::debug!(sub = %claims.sub, "Authenticated request");
        request.extensions_mut().insert(claims);
    }
    next.run(request).await
}

/// Claims left by [`optional_jwt_auth_middleware`], `None` for anonymous callers.
#[derive(Debug, Clone)]
pub struct MaybeClaims(pub Option<JwtClaims>);

impl<S> FromRequestParts<S> for MaybeClaims
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeClaims(parts.extensions.get::<JwtClaims>().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtConfig;
    use axum::{Router, body::Body, http::StatusCode, routing::get};
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
    use tower::ServiceExt;

    const SECRET: &str = "middleware-test-secret-of-32-chars!!";

    fn app() -> Router {
        let auth = JwtAuth::new(&JwtConfig::new(SECRET).unwrap());
        Router::new()
            .route(
                "/whoami",
                get(|MaybeClaims(claims): MaybeClaims| async move {
                    claims.map(|c| c.sub).unwrap_or_else(|| "anonymous".to_string())
                }),
            )
            .layer(axum::middleware::from_fn_with_state(auth, optional_jwt_auth_middleware))
    }

    fn token(sub: &str) -> String {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: sub.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(5)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SECRET.as_bytes()))
            .unwrap()
    }

    async fn call(auth_header: Option<String>) -> (StatusCode, String) {
        let mut builder = axum::http::Request::builder().uri("/whoami");
        if let Some(value) = auth_header {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let response = app().oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_anonymous_passes_through() {
        assert_eq!(call(None).await, (StatusCode::OK, "anonymous".to_string()));
    }

    #[tokio::test]
    async fn test_valid_token_exposes_claims() {
        let (status, body) = call(Some(format!("Bearer {}", token("user-7")))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "user-7");
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        let (status, _) = call(Some("Bearer not-a-jwt".to_string())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
