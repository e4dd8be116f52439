//! Bearer-token authentication.
//!
//! [`auth_middleware`] resolves `Authorization: Bearer <token>` through the
//! configured [`IdentityProvider`] and stores the resulting [`AuthUser`] in
//! the request extensions, where [`AuthExtractor`] picks it up.

use crate::auth::{bearer_token, IdentityProvider};
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use opsflow_core::{AuthUser, GatewayError, OpsError};
use std::sync::Arc;

const INVALID_CREDENTIALS: &str = "Invalid authentication credentials";

#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub provider: Arc<dyn IdentityProvider>,
}

impl AuthMiddlewareState {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }
}

/// Reject requests without a valid bearer token with 401.
///
/// ```ignore
/// let app = Router::new()
///     .route("/api/customers", get(list_customers))
///     .layer(middleware::from_fn_with_state(auth_state, auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    let user = match state.provider.validate_token(token).await {
        Ok(user) => user,
        Err(OpsError::Gateway(GatewayError::Unauthorized { .. })) => {
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Token validation failed");
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }
    };

    tracing::debug!(user_id = %user.id, "Authenticated request");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// The authenticated user. Requires [`auth_middleware`] on the route; without
/// it extraction fails with 500.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| {
                ApiError::internal_error(
                    "AuthUser not found in request extensions. \
                     Ensure auth_middleware is applied to this route.",
                )
            })
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticIdentityProvider;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use opsflow_test_utils::fixtures;
    use tower::ServiceExt;

    fn test_app() -> (Router, AuthUser) {
        let user = fixtures::auth_user();
        let provider = StaticIdentityProvider::new().with_token("good-token", user.clone());
        let state = AuthMiddlewareState::new(Arc::new(provider));

        async fn handler(auth: AuthExtractor) -> String {
            format!("User {}", auth.display_name())
        }

        let app = Router::new()
            .route("/protected", get(handler))
            .layer(middleware::from_fn_with_state(state, auth_middleware));
        (app, user)
    }

    #[tokio::test]
    async fn test_middleware_with_valid_token() -> Result<(), String> {
        let (app, user) = test_app();
        let request = Request::builder()
            .uri("/protected")
            .header("authorization", "Bearer good-token")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let response = app
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read body: {:?}", e))?;
        let body_str = String::from_utf8(body.to_vec()).map_err(|e| e.to_string())?;
        assert_eq!(body_str, format!("User {}", user.display_name()));
        Ok(())
    }

    #[tokio::test]
    async fn test_middleware_without_token() -> Result<(), String> {
        let (app, _) = test_app();
        let request = Request::builder()
            .uri("/protected")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let response = app
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("www-authenticate").map(|v| v.as_bytes()),
            Some(&b"Bearer"[..])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_middleware_with_unknown_token() -> Result<(), String> {
        let (app, _) = test_app();
        let request = Request::builder()
            .uri("/protected")
            .header("authorization", "Bearer stolen")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let response = app
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn test_middleware_with_malformed_header() -> Result<(), String> {
        let (app, _) = test_app();
        let request = Request::builder()
            .uri("/protected")
            .header("authorization", "Basic good-token")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let response = app
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn test_auth_extractor_without_middleware() -> Result<(), String> {
        async fn handler(AuthExtractor(_user): AuthExtractor) -> String {
            "Should not reach here".to_string()
        }

        let app = Router::new().route("/unprotected", get(handler));
        let request = Request::builder()
            .uri("/unprotected")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let response = app
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        Ok(())
    }
}
