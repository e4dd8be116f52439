//! Authentication REST API Routes
//!
//! Sign-in and sign-up are delegated to the [`IdentityProvider`]. `/token`
//! and `/signup` are public; `/register` and `/me` sit behind the auth layer.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use opsflow_core::UserCreate;

use crate::{
    auth::IdentityProvider,
    error::{ApiError, ApiResult},
    middleware::AuthExtractor,
};

const BAD_CREDENTIALS: &str = "Incorrect email or password";
const SIGNUP_FAILED: &str = "Could not create user. The email might already be in use.";

#[derive(Clone)]
pub struct AuthState {
    pub provider: Arc<dyn IdentityProvider>,
}

/// OAuth2 password form; `username` carries the email.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

fn check_email(email: &str) -> ApiResult<()> {
    let valid = match email.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ApiError::validation("A valid email address is required")
            .with_details(serde_json::json!({ "field": "email" })))
    }
}

/// POST /api/auth/token
pub async fn login(
    State(state): State<Arc<AuthState>>,
    Form(form): Form<LoginForm>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(user = %form.username, "Login attempt");
    match state.provider.sign_in(&form.username, &form.password).await {
        Ok(Some(session)) => {
            tracing::info!(user = %form.username, "Login successful");
            Ok(Json(session))
        }
        Ok(None) => {
            tracing::warn!(user = %form.username, "Failed login attempt");
            Err(ApiError::unauthorized(BAD_CREDENTIALS))
        }
        Err(e) => {
            // Provider details stay in the log.
            tracing::error!(user = %form.username, error = %e, "Login process failed");
            Err(ApiError::unauthorized(BAD_CREDENTIALS))
        }
    }
}

async fn create_user(provider: &dyn IdentityProvider, req: &UserCreate) -> ApiResult<impl IntoResponse> {
    check_email(&req.email)?;
    match provider.sign_up(req).await? {
        Some(user) => {
            tracing::info!(email = %req.email, "User created");
            Ok((StatusCode::CREATED, Json(user)))
        }
        None => {
            tracing::error!(email = %req.email, "User registration failed");
            Err(ApiError::invalid_input(SIGNUP_FAILED))
        }
    }
}

/// POST /api/auth/signup - Public account creation
pub async fn signup(
    State(state): State<Arc<AuthState>>,
    Json(req): Json<UserCreate>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(email = %req.email, "Public signup attempt");
    create_user(state.provider.as_ref(), &req).await
}

/// POST /api/auth/register - Account creation by a signed-in operator
pub async fn register(
    State(state): State<Arc<AuthState>>,
    AuthExtractor(current): AuthExtractor,
    Json(req): Json<UserCreate>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(email = %req.email, by = %current.display_name(), "User registration attempt");
    create_user(state.provider.as_ref(), &req).await
}

/// GET /api/auth/me
pub async fn me(AuthExtractor(user): AuthExtractor) -> impl IntoResponse {
    Json(user)
}

/// Routes reachable without a token.
pub fn create_public_router(provider: Arc<dyn IdentityProvider>) -> Router {
    Router::new()
        .route("/token", post(login))
        .route("/signup", post(signup))
        .with_state(Arc::new(AuthState { provider }))
}

/// Routes that expect [`crate::middleware::auth_middleware`] in front.
pub fn create_protected_router(provider: Arc<dyn IdentityProvider>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/me", get(me))
        .with_state(Arc::new(AuthState { provider }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticIdentityProvider;
    use opsflow_test_utils::fixtures;

    fn state() -> Arc<AuthState> {
        Arc::new(AuthState {
            provider: Arc::new(StaticIdentityProvider::new()),
        })
    }

    fn new_user(email: &str) -> UserCreate {
        UserCreate {
            email: email.to_string(),
            password: "s3cret-pass".to_string(),
            name: "Efua Mensah".to_string(),
            role: "user".to_string(),
        }
    }

    #[test]
    fn test_check_email() {
        assert!(check_email("ops@example.com").is_ok());
        assert!(check_email("ops@localhost").is_err());
        assert!(check_email("@example.com").is_err());
        assert!(check_email("not-an-email").is_err());
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let state = state();
        let response = signup(State(state.clone()), Json(new_user("efua@example.com")))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let form = LoginForm {
            username: "efua@example.com".to_string(),
            password: "s3cret-pass".to_string(),
        };
        let response = login(State(state), Form(form)).await.unwrap().into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["token_type"], "bearer");
        assert_eq!(json["user"]["email"], "efua@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_signup_rejected() {
        let state = state();
        signup(State(state.clone()), Json(new_user("kwame@example.com"))).await.unwrap();
        let err = signup(State(state), Json(new_user("KWAME@example.com")))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, SIGNUP_FAILED);
    }

    #[tokio::test]
    async fn test_wrong_password_is_401() {
        let form = LoginForm {
            username: "nobody@example.com".to_string(),
            password: "x".to_string(),
        };
        let err = login(State(state()), Form(form)).await.err().unwrap();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, BAD_CREDENTIALS);
    }

    #[tokio::test]
    async fn test_me_returns_current_user() {
        let user = fixtures::auth_user();
        let response = me(AuthExtractor(user.clone())).await.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["id"], user.id.to_string());
    }
}
