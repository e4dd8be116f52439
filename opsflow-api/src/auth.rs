//! Identity provider seam.
//!
//! Token validation, password sign-in and sign-up are delegated to Supabase
//! GoTrue. [`StaticIdentityProvider`] stands in for it in development and
//! tests.

use crate::constants::STORE_TIMEOUT_SECS;
use async_trait::async_trait;
use dashmap::DashMap;
use opsflow_core::{new_id, AuthUser, GatewayError, OpsResult, TokenResponse, UserCreate};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

const GATEWAY: &str = "Supabase Auth";

/// Extract the bearer token from an `Authorization` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Resolve a bearer token to its user. Rejected tokens are
    /// `GatewayError::Unauthorized`.
    async fn validate_token(&self, token: &str) -> OpsResult<AuthUser>;

    /// Password sign-in. `None` when the credentials are wrong.
    async fn sign_in(&self, email: &str, password: &str) -> OpsResult<Option<TokenResponse>>;

    /// Create a user. `None` when the provider refuses, e.g. a taken email.
    async fn sign_up(&self, req: &UserCreate) -> OpsResult<Option<AuthUser>>;
}

// ============================================================================
// SUPABASE GOTRUE
// ============================================================================

#[derive(Debug, Deserialize)]
struct SessionBody {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// GoTrue returns a bare user, or a session wrapping one when email
/// confirmation is off.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignupBody {
    Session { user: AuthUser },
    User(AuthUser),
}

impl SignupBody {
    fn into_user(self) -> AuthUser {
        match self {
            SignupBody::Session { user } | SignupBody::User(user) => user,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseAuth {
    client: Client,
    auth_url: String,
    api_key: SecretString,
}

impl SupabaseAuth {
    pub fn new(base_url: &str, api_key: SecretString) -> OpsResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(STORE_TIMEOUT_SECS))
            .build()
            .map_err(|e| GatewayError::InvalidResponse {
                gateway: GATEWAY.to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            auth_url: format!("{}/auth/v1", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.auth_url, path)
    }

    fn request_failed(status: StatusCode, message: String) -> GatewayError {
        GatewayError::RequestFailed {
            gateway: GATEWAY.to_string(),
            status: status.as_u16(),
            message,
        }
    }

    fn transport(e: reqwest::Error) -> GatewayError {
        GatewayError::RequestFailed {
            gateway: GATEWAY.to_string(),
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        }
    }

    fn invalid(e: reqwest::Error) -> GatewayError {
        GatewayError::InvalidResponse {
            gateway: GATEWAY.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn validate_token(&self, token: &str) -> OpsResult<AuthUser> {
        let response = self
            .client
            .get(self.url("user"))
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(token)
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            s if s.is_success() => Ok(response.json().await.map_err(Self::invalid)?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => {
                Err(GatewayError::Unauthorized {
                    gateway: GATEWAY.to_string(),
                }
                .into())
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(Self::request_failed(s, body).into())
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> OpsResult<Option<TokenResponse>> {
        let response = self
            .client
            .post(self.url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", self.api_key.expose_secret())
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(Self::transport)?;

        let status = response.status();
        if status.is_client_error() {
            tracing::info!(status = status.as_u16(), "Sign-in rejected");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::request_failed(status, body).into());
        }

        let session: SessionBody = response.json().await.map_err(Self::invalid)?;
        Ok(Some(TokenResponse {
            access_token: session.access_token,
            token_type: session.token_type,
            user: session.user,
        }))
    }

    async fn sign_up(&self, req: &UserCreate) -> OpsResult<Option<AuthUser>> {
        let response = self
            .client
            .post(self.url("signup"))
            .header("apikey", self.api_key.expose_secret())
            .json(&serde_json::json!({
                "email": req.email,
                "password": req.password,
                "data": { "name": req.name, "role": req.role },
            }))
            .send()
            .await
            .map_err(Self::transport)?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::info!(status = status.as_u16(), body = %body, "Sign-up rejected");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::request_failed(status, body).into());
        }

        let body: SignupBody = response.json().await.map_err(Self::invalid)?;
        Ok(Some(body.into_user()))
    }
}

// ============================================================================
// STATIC PROVIDER
// ============================================================================

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: AuthUser,
}

/// In-process identity provider with fixed tokens and accounts.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    tokens: DashMap<String, AuthUser>,
    accounts: DashMap<String, Account>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `user`.
    pub fn with_token(self, token: impl Into<String>, user: AuthUser) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }

    fn user_for(req: &UserCreate) -> AuthUser {
        AuthUser {
            id: new_id(),
            email: Some(req.email.clone()),
            role: Some("authenticated".to_string()),
            user_metadata: serde_json::json!({ "name": req.name, "role": req.role }),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn validate_token(&self, token: &str) -> OpsResult<AuthUser> {
        self.tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                GatewayError::Unauthorized {
                    gateway: "static identity provider".to_string(),
                }
                .into()
            })
    }

    async fn sign_in(&self, email: &str, password: &str) -> OpsResult<Option<TokenResponse>> {
        let user = match self.accounts.get(&email.to_lowercase()) {
            Some(account) if account.password == password => account.user.clone(),
            _ => return Ok(None),
        };
        let token = format!("static-{}", new_id().simple());
        self.tokens.insert(token.clone(), user.clone());
        Ok(Some(TokenResponse {
            access_token: token,
            token_type: default_token_type(),
            user,
        }))
    }

    async fn sign_up(&self, req: &UserCreate) -> OpsResult<Option<AuthUser>> {
        use dashmap::mapref::entry::Entry;

        match self.accounts.entry(req.email.to_lowercase()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let user = Self::user_for(req);
                slot.insert(Account {
                    password: req.password.clone(),
                    user: user.clone(),
                });
                Ok(Some(user))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsflow_core::OpsError;

    fn signup(email: &str) -> UserCreate {
        UserCreate {
            email: email.to_string(),
            password: "correct horse".to_string(),
            name: "Kofi Boateng".to_string(),
            role: "user".to_string(),
        }
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn test_signup_body_shapes() {
        let id = "00000000-0000-0000-0000-000000000009";
        let bare: SignupBody =
            serde_json::from_value(serde_json::json!({ "id": id, "email": "a@b.c" })).unwrap();
        assert_eq!(bare.into_user().email.as_deref(), Some("a@b.c"));

        let wrapped: SignupBody = serde_json::from_value(serde_json::json!({
            "access_token": "t",
            "user": { "id": id, "email": "d@e.f" }
        }))
        .unwrap();
        assert_eq!(wrapped.into_user().email.as_deref(), Some("d@e.f"));
    }

    #[tokio::test]
    async fn test_static_signup_then_sign_in() {
        let provider = StaticIdentityProvider::new();
        let user = provider.sign_up(&signup("kofi@example.com")).await.unwrap();
        assert!(user.is_some());
        assert!(provider
            .sign_up(&signup("KOFI@example.com"))
            .await
            .unwrap()
            .is_none());

        let session = provider
            .sign_in("kofi@example.com", "correct horse")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.token_type, "bearer");
        assert_eq!(session.user.display_name(), "Kofi Boateng");

        let validated = provider.validate_token(&session.access_token).await.unwrap();
        assert_eq!(validated.id, session.user.id);
    }

    #[tokio::test]
    async fn test_static_rejects_bad_credentials() {
        let provider = StaticIdentityProvider::new();
        provider.sign_up(&signup("ama@example.com")).await.unwrap();
        assert!(provider
            .sign_in("ama@example.com", "wrong")
            .await
            .unwrap()
            .is_none());

        let err = provider.validate_token("nope").await.unwrap_err();
        assert!(matches!(err, OpsError::Gateway(GatewayError::Unauthorized { .. })));
    }
}
