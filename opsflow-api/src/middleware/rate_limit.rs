//! Per-client rate limiting with `governor`.
//!
//! Authenticated requests are keyed by user id, everything else by client
//! IP. Limiters live in a `DashMap` and are created on first use.

use crate::config::ApiConfig;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};
use opsflow_core::AuthUser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use uuid::Uuid;

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum RateLimitKey {
    Ip(IpAddr),
    User(Uuid),
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    enabled: bool,
    unauthenticated: u32,
    authenticated: u32,
    burst: u32,
}

#[derive(Clone)]
pub struct RateLimitState {
    limits: Limits,
    limiters: Arc<DashMap<RateLimitKey, Arc<DirectRateLimiter>>>,
}

impl RateLimitState {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            limits: Limits {
                enabled: config.rate_limit_enabled,
                unauthenticated: config.rate_limit_unauthenticated,
                authenticated: config.rate_limit_authenticated,
                burst: config.rate_limit_burst,
            },
            limiters: Arc::new(DashMap::new()),
        }
    }

    fn per_minute(&self, key: &RateLimitKey) -> u32 {
        match key {
            RateLimitKey::Ip(_) => self.limits.unauthenticated,
            RateLimitKey::User(_) => self.limits.authenticated,
        }
    }

    fn limiter(&self, key: &RateLimitKey) -> Arc<DirectRateLimiter> {
        self.limiters
            .entry(key.clone())
            .or_insert_with(|| {
                let quota =
                    Quota::per_minute(NonZeroU32::new(self.per_minute(key)).unwrap_or(NonZeroU32::MIN))
                        .allow_burst(NonZeroU32::new(self.limits.burst).unwrap_or(NonZeroU32::MIN));
                Arc::new(RateLimiter::direct(quota))
            })
            .clone()
    }
}

pub struct RateLimitError {
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let mut response = ApiError::too_many_requests(Some(self.retry_after)).into_response();
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("60")),
        );
        response
    }
}

/// Client IP, preferring proxy headers over the socket address.
fn client_ip(request: &Request) -> IpAddr {
    let header_ip = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// 429 with `Retry-After` once a client exceeds its quota.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.limits.enabled {
        return Ok(next.run(request).await);
    }

    let key = match request.extensions().get::<AuthUser>() {
        Some(user) => RateLimitKey::User(user.id),
        None => RateLimitKey::Ip(client_ip(&request)),
    };

    let limiter = state.limiter(&key);
    match limiter.check() {
        Ok(_) => {
            let limit = state.per_minute(&key);
            let mut response = next.run(request).await;
            response.headers_mut().insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(limit),
            );
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);
            tracing::warn!(key = ?key, retry_after, "Rate limit exceeded");
            Err(RateLimitError { retry_after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app(burst: u32) -> Router {
        let config = ApiConfig {
            rate_limit_unauthenticated: 1,
            rate_limit_burst: burst,
            ..ApiConfig::default()
        };
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                RateLimitState::new(&config),
                rate_limit_middleware,
            ))
    }

    fn request(ip: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri("/")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_burst_then_429() {
        let app = app(2);
        for _ in 0..2 {
            let response = app.clone().oneshot(request("10.0.0.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-ratelimit-limit"], "1");
        }

        let response = app.clone().oneshot(request("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        let other = app.oneshot(request("10.0.0.2")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disabled_never_limits() {
        let config = ApiConfig {
            rate_limit_enabled: false,
            rate_limit_unauthenticated: 1,
            rate_limit_burst: 1,
            ..ApiConfig::default()
        };
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                RateLimitState::new(&config),
                rate_limit_middleware,
            ));
        for _ in 0..5 {
            let response = app.clone().oneshot(request("10.0.0.3")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
