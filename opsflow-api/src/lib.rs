//! OpsFlow API - REST/WebSocket layer
//!
//! HTTP surface for utility customer operations: customer records, the
//! action log, SMS notices and spreadsheet batch uploads. Reads go through
//! an in-process TTL cache (`opsflow-cache`); every mutation invalidates the
//! affected namespaces before it returns.
//!
//! The backing store, identity provider and SMS gateway are traits, so the
//! server runs against Supabase and Arkesel in production and entirely in
//! memory in development and tests.

pub mod auth;
pub mod cached_store;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod sms;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod ws;

// Re-export commonly used types
pub use auth::{bearer_token, IdentityProvider, StaticIdentityProvider, SupabaseAuth};
pub use cached_store::CachedStore;
pub use config::{ApiConfig, Environment, StoreBackend};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use events::WsEvent;
pub use middleware::{auth_middleware, AuthExtractor, AuthMiddlewareState};
pub use routes::{create_api_router, SecureRouterBuilder};
pub use sms::{ArkeselGateway, SmsGateway};
pub use state::AppState;
pub use store::{CustomerStore, InMemoryStore, PostgrestStore};
pub use ws::WsState;
