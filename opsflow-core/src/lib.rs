//! OpsFlow Core - Entity Types
//!
//! Domain records, list filters, field validators and error enums shared by
//! the cache and API crates. No I/O lives here.

use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Customer identifier as issued by the backing store.
pub type CustomerId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new customer or action id.
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

// ============================================================================
// MODULES
// ============================================================================

mod entities;
mod enums;
mod error;
mod filter;
pub mod validation;

pub use entities::*;
pub use enums::*;
pub use error::*;
pub use filter::*;
