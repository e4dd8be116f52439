//! Service Layer
//!
//! Multi-step business operations that do not fit a single store call.
//! Route handlers stay thin and call into these.

mod batch_service;

pub use batch_service::*;
