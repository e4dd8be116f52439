//! Deterministic cache keys.
//!
//! A key is `namespace:operation:digest`, where the digest is the SHA-256 of
//! the canonical JSON form of the call arguments:
//!
//! ```text
//! {"args": [...positional...], "kwargs": {...sorted by name...}}
//! ```
//!
//! Keyword arguments live in a `BTreeMap`, so the order they were supplied in
//! does not affect the key. Values that fail to serialize fall back to their
//! `Debug` text, and [`CallArgs::arg_display`] records the `Display` text.
//! Two distinct values with the same text form therefore share a key.

use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Arguments of a memoized call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
}

fn to_key_value<T: Serialize + fmt::Debug + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "cache key argument not serializable, using debug form");
        Value::String(format!("{:?}", value))
    })
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg<T: Serialize + fmt::Debug + ?Sized>(mut self, value: &T) -> Self {
        self.args.push(to_key_value(value));
        self
    }

    /// Append a positional argument by its `Display` text.
    pub fn arg_display(mut self, value: &dyn fmt::Display) -> Self {
        self.args.push(Value::String(value.to_string()));
        self
    }

    /// Set a keyword argument. A repeated name overwrites the earlier value.
    pub fn kwarg<T: Serialize + fmt::Debug + ?Sized>(mut self, name: &str, value: &T) -> Self {
        self.kwargs.insert(name.to_string(), to_key_value(value));
        self
    }

    pub fn kwarg_display(mut self, name: &str, value: &dyn fmt::Display) -> Self {
        self.kwargs
            .insert(name.to_string(), Value::String(value.to_string()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// Canonical JSON text hashed into the key.
    pub fn canonical(&self) -> String {
        json!({ "args": self.args, "kwargs": self.kwargs }).to_string()
    }

    /// Hex SHA-256 of [`CallArgs::canonical`].
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Rendered cache key plus the namespace it is indexed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    rendered: String,
}

impl CacheKey {
    /// Build the key for `operation` called with `args` inside `namespace`.
    ///
    /// Namespaces may contain `:` (`actions:customer:{id}`), so `operation`
    /// must not: `("a:b", "c")` and `("a", "b:c")` would render the same key.
    pub fn derive(namespace: &str, operation: &str, args: &CallArgs) -> Self {
        debug_assert!(
            !operation.contains(':'),
            "cache operation name must not contain ':' ({})",
            operation
        );
        Self {
            namespace: namespace.to_string(),
            rendered: format!("{}:{}:{}", namespace, operation, args.digest()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.rendered
    }
}
