//! List filters and pagination
//!
//! Filters are plain serde structs so the API layer can deserialize them from
//! query strings and the cache layer can hash them into keys.

use crate::validation::validate_pagination;
use crate::{Customer, CustomerId, CustomerStatus, ValidationError};
use serde::{Deserialize, Serialize};

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Largest page size a client may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

/// Page request shared by every list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_pagination(self.page, self.limit)
    }

    /// Zero-based offset of the first row on this page.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.limit as usize
    }

    /// Slice `items` down to this page.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset())
            .take(self.limit as usize)
            .cloned()
            .collect()
    }
}

/// Customer list filters.
///
/// Keep fields flat: `serde_urlencoded` cannot decode numbers through
/// `#[serde(flatten)]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CustomerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrears_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrears_max: Option<f64>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for CustomerFilters {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            arrears_min: None,
            arrears_max: None,
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl CustomerFilters {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pagination().validate()?;
        if let (Some(min), Some(max)) = (self.arrears_min, self.arrears_max) {
            if min > max {
                return Err(ValidationError::ConstraintViolation {
                    constraint: "arrears_range".to_string(),
                    reason: "arrears_min must not exceed arrears_max".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Non-empty trimmed search term.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether a customer passes every filter. Search is a case-insensitive
    /// substring match on name, account number and phone.
    pub fn matches(&self, customer: &Customer) -> bool {
        if let Some(term) = self.search_term() {
            let term = term.to_lowercase();
            let hit = [&customer.name, &customer.account_number, &customer.phone]
                .iter()
                .any(|field| field.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        if let Some(status) = self.status {
            if customer.status != status {
                return false;
            }
        }
        let arrears = customer.arrears_value();
        if self.arrears_min.is_some_and(|min| arrears < min) {
            return false;
        }
        if self.arrears_max.is_some_and(|max| arrears > max) {
            return false;
        }
        true
    }
}

/// Action list filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for ActionFilters {
    fn default() -> Self {
        Self {
            customer_id: None,
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl ActionFilters {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub pages: usize,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: usize, page: Pagination) -> Self {
        let limit = page.limit.max(1) as usize;
        Self {
            data,
            total,
            page: page.page,
            limit: page.limit,
            pages: total.div_ceil(limit),
        }
    }
}
