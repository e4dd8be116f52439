//! Field validators
//!
//! Each validator returns the normalized value or a [`ValidationError`] naming
//! the field. Patterns are compiled once.

use crate::{
    ActionType, BatchUploadItem, CustomerForValidation, CustomerStatus, RowStatus,
    ValidationError, MAX_PAGE_LIMIT,
};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

/// Accepted Ghana number shapes, checked after stripping separators.
static PHONE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^0[2-9]\d{8}$",
        r"^\+233[2-9]\d{8}$",
        r"^233[2-9]\d{8}$",
        r"^[2-9]\d{8}$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static AMOUNT_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d{1,2})?$").ok());

static NAME_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[a-zA-Z\s\-']+$").ok());

const NAME_MIN_LEN: usize = 2;
const NAME_MAX_LEN: usize = 255;
const ACCOUNT_NUMBER_MAX_LEN: usize = 50;
const UPLOAD_PHONE_MIN_LEN: usize = 10;

/// Validate a Ghana phone number and normalize it to `0XXXXXXXXX`.
pub fn validate_phone(phone: &str) -> Result<String, ValidationError> {
    if phone.trim().is_empty() {
        return Err(ValidationError::required("phone"));
    }

    let cleaned: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if !PHONE_PATTERNS.iter().any(|re| re.is_match(&cleaned)) {
        return Err(ValidationError::invalid(
            "phone",
            "Invalid phone number format. Use format: 0XX XXX XXXX",
        ));
    }

    let normalized = if let Some(rest) = cleaned.strip_prefix("+233") {
        format!("0{}", rest)
    } else if let Some(rest) = cleaned.strip_prefix("233") {
        format!("0{}", rest)
    } else if cleaned.len() == 9 {
        format!("0{}", cleaned)
    } else {
        cleaned
    };
    Ok(normalized)
}

/// Trim an account number; any format is accepted.
pub fn validate_account_number(account_number: &str) -> Result<String, ValidationError> {
    let trimmed = account_number.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::required("account_number"));
    }
    if trimmed.chars().count() > ACCOUNT_NUMBER_MAX_LEN {
        return Err(ValidationError::invalid(
            "account_number",
            format!("Account number must be at most {} characters", ACCOUNT_NUMBER_MAX_LEN),
        ));
    }
    Ok(trimmed.to_string())
}

/// Parse a monetary amount and render it with two decimals.
///
/// Currency symbols and spaces are dropped and `,` is read as the decimal
/// separator, so `"GHS 12,5"` becomes `"12.50"`.
pub fn validate_amount(amount: &str) -> Result<String, ValidationError> {
    if amount.trim().is_empty() {
        return Err(ValidationError::required("arrears"));
    }

    let cleaned: String = amount
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let valid = AMOUNT_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(&cleaned));
    if !valid {
        return Err(ValidationError::invalid(
            "arrears",
            "Invalid amount format. Use format: 123.45",
        ));
    }

    Ok(match cleaned.split_once('.') {
        Some((integer, decimal)) => format!("{}.{:0<2}", integer, decimal),
        None => format!("{}.00", cleaned),
    })
}

/// Collapse whitespace, check length and characters, and title-case.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let cleaned = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return Err(ValidationError::required("name"));
    }

    let len = cleaned.chars().count();
    if len < NAME_MIN_LEN {
        return Err(ValidationError::invalid(
            "name",
            "Name must be at least 2 characters long",
        ));
    }
    if len > NAME_MAX_LEN {
        return Err(ValidationError::invalid(
            "name",
            "Name must be less than 255 characters",
        ));
    }

    let valid = NAME_PATTERN.as_ref().is_some_and(|re| re.is_match(&cleaned));
    if !valid {
        return Err(ValidationError::invalid(
            "name",
            "Name can only contain letters, spaces, hyphens, and apostrophes",
        ));
    }

    Ok(title_case(&cleaned))
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start = false;
        } else {
            out.push(c);
            start = true;
        }
    }
    out
}

pub fn validate_status(status: &str) -> Result<CustomerStatus, ValidationError> {
    if status.trim().is_empty() {
        return Err(ValidationError::required("status"));
    }
    CustomerStatus::from_db_str(status).map_err(|_| {
        ValidationError::invalid(
            "status",
            "Invalid status. Must be one of: connected, disconnected, warned",
        )
    })
}

pub fn validate_action(action: &str) -> Result<ActionType, ValidationError> {
    if action.trim().is_empty() {
        return Err(ValidationError::required("action"));
    }
    ActionType::from_db_str(action).map_err(|_| {
        ValidationError::invalid(
            "action",
            "Invalid action. Must be one of: connect, disconnect, warn",
        )
    })
}

pub fn validate_pagination(page: u32, limit: u32) -> Result<(), ValidationError> {
    if page < 1 {
        return Err(ValidationError::invalid("page", "Page must be greater than 0"));
    }
    if limit < 1 || limit > MAX_PAGE_LIMIT {
        return Err(ValidationError::invalid(
            "limit",
            "Limit must be between 1 and 100",
        ));
    }
    Ok(())
}

pub fn validate_uuid(value: &str, field: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| ValidationError::invalid(field, format!("Invalid {} format", field)))
}

/// Drop control characters (keeping tab and newlines), trim, and cap length.
pub fn sanitize_string(value: &str, max_length: Option<usize>) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    let trimmed = cleaned.trim();
    match max_length {
        Some(max) => trimmed.chars().take(max).collect(),
        None => trimmed.to_string(),
    }
}

/// Light pre-check applied to uploaded rows before a batch is processed.
///
/// `index` is zero-based; the returned item carries the one-based row number.
pub fn validate_upload_row(
    index: usize,
    row: &CustomerForValidation,
) -> Result<BatchUploadItem, ValidationError> {
    let phone = row.phone.trim();
    if phone.chars().count() < UPLOAD_PHONE_MIN_LEN {
        return Err(ValidationError::invalid(
            "phone",
            "Phone number must be at least 10 digits",
        ));
    }

    let arrears = row.arrears.trim();
    if arrears.parse::<f64>().is_err() {
        return Err(ValidationError::invalid(
            "arrears",
            "Arrears must be a valid number",
        ));
    }

    Ok(BatchUploadItem {
        row: (index + 1) as u32,
        name: row.name.trim().to_string(),
        account_number: row.account_number.trim().to_string(),
        phone: phone.to_string(),
        arrears: arrears.to_string(),
        status: RowStatus::Validated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_normalization() {
        assert_eq!(validate_phone("024 123 4567").unwrap(), "0241234567");
        assert_eq!(validate_phone("+233241234567").unwrap(), "0241234567");
        assert_eq!(validate_phone("233241234567").unwrap(), "0241234567");
        assert_eq!(validate_phone("241234567").unwrap(), "0241234567");
    }

    #[test]
    fn test_phone_rejects_bad_input() {
        assert!(validate_phone("").is_err());
        assert!(validate_phone("0141234567").is_err());
        assert!(validate_phone("12345").is_err());
        let err = validate_phone("abc").unwrap_err();
        assert_eq!(err.field(), Some("phone"));
    }

    #[test]
    fn test_amount_formatting() {
        assert_eq!(validate_amount("123").unwrap(), "123.00");
        assert_eq!(validate_amount("123.4").unwrap(), "123.40");
        assert_eq!(validate_amount("GHS 123.45").unwrap(), "123.45");
        assert_eq!(validate_amount("12,5").unwrap(), "12.50");
    }

    #[test]
    fn test_amount_rejects_bad_input() {
        assert!(validate_amount("").is_err());
        assert!(validate_amount("12.345").is_err());
        assert!(validate_amount("1.2.3").is_err());
        assert!(validate_amount("abc").is_err());
    }

    #[test]
    fn test_name_cleanup() {
        assert_eq!(validate_name("  ama   MENSAH ").unwrap(), "Ama Mensah");
        assert_eq!(validate_name("kwame o'neil-boateng").unwrap(), "Kwame O'Neil-Boateng");
        assert!(validate_name("A").is_err());
        assert!(validate_name("R2D2").is_err());
        assert!(validate_name(&"a".repeat(256)).is_err());
    }

    #[test]
    fn test_status_and_action() {
        assert_eq!(validate_status("warned").unwrap(), CustomerStatus::Warned);
        assert!(validate_status("paused").is_err());
        assert_eq!(validate_action("disconnect").unwrap(), ActionType::Disconnect);
        assert!(validate_action("").is_err());
    }

    #[test]
    fn test_uuid() {
        assert!(validate_uuid("00000000-0000-0000-0000-000000000000", "id").is_ok());
        let err = validate_uuid("nope", "customer_id").unwrap_err();
        assert_eq!(err.reason(), "Invalid customer_id format");
    }

    #[test]
    fn test_sanitize_string() {
        assert_eq!(sanitize_string("  hi\u{0}there  ", None), "hithere");
        assert_eq!(sanitize_string("abcdef", Some(3)), "abc");
    }

    #[test]
    fn test_upload_row() {
        let row = CustomerForValidation {
            name: " Ama ".to_string(),
            account_number: " ACC-1 ".to_string(),
            phone: " 0241234567 ".to_string(),
            arrears: "10.5".to_string(),
        };
        let item = validate_upload_row(0, &row).unwrap();
        assert_eq!(item.row, 1);
        assert_eq!(item.name, "Ama");
        assert_eq!(item.status, RowStatus::Validated);

        let short = CustomerForValidation {
            phone: "12345".to_string(),
            ..row.clone()
        };
        assert_eq!(
            validate_upload_row(1, &short).unwrap_err().reason(),
            "Phone number must be at least 10 digits"
        );

        let bad = CustomerForValidation {
            arrears: "ten".to_string(),
            ..row
        };
        assert_eq!(
            validate_upload_row(2, &bad).unwrap_err().reason(),
            "Arrears must be a valid number"
        );
    }
}
