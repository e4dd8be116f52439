//! OpsFlow Test Utilities
//!
//! Shared test infrastructure for the OpsFlow workspace:
//! - Proptest generators for domain types and call arguments
//! - Fixtures for common customer, action and user records
//! - Assertions for OpsFlow error shapes

pub use opsflow_core::{
    ActionSource, ActionType, ActionWithCustomer, AuthUser, Customer, CustomerAction,
    CustomerActionCreate, CustomerCreate, CustomerFilters, CustomerId, CustomerStatus,
    CustomerUpdate, EntityType, MessageTemplate, OpsError, OpsResult, StorageError, Timestamp,
    ValidationError,
};

use chrono::Utc;
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating OpsFlow domain types.

    use super::*;
    use proptest::prelude::*;

    // === Identity ===

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    // === Enums ===

    pub fn arb_customer_status() -> impl Strategy<Value = CustomerStatus> {
        prop_oneof![
            Just(CustomerStatus::Connected),
            Just(CustomerStatus::Disconnected),
            Just(CustomerStatus::Warned),
        ]
    }

    pub fn arb_action_type() -> impl Strategy<Value = ActionType> {
        prop_oneof![
            Just(ActionType::Connect),
            Just(ActionType::Disconnect),
            Just(ActionType::Warn),
        ]
    }

    // === Field values ===

    /// Phone number in any accepted Ghana format, paired with its
    /// normalized `0XXXXXXXXX` form.
    pub fn arb_phone() -> impl Strategy<Value = (String, String)> {
        ("[2-9]", "[0-9]{8}").prop_flat_map(|(lead, rest)| {
            let local = format!("0{}{}", lead, rest);
            let national = format!("{}{}", lead, rest);
            prop_oneof![
                Just((local.clone(), local.clone())),
                Just((format!("+233{}", national), local.clone())),
                Just((format!("233{}", national), local.clone())),
                Just((national.clone(), local.clone())),
                Just((
                    format!("{} {} {}", &local[..3], &local[3..6], &local[6..]),
                    local
                )),
            ]
        })
    }

    /// Amount text paired with its two-decimal rendering.
    pub fn arb_amount() -> impl Strategy<Value = (String, String)> {
        (0u32..1_000_000, prop::option::of(0u32..100)).prop_map(|(whole, cents)| match cents {
            Some(c) => (format!("{}.{:02}", whole, c), format!("{}.{:02}", whole, c)),
            None => (whole.to_string(), format!("{}.00", whole)),
        })
    }

    /// Name made of letters and single spaces.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{2,12}( [A-Z][a-z]{2,12}){0,2}"
    }

    pub fn arb_account_number() -> impl Strategy<Value = String> {
        "[A-Z]{2,4}-[0-9]{4,8}"
    }

    // === Records ===

    pub fn arb_customer() -> impl Strategy<Value = Customer> {
        (
            arb_uuid(),
            arb_name(),
            arb_account_number(),
            arb_phone(),
            arb_customer_status(),
            arb_amount(),
            arb_timestamp(),
        )
            .prop_map(|(id, name, account_number, (_, phone), status, (_, arrears), ts)| {
                Customer {
                    id,
                    name,
                    account_number,
                    phone,
                    status,
                    arrears,
                    created_at: ts,
                    updated_at: ts,
                }
            })
    }

    pub fn arb_customer_create() -> impl Strategy<Value = CustomerCreate> {
        (
            arb_name(),
            arb_account_number(),
            arb_phone(),
            arb_customer_status(),
            arb_amount(),
        )
            .prop_map(|(name, account_number, (phone, _), status, (arrears, _))| {
                CustomerCreate {
                    name,
                    account_number,
                    phone,
                    status,
                    arrears,
                }
            })
    }

    pub fn arb_customer_filters() -> impl Strategy<Value = CustomerFilters> {
        (
            prop::option::of("[a-z]{1,6}"),
            prop::option::of(arb_customer_status()),
            1u32..20,
            1u32..=100,
        )
            .prop_map(|(search, status, page, limit)| CustomerFilters {
                search,
                status,
                page,
                limit,
                ..Default::default()
            })
    }

    /// Distinct keyword-argument names with small integer values.
    pub fn arb_kwargs() -> impl Strategy<Value = Vec<(String, i64)>> {
        prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..6)
            .prop_map(|m| m.into_iter().collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common scenarios.

    use super::*;

    /// Customer with a fresh id and the given status and arrears.
    pub fn customer(name: &str, status: CustomerStatus, arrears: &str) -> Customer {
        let now = Utc::now();
        Customer {
            id: Uuid::new_v4(),
            name: name.to_string(),
            account_number: format!("ACC-{}", &Uuid::new_v4().simple().to_string()[..6]),
            phone: "0241234567".to_string(),
            status,
            arrears: arrears.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn connected_customer() -> Customer {
        customer("Ama Mensah", CustomerStatus::Connected, "120.50")
    }

    /// Valid create request for `account_number`.
    pub fn customer_create(account_number: &str) -> CustomerCreate {
        CustomerCreate {
            name: "Kofi Boateng".to_string(),
            account_number: account_number.to_string(),
            phone: "0201234567".to_string(),
            status: CustomerStatus::Connected,
            arrears: "45.00".to_string(),
        }
    }

    pub fn action_create(customer_id: CustomerId, action: ActionType) -> CustomerActionCreate {
        CustomerActionCreate {
            customer_id,
            action,
            performed_by: "Test Operator".to_string(),
            source: ActionSource::Manual,
            batch_id: None,
        }
    }

    pub fn auth_user() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: Some("operator@example.com".to_string()),
            role: Some("authenticated".to_string()),
            user_metadata: serde_json::json!({ "name": "Test Operator" }),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for OpsFlow error shapes.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &OpsResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert a validation error on `field`.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &OpsResult<T>, field: &str) {
        match result {
            Err(OpsError::Validation(err)) => {
                assert_eq!(err.field(), Some(field), "Wrong field in {:?}", err);
            }
            other => panic!("Expected validation error on {}, got: {:?}", field, other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &OpsResult<T>, entity_type: EntityType) {
        match result {
            Err(OpsError::Storage(StorageError::NotFound { entity_type: et, .. })) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    #[track_caller]
    pub fn assert_duplicate<T: std::fmt::Debug>(result: &OpsResult<T>) {
        match result {
            Err(OpsError::Storage(StorageError::Duplicate { .. })) => {}
            other => panic!("Expected Duplicate error, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use opsflow_core::validation::{validate_amount, validate_phone};
    use proptest::prelude::*;

    #[test]
    fn test_customer_fixture() {
        let c = fixtures::connected_customer();
        assert_eq!(c.status, CustomerStatus::Connected);
        assert_eq!(c.arrears, "120.50");
    }

    #[test]
    fn test_customer_create_fixture_is_valid() {
        let req = fixtures::customer_create("ACC-1");
        assert!(req.normalized().is_ok());
    }

    #[test]
    fn test_assert_not_found_matches() {
        let result: OpsResult<()> = Err(StorageError::NotFound {
            entity_type: EntityType::Customer,
            id: "x".to_string(),
        }
        .into());
        assertions::assert_not_found(&result, EntityType::Customer);
    }

    proptest! {
        #[test]
        fn prop_generated_phones_normalize((raw, normalized) in generators::arb_phone()) {
            prop_assert_eq!(validate_phone(&raw).ok(), Some(normalized));
        }

        #[test]
        fn prop_generated_amounts_normalize((raw, rendered) in generators::arb_amount()) {
            prop_assert_eq!(validate_amount(&raw).ok(), Some(rendered));
        }

        #[test]
        fn prop_generated_creates_are_valid(req in generators::arb_customer_create()) {
            prop_assert!(req.normalized().is_ok());
        }
    }
}
