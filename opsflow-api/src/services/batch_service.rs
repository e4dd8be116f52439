//! Batch Upload Service
//!
//! Business logic for the spreadsheet upload flow: row validation, the
//! upsert of validated rows, and post-hoc verification of a batch.

use std::collections::HashMap;

use opsflow_core::validation::validate_upload_row;
use opsflow_core::{
    ActionSource, ActionType, AuthUser, BatchProcessResponse,
    BatchUploadItem, BatchUploadRequest, BatchVerification, Customer, CustomerActionCreate,
    CustomerCreate, CustomerForValidation, CustomerId, CustomerStatus, CustomerUpdate,
    CustomerValidationResponse, OpsResult, RowStatus, ValidationErrorItem,
};
use serde_json::json;

use crate::cached_store::CachedStore;

/// Validate raw rows. Never fails; bad rows are reported per row.
pub fn validate_customers(rows: &[CustomerForValidation]) -> CustomerValidationResponse {
    let mut validated = Vec::new();
    let mut errors = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        match validate_upload_row(i, row) {
            Ok(item) => validated.push(item),
            Err(e) => errors.push(ValidationErrorItem {
                row: (i + 1) as u32,
                error: e.reason(),
                data: serde_json::to_value(row).unwrap_or_default(),
            }),
        }
    }

    CustomerValidationResponse {
        valid_count: validated.len(),
        error_count: errors.len(),
        total: rows.len(),
        validated,
        errors,
    }
}

/// Validated rows keyed by account number. A repeated account keeps the
/// position of its first row and the values of its last.
fn dedupe_validated(data: &[BatchUploadItem]) -> Vec<&BatchUploadItem> {
    let mut order: Vec<&BatchUploadItem> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for item in data.iter().filter(|i| i.status == RowStatus::Validated) {
        match index.get(item.account_number.as_str()) {
            Some(&pos) => order[pos] = item,
            None => {
                index.insert(item.account_number.as_str(), order.len());
                order.push(item);
            }
        }
    }
    order
}

fn connect_action(customer_id: CustomerId, performed_by: &str, batch_id: &str) -> CustomerActionCreate {
    CustomerActionCreate {
        customer_id,
        action: ActionType::Connect,
        performed_by: performed_by.to_string(),
        source: ActionSource::Batch,
        batch_id: Some(batch_id.to_string()),
    }
}

fn row_error(item: &BatchUploadItem, error: String) -> serde_json::Value {
    json!({
        "row": item.row,
        "error": error,
        "data": item,
    })
}

/// Upsert every validated row and log a `connect` action for each customer.
///
/// New accounts are inserted in one request; existing ones are reconnected
/// one at a time with the uploaded arrears. Row failures are collected into
/// `errors` and clear `success` without aborting the batch. The customer and
/// action caches are evicted once at the end.
///
/// # Errors
/// Lookup or action-insert failures abort the batch.
pub async fn process_batch(
    cached: &CachedStore,
    user: &AuthUser,
    req: &BatchUploadRequest,
) -> OpsResult<BatchProcessResponse> {
    let items = dedupe_validated(&req.data);
    if items.is_empty() {
        return Ok(BatchProcessResponse {
            message: "No valid data to process.".to_string(),
            actions_created: 0,
            customers_created: 0,
            customers_updated: 0,
            batch_id: req.batch_id.clone(),
            success: true,
            errors: Vec::new(),
        });
    }

    tracing::info!(batch_id = %req.batch_id, total_items = items.len(), "Starting batch processing");

    let store = cached.store();
    let accounts: Vec<String> = items.iter().map(|i| i.account_number.clone()).collect();
    let existing: HashMap<String, Customer> = store
        .customers_by_account_numbers(&accounts)
        .await?
        .into_iter()
        .map(|c| (c.account_number.clone(), c))
        .collect();

    let performed_by = user.display_name();
    let mut errors = Vec::new();
    let mut actions = Vec::new();

    // New customers
    let mut to_create = Vec::new();
    for item in items.iter().filter(|i| !existing.contains_key(&i.account_number)) {
        let create = CustomerCreate {
            name: item.name.clone(),
            account_number: item.account_number.clone(),
            phone: item.phone.clone(),
            status: CustomerStatus::Connected,
            arrears: item.arrears.clone(),
        };
        match create.normalized() {
            Ok(create) => to_create.push(create),
            Err(e) => errors.push(row_error(item, format!("Validation failed: {}", e.reason()))),
        }
    }

    let mut customers_created = 0;
    if !to_create.is_empty() {
        match store.create_customers(&to_create).await {
            Ok(created) => {
                customers_created = created.len();
                actions.extend(
                    created
                        .iter()
                        .map(|c| connect_action(c.id, &performed_by, &req.batch_id)),
                );
            }
            Err(e) => {
                tracing::error!(batch_id = %req.batch_id, error = %e, "Batch customer creation failed");
                errors.push(json!({
                    "row": "N/A",
                    "error": format!("Batch creation failed: {}", e),
                    "data": {},
                }));
            }
        }
    }

    // Existing customers
    let mut customers_updated = 0;
    for item in items.iter() {
        let Some(customer) = existing.get(&item.account_number) else {
            continue;
        };
        let update = CustomerUpdate {
            status: Some(CustomerStatus::Connected),
            arrears: Some(item.arrears.clone()),
            ..Default::default()
        };
        let result = match update.normalized() {
            Ok(update) => store
                .update_customer(customer.id, &update)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.reason()),
        };
        match result {
            Ok(Some(_)) => {
                customers_updated += 1;
                actions.push(connect_action(customer.id, &performed_by, &req.batch_id));
            }
            Ok(None) => errors.push(row_error(item, "Update failed: customer no longer exists".to_string())),
            Err(reason) => {
                tracing::error!(
                    batch_id = %req.batch_id,
                    customer_id = %customer.id,
                    error = %reason,
                    "Failed to update customer in batch"
                );
                errors.push(row_error(item, format!("Update failed: {}", reason)));
            }
        }
    }

    let created_actions = if actions.is_empty() {
        Ok(Vec::new())
    } else {
        store.create_actions(&actions).await
    };

    // Customers may have changed even when the action insert failed.
    cached.invalidate_after_batch();
    let created_actions = created_actions?;

    let success = errors.is_empty();
    tracing::info!(
        batch_id = %req.batch_id,
        success,
        customers_created,
        customers_updated,
        actions_created = created_actions.len(),
        "Batch processing completed"
    );

    Ok(BatchProcessResponse {
        message: format!(
            "Batch processed. Created {} new customers, updated {} existing customers.",
            customers_created, customers_updated
        ),
        actions_created: created_actions.len(),
        customers_created,
        customers_updated,
        batch_id: req.batch_id.clone(),
        success,
        errors,
    })
}

/// Check that every customer touched by `batch_id` is connected.
pub async fn verify_batch(cached: &CachedStore, batch_id: &str) -> OpsResult<BatchVerification> {
    let store = cached.store();
    let actions = store.actions_for_batch(batch_id).await?;

    let mut ids: Vec<CustomerId> = actions.iter().map(|a| a.customer_id).collect();
    ids.sort();
    ids.dedup();
    let customers = if ids.is_empty() {
        Vec::new()
    } else {
        store.customers_by_ids(&ids).await?
    };

    let verification = BatchVerification::build(batch_id, &actions, &customers);
    tracing::info!(
        batch_id,
        verification_passed = verification.verification_passed,
        total_actions = verification.total_actions,
        total_customers = verification.total_customers,
        connected_customers = verification.connected_customers,
        "Batch verification completed"
    );
    Ok(verification)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CustomerStore, InMemoryStore};
    use opsflow_cache::{CacheTtls, TtlCache};
    use opsflow_core::CustomerFilters;
    use opsflow_test_utils::fixtures;
    use std::sync::Arc;

    fn cached() -> (Arc<InMemoryStore>, CachedStore) {
        let store = Arc::new(InMemoryStore::new());
        let cached = CachedStore::new(store.clone(), Arc::new(TtlCache::new()), CacheTtls::default());
        (store, cached)
    }

    fn item(row: u32, account: &str, arrears: &str) -> BatchUploadItem {
        BatchUploadItem {
            row,
            name: "Yaw Asante".to_string(),
            account_number: account.to_string(),
            phone: "0241234567".to_string(),
            arrears: arrears.to_string(),
            status: RowStatus::Validated,
        }
    }

    #[test]
    fn test_validate_customers_reports_bad_rows() {
        let rows = vec![
            CustomerForValidation {
                name: " Esi Owusu ".to_string(),
                account_number: "ACC-1".to_string(),
                phone: "0241234567".to_string(),
                arrears: "10.5".to_string(),
            },
            CustomerForValidation {
                name: "Kojo".to_string(),
                account_number: "ACC-2".to_string(),
                phone: "12345".to_string(),
                arrears: "1".to_string(),
            },
            CustomerForValidation {
                name: "Akua".to_string(),
                account_number: "ACC-3".to_string(),
                phone: "0241234567".to_string(),
                arrears: "lots".to_string(),
            },
        ];
        let result = validate_customers(&rows);
        assert_eq!(result.total, 3);
        assert_eq!(result.valid_count, 1);
        assert_eq!(result.validated[0].name, "Esi Owusu");
        assert_eq!(result.errors[0].row, 2);
        assert_eq!(result.errors[0].error, "Phone number must be at least 10 digits");
        assert_eq!(result.errors[1].error, "Arrears must be a valid number");
        assert_eq!(result.errors[1].data["account_number"], "ACC-3");
    }

    #[test]
    fn test_dedupe_keeps_last_values() {
        let mut skipped = item(4, "ACC-9", "1");
        skipped.status = RowStatus::Error;
        let data = vec![item(1, "ACC-1", "10"), item(2, "ACC-2", "20"), item(3, "ACC-1", "30"), skipped];
        let unique = dedupe_validated(&data);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].account_number, "ACC-1");
        assert_eq!(unique[0].arrears, "30");
        assert_eq!(unique[1].account_number, "ACC-2");
    }

    #[tokio::test]
    async fn test_process_batch_empty() {
        let (_, cached) = cached();
        let req = BatchUploadRequest {
            data: Vec::new(),
            batch_id: "b-0".to_string(),
        };
        let result = process_batch(&cached, &fixtures::auth_user(), &req).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "No valid data to process.");
    }

    #[tokio::test]
    async fn test_process_batch_creates_and_updates() {
        let (store, cached) = cached();
        let existing = store
            .create_customer(&fixtures::customer_create("ACC-EXIST"))
            .await
            .unwrap();
        store
            .update_customer(
                existing.id,
                &CustomerUpdate {
                    status: Some(CustomerStatus::Disconnected),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Warm the list cache so the eviction is observable.
        let before = cached.list_customers(&CustomerFilters::default()).await.unwrap();
        assert_eq!(before.total, 1);

        let req = BatchUploadRequest {
            data: vec![item(2, "ACC-NEW", "15"), item(3, "ACC-EXIST", "99.5")],
            batch_id: "b-1".to_string(),
        };
        let result = process_batch(&cached, &fixtures::auth_user(), &req).await.unwrap();
        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.customers_created, 1);
        assert_eq!(result.customers_updated, 1);
        assert_eq!(result.actions_created, 2);

        let after = cached.list_customers(&CustomerFilters::default()).await.unwrap();
        assert_eq!(after.total, 2);
        let reconnected = cached.get_customer(existing.id).await.unwrap().unwrap();
        assert_eq!(reconnected.status, CustomerStatus::Connected);
        assert_eq!(reconnected.arrears, "99.50");

        let verification = verify_batch(&cached, "b-1").await.unwrap();
        assert!(verification.verification_passed);
        assert_eq!(verification.total_customers, 2);
        assert_eq!(verification.total_actions, 2);
    }

    #[tokio::test]
    async fn test_process_batch_reports_invalid_new_rows() {
        let (_, cached) = cached();
        let mut bad = item(5, "ACC-BAD", "10");
        bad.phone = "0000000000".to_string();
        let req = BatchUploadRequest {
            data: vec![bad, item(6, "ACC-OK", "10")],
            batch_id: "b-2".to_string(),
        };
        let result = process_batch(&cached, &fixtures::auth_user(), &req).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.customers_created, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0]["row"], 5);
    }

    #[tokio::test]
    async fn test_verify_unknown_batch_fails() {
        let (_, cached) = cached();
        let verification = verify_batch(&cached, "missing").await.unwrap();
        assert!(!verification.verification_passed);
        assert_eq!(verification.total_actions, 0);
    }
}
