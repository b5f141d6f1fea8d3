//! # Validation Module
//!
//! Input validation for everything that reaches the ledger.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request layer                                                │
//! │  ├── Type validation (deserialization, Money::parse)                   │
//! │  └── Session → actor                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Business rule validation, before any lock or transaction          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── UNIQUE constraints (sku, sale_code)                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_sku, validate_sale_quantity};
//!
//! validate_sku("COKE-330").unwrap();
//! validate_sale_quantity(5).unwrap();
//! assert!(validate_sale_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{NewCustomer, NewProduct, NewSale, ProductUpdate, SaleStatus};
use crate::{MAX_QUANTITY, MAX_SALE_ITEMS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_SKU_LEN: usize = 50;
const MAX_NAME_LEN: usize = 200;
const MAX_REASON_LEN: usize = 500;
const MAX_ACTOR_LEN: usize = 100;
const MAX_SEARCH_LEN: usize = 100;

fn not_blank(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::required(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty, at most 50 characters
/// - Only letters, digits, hyphens and underscores
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_sku;
///
/// assert!(validate_sku("COKE-330").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    not_blank("sku", sku, MAX_SKU_LEN)?;

    if !sku
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid_format(
            "sku",
            "must contain only letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Validates a product or customer name (1-200 characters).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    not_blank(field, name, MAX_NAME_LEN)
}

/// Validates the actor recorded on ledger rows and sales.
pub fn validate_actor(actor: &str) -> ValidationResult<()> {
    not_blank("actor", actor, MAX_ACTOR_LEN)
}

/// Validates a movement reason (required, at most 500 characters).
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    not_blank("reason", reason, MAX_REASON_LEN)
}

/// Validates a search query.
///
/// Can be empty (no filter). Returns the trimmed query.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.chars().count() > MAX_SEARCH_LEN {
        return Err(ValidationError::TooLong {
            field: "search".to_string(),
            max: MAX_SEARCH_LEN,
        });
    }

    Ok(query.to_string())
}

/// Loose email check: one `@` with something on both sides.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    match email.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ValidationError::invalid_format("email", "must look like name@host.tld")),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a sale line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed [`MAX_QUANTITY`]
pub fn validate_sale_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a movement quantity. Zero is allowed (a no-op count).
pub fn validate_movement_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a reorder threshold.
pub fn validate_min_stock(min_stock: i64) -> ValidationResult<()> {
    if !(0..=MAX_QUANTITY).contains(&min_stock) {
        return Err(ValidationError::OutOfRange {
            field: "min_stock".to_string(),
            min: 0,
            max: MAX_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a monetary amount that must not be negative.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_non_negative_money;
/// use tally_core::Money;
///
/// assert!(validate_non_negative_money("price", Money::from_cents(0)).is_ok());
/// assert!(validate_non_negative_money("price", Money::from_cents(-1)).is_err());
/// ```
pub fn validate_non_negative_money(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_uuid;
///
/// assert!(validate_uuid("product_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("product_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }

    uuid::Uuid::parse_str(id)
        .map_err(|_| ValidationError::invalid_format(field, "must be a valid UUID"))?;

    Ok(())
}

// =============================================================================
// Input Validators
// =============================================================================

/// Validates a product registration request.
pub fn validate_new_product(input: &NewProduct) -> ValidationResult<()> {
    validate_name("name", &input.name)?;
    if let Some(sku) = &input.sku {
        validate_sku(sku)?;
    }
    validate_non_negative_money("price", input.price)?;
    validate_non_negative_money("cost_price", input.cost_price)?;
    if let Some(min_stock) = input.min_stock {
        validate_min_stock(min_stock)?;
    }
    Ok(())
}

/// Validates a catalog update.
pub fn validate_product_update(input: &ProductUpdate) -> ValidationResult<()> {
    validate_name("name", &input.name)?;
    validate_non_negative_money("price", input.price)?;
    validate_non_negative_money("cost_price", input.cost_price)?;
    validate_min_stock(input.min_stock)
}

/// Validates a sale creation request.
///
/// ## Rules
/// - At least one and at most [`MAX_SALE_ITEMS`] lines
/// - Every line: valid product id, positive quantity, non-negative price
/// - Discount, tax and any supplied total are non-negative
/// - Initial status is `pending` or `completed`
pub fn validate_new_sale(input: &NewSale) -> ValidationResult<()> {
    validate_actor(&input.actor)?;

    if input.items.is_empty() {
        return Err(ValidationError::required("items"));
    }
    if input.items.len() > MAX_SALE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_ITEMS as i64,
        });
    }

    for item in &input.items {
        validate_uuid("product_id", &item.product_id)?;
        validate_sale_quantity(item.quantity)?;
        if let Some(price) = item.unit_price {
            validate_non_negative_money("unit_price", price)?;
        }
    }

    if let Some(customer_id) = &input.customer_id {
        validate_uuid("customer_id", customer_id)?;
    }

    validate_non_negative_money("discount", input.discount)?;
    validate_non_negative_money("tax", input.tax)?;
    if let Some(total) = input.total {
        validate_non_negative_money("total_amount", total)?;
    }

    if input.status == SaleStatus::Cancelled {
        return Err(ValidationError::NotAllowed {
            field: "status".to_string(),
            allowed: vec![
                SaleStatus::Pending.as_str().to_string(),
                SaleStatus::Completed.as_str().to_string(),
            ],
        });
    }

    Ok(())
}

/// Validates a customer record.
pub fn validate_new_customer(input: &NewCustomer) -> ValidationResult<()> {
    validate_name("name", &input.name)?;
    if let Some(email) = input.email.as_deref().filter(|e| !e.trim().is_empty()) {
        validate_email(email)?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewSaleItem;

    const PID: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn sale(items: Vec<NewSaleItem>) -> NewSale {
        NewSale {
            customer_id: None,
            actor: "cashier".to_string(),
            payment_method: Default::default(),
            discount: Money::zero(),
            tax: Money::zero(),
            total: None,
            notes: None,
            status: SaleStatus::Completed,
            items,
        }
    }

    fn line(quantity: i64) -> NewSaleItem {
        NewSaleItem {
            product_id: PID.to_string(),
            quantity,
            unit_price: None,
        }
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("COKE-330").is_ok());
        assert!(validate_sku("product_1").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_quantities() {
        assert!(validate_sale_quantity(1).is_ok());
        assert!(validate_sale_quantity(0).is_err());
        assert!(validate_sale_quantity(-1).is_err());
        assert!(validate_sale_quantity(MAX_QUANTITY + 1).is_err());

        assert!(validate_movement_quantity(0).is_ok());
        assert!(matches!(
            validate_movement_quantity(-3),
            Err(ValidationError::MustNotBeNegative { .. })
        ));
    }

    #[test]
    fn test_validate_reason_and_actor() {
        assert!(validate_reason("Stock count").is_ok());
        assert!(validate_reason("  ").is_err());
        assert!(validate_reason(&"x".repeat(501)).is_err());
        assert!(validate_actor("").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", PID).is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "123").is_err());
    }

    #[test]
    fn test_validate_new_sale() {
        assert!(validate_new_sale(&sale(vec![line(2)])).is_ok());
        assert!(matches!(
            validate_new_sale(&sale(vec![])),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_new_sale(&sale(vec![line(0)])).is_err());

        let mut cancelled = sale(vec![line(1)]);
        cancelled.status = SaleStatus::Cancelled;
        assert!(matches!(
            validate_new_sale(&cancelled),
            Err(ValidationError::NotAllowed { .. })
        ));

        let mut negative = sale(vec![line(1)]);
        negative.discount = Money::from_cents(-100);
        assert!(validate_new_sale(&negative).is_err());
    }

    #[test]
    fn test_validate_new_customer() {
        let mut customer = NewCustomer {
            name: "Lan".to_string(),
            ..Default::default()
        };
        assert!(validate_new_customer(&customer).is_ok());

        customer.email = Some("lan@example.com".to_string());
        assert!(validate_new_customer(&customer).is_ok());

        customer.email = Some("nope".to_string());
        assert!(validate_new_customer(&customer).is_err());
    }
}
