//! # Stock Movement Arithmetic
//!
//! Turns a requested movement into the exact ledger row values, and audits
//! a product's ledger against its stored quantity.
//!
//! ## Movement Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  change_type   new_quantity          quantity_change                    │
//! │  ───────────   ────────────────────  ─────────────────────────────────  │
//! │  stock_out     previous - quantity   -quantity   (rejected if < 0)      │
//! │  decrease      previous - quantity   -quantity   (rejected if < 0)      │
//! │  return        previous + quantity   +quantity                          │
//! │  increase      previous + quantity   +quantity                          │
//! │  adjustment    quantity              quantity - previous                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here touches storage. The engine reads `previous`, calls
//! [`plan_movement`], then writes the product row and the ledger row in the
//! same transaction.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{ChangeType, InventoryLog};
use crate::MAX_QUANTITY;

/// The computed effect of a movement on one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPlan {
    pub previous_quantity: i64,
    pub new_quantity: i64,
    /// Signed delta, `new_quantity - previous_quantity`.
    pub quantity_change: i64,
}

impl MovementPlan {
    /// The low-stock condition: stock went down and landed at or below
    /// `min_stock`.
    ///
    /// Restocking never warns, even if the result is still at or below the
    /// threshold. A downward adjustment counts as a decrease.
    pub fn is_low_stock(&self, min_stock: i64) -> bool {
        self.quantity_change < 0 && self.new_quantity <= min_stock
    }
}

/// Computes the new stock for a movement of `quantity` units.
///
/// `sku` is only used to build a readable [`CoreError::InsufficientStock`].
///
/// ## Errors
/// - `Validation` if `quantity` is negative or above [`MAX_QUANTITY`]
/// - `InsufficientStock` if a subtracting movement would go below zero
///
/// ## Example
/// ```rust
/// use tally_core::movement::plan_movement;
/// use tally_core::{ChangeType, CoreError};
///
/// let plan = plan_movement("TEA-01", 10, ChangeType::StockOut, 4).unwrap();
/// assert_eq!((plan.new_quantity, plan.quantity_change), (6, -4));
///
/// let err = plan_movement("TEA-01", 3, ChangeType::Decrease, 5).unwrap_err();
/// assert!(matches!(err, CoreError::InsufficientStock { available: 3, requested: 5, .. }));
/// ```
pub fn plan_movement(
    sku: &str,
    previous: i64,
    change_type: ChangeType,
    quantity: i64,
) -> CoreResult<MovementPlan> {
    if quantity < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "quantity".to_string(),
        }
        .into());
    }
    if quantity > MAX_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_QUANTITY,
        }
        .into());
    }

    let too_large =
        || -> CoreError { ValidationError::invalid_format("quantity", "stock would overflow").into() };

    let new_quantity = match change_type {
        ChangeType::StockOut | ChangeType::Decrease => {
            let next = previous.checked_sub(quantity).ok_or_else(too_large)?;
            if next < 0 {
                return Err(CoreError::InsufficientStock {
                    sku: sku.to_string(),
                    available: previous,
                    requested: quantity,
                });
            }
            next
        }
        ChangeType::Return | ChangeType::Increase => {
            previous.checked_add(quantity).ok_or_else(too_large)?
        }
        ChangeType::Adjustment => quantity,
    };

    let quantity_change = new_quantity.checked_sub(previous).ok_or_else(too_large)?;

    Ok(MovementPlan {
        previous_quantity: previous,
        new_quantity,
        quantity_change,
    })
}

// =============================================================================
// Ledger Audit
// =============================================================================

/// Result of replaying one product's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub product_id: String,
    /// Quantity currently stored on the product row.
    pub stock_quantity: i64,
    /// Σ quantity_change over every ledger row.
    pub ledger_sum: i64,
    pub entries: usize,
    /// `seq` of rows whose previous_quantity does not match the prior
    /// row's new_quantity, or whose own arithmetic does not add up.
    pub chain_breaks: Vec<i64>,
}

impl LedgerAudit {
    /// Replays `logs` (any order; sorted by `seq` here).
    pub fn compute(product_id: &str, stock_quantity: i64, logs: &[InventoryLog]) -> Self {
        let mut ordered: Vec<&InventoryLog> = logs.iter().collect();
        ordered.sort_by_key(|l| l.seq);

        let mut ledger_sum: i64 = 0;
        let mut chain_breaks = Vec::new();
        let mut expected_previous: i64 = 0;

        for log in ordered {
            ledger_sum = ledger_sum.saturating_add(log.quantity_change);
            let arithmetic_ok =
                log.previous_quantity.checked_add(log.quantity_change) == Some(log.new_quantity);
            if !arithmetic_ok || log.previous_quantity != expected_previous {
                chain_breaks.push(log.seq);
            }
            expected_previous = log.new_quantity;
        }

        LedgerAudit {
            product_id: product_id.to_string(),
            stock_quantity,
            ledger_sum,
            entries: logs.len(),
            chain_breaks,
        }
    }

    /// Stored stock equals the ledger sum and the chain is unbroken.
    pub fn is_consistent(&self) -> bool {
        self.stock_quantity == self.ledger_sum && self.chain_breaks.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
