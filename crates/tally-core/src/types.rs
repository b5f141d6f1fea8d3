//! # Domain Types
//!
//! Core domain types used throughout Tally POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │  InventoryLog   │   │      Sale       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  product_id     │   │  id (UUID)      │       │
//! │  │  sku (business) │   │  change_type    │   │  sale_code      │       │
//! │  │  stock_quantity │   │  previous/new   │   │  status         │       │
//! │  │  min_stock      │   │  reference ─────┼──►│  total_amount   │       │
//! │  └─────────────────┘   └─────────────────┘   └────────┬────────┘       │
//! │          ▲                                            │ owns           │
//! │          │             ┌─────────────────┐   ┌────────▼────────┐       │
//! │          └─────────────│    SaleItem     │◄──│   SaleItem[]    │       │
//! │           (reference)  │  quantity       │   └─────────────────┘       │
//! │                        │  unit_price     │                              │
//! │                        └─────────────────┘   ┌─────────────────┐       │
//! │                                              │    Customer     │       │
//! │                                              │  1 ─── N Sale   │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for relations and log references
//! - Business ID: (sku, sale_code) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product in the catalog together with its authoritative stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    pub description: Option<String>,

    /// Stock Keeping Unit - unique business identifier.
    pub sku: String,

    pub category: Option<String>,

    /// Selling price.
    pub price: Money,

    /// Purchase cost (for margin reporting).
    pub cost_price: Money,

    /// Current stock. Only ever written by the inventory engine, always
    /// equal to the sum of this product's ledger deltas.
    pub stock_quantity: i64,

    /// Reorder threshold; at or below this the product is "low stock".
    pub min_stock: i64,

    pub image_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Classifies the current stock level against the reorder threshold.
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.stock_quantity, self.min_stock)
    }

    /// Value of the stock on hand at selling price.
    pub fn stock_value(&self) -> Money {
        self.price.multiply_quantity(self.stock_quantity)
    }
}

/// Stock level classification used by listings and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
}

impl StockStatus {
    /// `OutOfStock` at zero, `LowStock` at or below `min_stock`.
    pub fn classify(quantity: i64, min_stock: i64) -> Self {
        if quantity <= 0 {
            StockStatus::OutOfStock
        } else if quantity <= min_stock {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

/// Input for registering a new product.
///
/// Opening stock is not part of the product row: it is applied as the
/// product's first ledger entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Generated (`SKU-########`) when absent.
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub cost_price: Money,
    /// Defaults to [`crate::DEFAULT_MIN_STOCK`].
    #[serde(default)]
    pub min_stock: Option<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Editable catalog fields. Stock and SKU are deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Money,
    pub cost_price: Money,
    pub min_stock: i64,
    pub image_url: Option<String>,
}

// =============================================================================
// Inventory Ledger
// =============================================================================

/// Kind of stock movement recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Goods leaving through a sale.
    StockOut,
    /// Goods coming back (sale cancellation, customer return).
    Return,
    /// Manual receipt of goods.
    Increase,
    /// Manual write-off.
    Decrease,
    /// Stock count: sets the absolute quantity.
    Adjustment,
}

impl ChangeType {
    /// All movement kinds, in display order.
    pub const ALL: [ChangeType; 5] = [
        ChangeType::StockOut,
        ChangeType::Return,
        ChangeType::Increase,
        ChangeType::Decrease,
        ChangeType::Adjustment,
    ];

    /// True for kinds that remove `quantity` from stock.
    pub const fn is_subtracting(&self) -> bool {
        matches!(self, ChangeType::StockOut | ChangeType::Decrease)
    }

    /// True for kinds that add `quantity` to stock.
    pub const fn is_adding(&self) -> bool {
        matches!(self, ChangeType::Return | ChangeType::Increase)
    }

    /// Wire name, as stored in the database.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChangeType::StockOut => "stock_out",
            ChangeType::Return => "return",
            ChangeType::Increase => "increase",
            ChangeType::Decrease => "decrease",
            ChangeType::Adjustment => "adjustment",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChangeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "change_type".to_string(),
                allowed: ChangeType::ALL.iter().map(|t| t.as_str().to_string()).collect(),
            })
    }
}

/// One append-only ledger row.
///
/// `new_quantity == previous_quantity + quantity_change` always holds, and
/// for consecutive rows of a product (ordered by `seq`) each
/// `previous_quantity` equals the prior row's `new_quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryLog {
    /// Store-assigned insertion order.
    pub seq: i64,
    pub id: String,
    pub product_id: String,
    pub change_type: ChangeType,
    pub quantity_change: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub reason: String,
    /// Correlation id, e.g. the sale id for `stock_out` / `return`.
    pub reference: Option<String>,
    /// User who caused the movement.
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sale Status
// =============================================================================

/// The status of a sale.
///
/// ```text
///   pending ──complete──► completed
///      │                      │
///      └──────cancel──────────┴──► cancelled (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Created, awaiting confirmation. Stock is already taken.
    Pending,
    /// Confirmed.
    Completed,
    /// Cancelled; stock returned.
    Cancelled,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Completed
    }
}

impl SaleStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
        }
    }

    /// Guard for the cancel transition.
    pub fn ensure_can_cancel(&self, sale_code: &str) -> CoreResult<()> {
        match self {
            SaleStatus::Cancelled => Err(CoreError::AlreadyCancelled {
                sale_code: sale_code.to_string(),
            }),
            SaleStatus::Pending | SaleStatus::Completed => Ok(()),
        }
    }

    /// Guard for the complete transition. A cancelled sale cannot be revived.
    pub fn ensure_can_complete(&self, sale_code: &str) -> CoreResult<()> {
        match self {
            SaleStatus::Completed => Err(CoreError::AlreadyCompleted {
                sale_code: sale_code.to_string(),
            }),
            SaleStatus::Cancelled => Err(CoreError::AlreadyCancelled {
                sale_code: sale_code.to_string(),
            }),
            SaleStatus::Pending => Ok(()),
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    CreditCard,
    BankTransfer,
}

// =============================================================================
// Sale
// =============================================================================

/// A sale transaction header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    /// Human-readable unique code, `SALE-YYYYMMDD-NNNN`.
    pub sale_code: String,
    /// None for walk-in customers or after the customer was deleted.
    pub customer_id: Option<String>,
    /// User who rang up the sale.
    pub actor: String,
    /// Σ item total_price.
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub sale_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A line item in a sale.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    /// SKU at time of sale (frozen).
    pub sku_snapshot: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price: Money,
    /// quantity × unit_price.
    pub total_price: Money,
}

/// A sale together with its owned items (the aggregate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDetail {
    #[serde(flatten)]
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

impl SaleDetail {
    /// Total units across all lines.
    pub fn item_count(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Input for one sale line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub product_id: String,
    pub quantity: i64,
    /// Overrides the catalog price when present.
    #[serde(default)]
    pub unit_price: Option<Money>,
}

/// Input for creating a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSale {
    #[serde(default)]
    pub customer_id: Option<String>,
    pub actor: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub tax: Money,
    /// Independently supplied total; computed from the items when absent.
    #[serde(default)]
    pub total: Option<Money>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Initial status: `completed` (default) or `pending`.
    #[serde(default)]
    pub status: SaleStatus,
    pub items: Vec<NewSaleItem>,
}

/// Monetary totals of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

impl SaleTotals {
    /// Computes totals from priced lines `(quantity, unit_price)`.
    ///
    /// `total = subtotal - discount + tax` unless `supplied_total` is given.
    /// Negative money and overflow are rejected.
    pub fn compute(
        lines: &[(i64, Money)],
        discount: Money,
        tax: Money,
        supplied_total: Option<Money>,
    ) -> CoreResult<SaleTotals> {
        let non_negative = |field: &str, m: Money| -> CoreResult<()> {
            if m.is_negative() {
                return Err(ValidationError::MustNotBeNegative {
                    field: field.to_string(),
                }
                .into());
            }
            Ok(())
        };
        non_negative("discount", discount)?;
        non_negative("tax", tax)?;

        let overflow = || -> CoreError {
            ValidationError::invalid_format("total_amount", "value is too large").into()
        };

        let mut subtotal = Money::zero();
        for (qty, unit_price) in lines {
            non_negative("unit_price", *unit_price)?;
            let line = unit_price.checked_multiply_quantity(*qty).ok_or_else(overflow)?;
            subtotal = subtotal.checked_add(line).ok_or_else(overflow)?;
        }

        let total = match supplied_total {
            Some(total) => total,
            None => subtotal
                .checked_sub(discount)
                .and_then(|t| t.checked_add(tax))
                .ok_or_else(overflow)?,
        };
        non_negative("total_amount", total)?;

        Ok(SaleTotals {
            subtotal,
            discount,
            tax,
            total,
        })
    }
}

/// Aggregate figures over a window of sales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaleSummary {
    pub transactions: i64,
    pub total_amount: Money,
    pub items_sold: i64,
    /// total_amount / transactions, truncated to the minor unit.
    pub average_sale: Money,
}

impl SaleSummary {
    pub fn new(transactions: i64, total_amount: Money, items_sold: i64) -> Self {
        let average_sale = if transactions > 0 {
            Money::from_cents(total_amount.cents() / transactions)
        } else {
            Money::zero()
        };
        SaleSummary {
            transactions,
            total_amount,
            items_sold,
            average_sale,
        }
    }
}

// =============================================================================
// Customer
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    #[default]
    Retail,
    Wholesale,
    Corporate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub customer_type: CustomerType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub customer_type: CustomerType,
}

/// A customer with their purchase history.
///
/// `totals` leaves out cancelled sales; `recent_sales` lists the latest
/// sales of any status, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub customer: Customer,
    pub totals: SaleSummary,
    pub recent_sales: Vec<Sale>,
}

impl CustomerSummary {
    /// Lifetime spend over non-cancelled sales.
    pub fn total_spent(&self) -> Money {
        self.totals.total_amount
    }

    pub fn average_order_value(&self) -> Money {
        self.totals.average_sale
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sale_status_default() {
        assert_eq!(SaleStatus::default(), SaleStatus::Completed);
    }

    #[test]
    fn test_cancel_guard() {
        assert!(SaleStatus::Pending.ensure_can_cancel("S").is_ok());
        assert!(SaleStatus::Completed.ensure_can_cancel("S").is_ok());
        assert!(matches!(
            SaleStatus::Cancelled.ensure_can_cancel("S"),
            Err(CoreError::AlreadyCancelled { .. })
        ));
    }

    #[test]
    fn test_complete_guard() {
        assert!(SaleStatus::Pending.ensure_can_complete("S").is_ok());
        assert!(matches!(
            SaleStatus::Completed.ensure_can_complete("S"),
            Err(CoreError::AlreadyCompleted { .. })
        ));
        assert!(matches!(
            SaleStatus::Cancelled.ensure_can_complete("S"),
            Err(CoreError::AlreadyCancelled { .. })
        ));
    }

    #[test]
    fn test_change_type_parse() {
        assert_eq!("return".parse::<ChangeType>().unwrap(), ChangeType::Return);
        assert_eq!("stock_out".parse::<ChangeType>().unwrap(), ChangeType::StockOut);
        assert!("stock_in".parse::<ChangeType>().is_err());
        assert_eq!(
            serde_json::to_string(&ChangeType::Adjustment).unwrap(),
            "\"adjustment\""
        );
    }

    #[test]
    fn test_stock_status() {
        assert_eq!(StockStatus::classify(0, 10), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(10, 10), StockStatus::LowStock);
        assert_eq!(StockStatus::classify(11, 10), StockStatus::InStock);
    }

    #[test]
    fn test_sale_totals_computed() {
        let lines = [(2, Money::from_cents(1050)), (1, Money::from_cents(300))];
        let totals =
            SaleTotals::compute(&lines, Money::from_cents(400), Money::from_cents(120), None)
                .unwrap();
        assert_eq!(totals.subtotal.cents(), 2400);
        assert_eq!(totals.total.cents(), 2400 - 400 + 120);
    }

    #[test]
    fn test_sale_totals_supplied_total_wins() {
        let lines = [(1, Money::from_cents(1000))];
        let totals = SaleTotals::compute(
            &lines,
            Money::zero(),
            Money::zero(),
            Some(Money::from_cents(999)),
        )
        .unwrap();
        assert_eq!(totals.subtotal.cents(), 1000);
        assert_eq!(totals.total.cents(), 999);
    }

    #[test]
    fn test_sale_totals_rejects_negative() {
        let lines = [(1, Money::from_cents(100))];
        assert!(SaleTotals::compute(&lines, Money::from_cents(500), Money::zero(), None).is_err());
        assert!(SaleTotals::compute(&lines, Money::from_cents(-1), Money::zero(), None).is_err());
    }

    #[test]
    fn test_sale_totals_rejects_overflowing_tax() {
        let lines = [(1, Money::from_cents(100))];
        let huge_tax = Money::parse("92233720368547758.07").unwrap();
        let err = SaleTotals::compute(&lines, Money::zero(), huge_tax, None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let max_price = [(1, Money::from_cents(i64::MAX))];
        assert!(SaleTotals::compute(&max_price, Money::zero(), Money::from_cents(1), None).is_err());
    }

    #[test]
    fn test_sale_summary_average() {
        let summary = SaleSummary::new(3, Money::from_cents(1000), 7);
        assert_eq!(summary.average_sale.cents(), 333);
        assert_eq!(SaleSummary::new(0, Money::zero(), 0).average_sale, Money::zero());
    }
}
