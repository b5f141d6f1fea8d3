//! # tally-core: Pure Business Logic for Tally POS
//!
//! This crate is the **heart** of the inventory ledger. It contains the stock
//! arithmetic, sale status rules and domain types as pure functions with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Request layer (HTTP, realtime socket)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │      tally-ledger: InventoryEngine, SaleManager, Notifier       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ movement  │  │  events   │  │   │
//! │  │   │  Product  │  │   Money   │  │  plan     │  │ Change-   │  │   │
//! │  │   │   Sale    │  │  (cents)  │  │  stock    │  │  Event    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Ledger Store)                      │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, InventoryLog, Sale, Customer, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`movement`] - Stock movement planning (the ledger arithmetic)
//! - [`events`] - Change events delivered to realtime subscribers
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::movement::plan_movement;
//! use tally_core::ChangeType;
//!
//! // Adjustment sets stock absolutely: 12 → 5 is recorded as -7
//! let plan = plan_movement("COKE-330", 12, ChangeType::Adjustment, 5).unwrap();
//! assert_eq!(plan.new_quantity, 5);
//! assert_eq!(plan.quantity_change, -7);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod events;
pub mod money;
pub mod movement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use events::ChangeEvent;
pub use money::Money;
pub use movement::{LedgerAudit, MovementPlan};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Reorder threshold applied when a product is created without one.
pub const DEFAULT_MIN_STOCK: i64 = 10;

/// Maximum line items allowed in a single sale.
pub const MAX_SALE_ITEMS: usize = 100;

/// Upper bound for any single quantity (sale line or movement).
///
/// Keeps stock arithmetic far away from i64 overflow and catches
/// fat-finger input (typing 1000000 instead of 100).
pub const MAX_QUANTITY: i64 = 1_000_000;

/// Prefix of every human-readable sale code (`SALE-20260131-0042`).
pub const SALE_CODE_PREFIX: &str = "SALE";
