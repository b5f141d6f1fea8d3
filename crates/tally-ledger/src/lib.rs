//! # tally-ledger: Inventory Consistency Core for Tally POS
//!
//! Keeps every product's `stock_quantity` equal to the sum of its
//! append-only ledger, across sales, cancellations and manual movements,
//! and tells connected clients about each committed change.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  request layer (HTTP / realtime, outside this workspace)               │
//! │       │ validated ids, quantities, Money, actor                         │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   tally-ledger (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   Ledger ─┬─► SaleManager ──┐                                   │   │
//! │  │           │                 ├─► LockTable ─► one transaction    │   │
//! │  │           ├─► InventoryEngine                     │             │   │
//! │  │           │                                       ▼ commit      │   │
//! │  │           └─► BroadcastNotifier ◄──── publish ChangeEvents      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tally-db (SQLite ledger store)                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_ledger::{Ledger, LedgerConfig, MovementRequest};
//! use tally_core::ChangeType;
//!
//! let ledger = Ledger::open(&LedgerConfig::load(None)?).await?;
//! let mut updates = ledger.subscribe();
//!
//! let outcome = ledger
//!     .engine()
//!     .apply_movement(MovementRequest {
//!         product_id: id.clone(),
//!         change_type: ChangeType::Increase,
//!         quantity: 24,
//!         reason: "Delivery".into(),
//!         actor: "admin".into(),
//!         reference: None,
//!     })
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod notifier;
pub mod retry;
pub mod sales;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::LedgerConfig;
pub use engine::{InventoryEngine, MovementOutcome, MovementRequest};
pub use error::{ConfigError, LedgerError, LedgerResult};
pub use locks::LockTable;
pub use notifier::{BroadcastNotifier, ChangeNotifier, NoopNotifier, Notification, Subscription};
pub use retry::RetryPolicy;
pub use sales::{CancelOutcome, SaleManager};
pub use tally_db::SaleFilter;

use std::sync::Arc;

use tally_db::Database;
use tracing::info;

// =============================================================================
// Facade
// =============================================================================

/// The wired-up core: one store, one lock table, one notifier, shared by
/// the engine and the sale manager.
#[derive(Clone)]
pub struct Ledger {
    db: Database,
    engine: InventoryEngine,
    sales: SaleManager,
    notifier: Arc<BroadcastNotifier>,
}

impl Ledger {
    /// Opens (and migrates) the configured store.
    pub async fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        let db = Database::new(config.db_config()).await?;
        Ok(Self::with_database(db, config))
    }

    /// A fresh in-memory ledger with default settings.
    pub async fn in_memory() -> LedgerResult<Self> {
        Self::open(&LedgerConfig::in_memory()).await
    }

    /// Wires the components over an existing store.
    pub fn with_database(db: Database, config: &LedgerConfig) -> Self {
        let locks = Arc::new(LockTable::new());
        let notifier = Arc::new(BroadcastNotifier::new(config.notifier.channel_capacity));
        let retry = config.retry_policy();

        let engine = InventoryEngine::new(
            db.clone(),
            locks.clone(),
            notifier.clone(),
            retry.clone(),
        );
        let sales = SaleManager::new(
            db.clone(),
            locks,
            notifier.clone(),
            retry,
            config.sales.code_attempts,
        );

        info!(
            channel_capacity = config.notifier.channel_capacity,
            max_attempts = config.retry.max_attempts,
            "Ledger ready"
        );

        Ledger {
            db,
            engine,
            sales,
            notifier,
        }
    }

    pub fn engine(&self) -> &InventoryEngine {
        &self.engine
    }

    pub fn sales(&self) -> &SaleManager {
        &self.sales
    }

    pub fn notifier(&self) -> &BroadcastNotifier {
        &self.notifier
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Shorthand for `notifier().subscribe()`.
    pub fn subscribe(&self) -> Subscription {
        self.notifier.subscribe()
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{ChangeEvent, ChangeType, Money, NewProduct, NewSale, NewSaleItem, SaleStatus};

    #[tokio::test]
    async fn test_facade_end_to_end() {
        let ledger = Ledger::in_memory().await.unwrap();
        assert!(ledger.database().health_check().await);

        let product = ledger
            .engine()
            .register_product(
                NewProduct {
                    name: "Espresso Beans".into(),
                    price: Money::from_cents(1299),
                    ..Default::default()
                },
                30,
                "admin",
            )
            .await
            .unwrap();

        let mut updates = ledger.subscribe();
        assert_eq!(ledger.notifier().subscriber_count(), 1);

        let sale = ledger
            .sales()
            .create_sale(NewSale {
                customer_id: None,
                actor: "cashier".into(),
                payment_method: Default::default(),
                discount: Money::zero(),
                tax: Money::zero(),
                total: None,
                notes: Some("window seat".into()),
                status: SaleStatus::Completed,
                items: vec![NewSaleItem {
                    product_id: product.id.clone(),
                    quantity: 4,
                    unit_price: None,
                }],
            })
            .await
            .unwrap();
        assert_eq!(sale.item_count(), 4);

        match updates.recv().await {
            Some(Notification::Event(ChangeEvent::StockChanged { delta, new_quantity, .. })) => {
                assert_eq!((delta, new_quantity), (-4, 26));
            }
            other => panic!("unexpected: {:?}", other),
        }
        match updates.recv().await {
            Some(Notification::Event(ChangeEvent::SaleStatusChanged { new_status, .. })) => {
                assert_eq!(new_status, SaleStatus::Completed);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let outcome = ledger
            .engine()
            .apply_movement(MovementRequest {
                product_id: product.id.clone(),
                change_type: ChangeType::Adjustment,
                quantity: 20,
                reason: "Stock count".into(),
                actor: "admin".into(),
                reference: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.log_entry.quantity_change, -6);

        updates.unsubscribe();
        assert_eq!(ledger.notifier().subscriber_count(), 0);

        assert!(ledger.engine().verify_ledger(&product.id).await.unwrap().is_consistent());
        ledger.close().await;
    }

    #[tokio::test]
    async fn test_open_file_store_from_config() {
        let path = std::env::temp_dir().join(format!("tally-{}.db", uuid::Uuid::new_v4()));
        let mut config = LedgerConfig::default();
        config.database.path = path.clone();

        let ledger = Ledger::open(&config).await.unwrap();
        assert!(ledger.database().health_check().await);
        ledger.close().await;

        // Reopening runs migrations again without error.
        let ledger = Ledger::open(&config).await.unwrap();
        ledger.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
