//! # Inventory Engine
//!
//! The only writer of `products.stock_quantity`. Every stock change is one
//! movement: a compare-and-set on the product row plus one appended ledger
//! row, in the same transaction.
//!
//! ## Movement Flow
//! ```text
//! apply_movement(request)
//!   │
//!   ├─ validate (actor, reason, quantity ≥ 0)
//!   │
//!   └─ retry on Conflict ──────────────────────────────────────────┐
//!        │                                                          │
//!        ├─ lock product (in-process)                               │
//!        ├─ BEGIN                                                   │
//!        ├─ read stock            ──► previous                      │
//!        ├─ plan_movement         ──► new / delta, or Insufficient  │
//!        ├─ UPDATE … WHERE stock = previous   (0 rows ⇒ Conflict) ──┘
//!        ├─ INSERT inventory_logs
//!        └─ COMMIT
//!   │
//!   └─ publish StockChanged (+ LowStockWarning)
//! ```
//!
//! The lock serializes writers in this process. The compare-and-set and
//! SQLite's own write lock catch writers in other processes sharing the
//! file.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tally_core::movement::plan_movement;
use tally_core::validation::{
    validate_actor, validate_movement_quantity, validate_new_product, validate_product_update,
    validate_reason, validate_search_query,
};
use tally_core::{
    ChangeEvent, ChangeType, InventoryLog, LedgerAudit, MovementPlan, NewProduct, Product,
    ProductUpdate, ValidationError, DEFAULT_MIN_STOCK,
};
use tally_db::repository::product::generate_product_id;
use tally_db::{Database, DbError, InventoryLogRepository, NewInventoryLog, ProductRepository};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::locks::LockTable;
use crate::notifier::ChangeNotifier;
use crate::retry::RetryPolicy;

/// Reason recorded on the first ledger row of a newly registered product.
pub const OPENING_STOCK_REASON: &str = "Opening stock";

// =============================================================================
// Request / Outcome
// =============================================================================

/// One stock movement as asked for by the request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: String,
    pub change_type: ChangeType,
    /// Units moved; for `adjustment` the absolute new stock.
    pub quantity: i64,
    pub reason: String,
    pub actor: String,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Result of a committed movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementOutcome {
    pub new_quantity: i64,
    pub log_entry: InventoryLog,
    /// Stock went down and is now at or below `min_stock`.
    pub low_stock: bool,
}

// =============================================================================
// Transactional core (shared with the sale manager)
// =============================================================================

pub(crate) struct MovementInput<'a> {
    pub product_id: &'a str,
    pub change_type: ChangeType,
    pub quantity: i64,
    pub reason: &'a str,
    pub reference: Option<&'a str>,
    pub actor: &'a str,
}

/// A movement written inside a not-yet-committed transaction.
#[derive(Debug, Clone)]
pub(crate) struct AppliedMovement {
    /// The product row as read before the movement.
    pub product: Product,
    pub plan: MovementPlan,
    pub log: InventoryLog,
    pub low_stock: bool,
}

impl AppliedMovement {
    /// Events to publish once the transaction commits.
    pub(crate) fn events(&self) -> Vec<ChangeEvent> {
        let mut events = vec![ChangeEvent::StockChanged {
            product_id: self.product.id.clone(),
            product_name: self.product.name.clone(),
            sku: self.product.sku.clone(),
            delta: self.plan.quantity_change,
            new_quantity: self.plan.new_quantity,
            previous_quantity: self.plan.previous_quantity,
            reason: self.log.reason.clone(),
            actor: self.log.actor.clone(),
        }];

        if self.low_stock {
            events.push(ChangeEvent::LowStockWarning {
                product_id: self.product.id.clone(),
                product_name: self.product.name.clone(),
                quantity: self.plan.new_quantity,
                min_stock: self.product.min_stock,
            });
        }

        events
    }
}

/// Applies one movement on `conn`. The caller owns the transaction and
/// the product lock.
pub(crate) async fn apply_in_tx(
    conn: &mut SqliteConnection,
    input: &MovementInput<'_>,
    now: DateTime<Utc>,
) -> LedgerResult<AppliedMovement> {
    let product = ProductRepository::find(conn, input.product_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Product", input.product_id))?;

    let plan = plan_movement(
        &product.sku,
        product.stock_quantity,
        input.change_type,
        input.quantity,
    )?;

    ProductRepository::set_stock(
        conn,
        &product.id,
        plan.previous_quantity,
        plan.new_quantity,
        now,
    )
    .await?;

    let log_id = Uuid::new_v4().to_string();
    let log = InventoryLogRepository::append(
        conn,
        &NewInventoryLog {
            id: &log_id,
            product_id: &product.id,
            change_type: input.change_type,
            quantity_change: plan.quantity_change,
            previous_quantity: plan.previous_quantity,
            new_quantity: plan.new_quantity,
            reason: input.reason,
            reference: input.reference,
            actor: input.actor,
            created_at: now,
        },
    )
    .await?;

    let low_stock = plan.is_low_stock(product.min_stock);

    debug!(
        product_id = %product.id,
        change_type = %input.change_type,
        previous = plan.previous_quantity,
        new = plan.new_quantity,
        low_stock,
        "Movement applied"
    );

    Ok(AppliedMovement {
        product,
        plan,
        log,
        low_stock,
    })
}

// =============================================================================
// Engine
// =============================================================================

/// Applies stock movements and answers ledger queries.
///
/// Cheap to clone; clones share locks and the notifier.
#[derive(Clone)]
pub struct InventoryEngine {
    db: Database,
    locks: Arc<LockTable>,
    notifier: Arc<dyn ChangeNotifier>,
    retry: RetryPolicy,
}

impl InventoryEngine {
    pub fn new(
        db: Database,
        locks: Arc<LockTable>,
        notifier: Arc<dyn ChangeNotifier>,
        retry: RetryPolicy,
    ) -> Self {
        InventoryEngine {
            db,
            locks,
            notifier,
            retry,
        }
    }

    /// Applies one movement and returns the new stock and its ledger row.
    ///
    /// ## Errors
    /// - `Validation` for a negative quantity, blank actor or reason
    /// - `NotFound` if the product does not exist
    /// - `InsufficientStock` if a subtracting movement would go below zero;
    ///   nothing is written
    /// - `Conflict` if concurrent writers kept winning past the retry budget
    pub async fn apply_movement(&self, request: MovementRequest) -> LedgerResult<MovementOutcome> {
        if request.product_id.trim().is_empty() {
            return Err(ValidationError::required("product_id").into());
        }
        validate_actor(&request.actor)?;
        validate_reason(&request.reason)?;
        validate_movement_quantity(request.quantity)?;

        let applied = self
            .retry
            .run("apply_movement", || self.apply_once(&request))
            .await?;

        info!(
            product_id = %request.product_id,
            change_type = %request.change_type,
            delta = applied.plan.quantity_change,
            new_quantity = applied.plan.new_quantity,
            actor = %request.actor,
            "Stock movement committed"
        );

        self.notifier.publish_all(applied.events());

        Ok(MovementOutcome {
            new_quantity: applied.plan.new_quantity,
            low_stock: applied.low_stock,
            log_entry: applied.log,
        })
    }

    async fn apply_once(&self, request: &MovementRequest) -> LedgerResult<AppliedMovement> {
        let _locks = self.locks.acquire([request.product_id.as_str()]).await;
        let mut tx = self.db.begin().await?;

        let applied = apply_in_tx(
            &mut tx,
            &MovementInput {
                product_id: &request.product_id,
                change_type: request.change_type,
                quantity: request.quantity,
                reason: &request.reason,
                reference: request.reference.as_deref(),
                actor: &request.actor,
            },
            Utc::now(),
        )
        .await?;

        tx.commit().await?;
        Ok(applied)
    }

    /// Creates a product. A positive `opening_stock` is booked as its first
    /// ledger row (`increase`, "Opening stock") in the same transaction.
    ///
    /// ## Errors
    /// - `Validation` for bad catalog fields or a negative opening stock
    /// - `Storage(UniqueViolation)` if the SKU is taken
    pub async fn register_product(
        &self,
        input: NewProduct,
        opening_stock: i64,
        actor: &str,
    ) -> LedgerResult<Product> {
        validate_new_product(&input)?;
        validate_movement_quantity(opening_stock)?;
        validate_actor(actor)?;

        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            name: input.name.trim().to_string(),
            description: input.description,
            sku: input.sku.map(|s| s.trim().to_string()).unwrap_or_else(generate_sku),
            category: input.category,
            price: input.price,
            cost_price: input.cost_price,
            stock_quantity: 0,
            min_stock: input.min_stock.unwrap_or(DEFAULT_MIN_STOCK),
            image_url: input.image_url,
            created_at: now,
            updated_at: now,
        };

        let (product, applied) = self
            .retry
            .run("register_product", || {
                self.register_once(&product, opening_stock, actor)
            })
            .await?;

        info!(
            product_id = %product.id,
            sku = %product.sku,
            opening_stock,
            "Product registered"
        );

        if let Some(applied) = applied {
            self.notifier.publish_all(applied.events());
        }

        Ok(product)
    }

    async fn register_once(
        &self,
        product: &Product,
        opening_stock: i64,
        actor: &str,
    ) -> LedgerResult<(Product, Option<AppliedMovement>)> {
        let _locks = self.locks.acquire([product.id.as_str()]).await;
        let mut tx = self.db.begin().await?;

        if ProductRepository::sku_exists(&mut tx, &product.sku).await? {
            return Err(LedgerError::Storage(DbError::duplicate("sku", &product.sku)));
        }
        ProductRepository::insert(&mut tx, product).await?;

        let applied = if opening_stock > 0 {
            Some(
                apply_in_tx(
                    &mut tx,
                    &MovementInput {
                        product_id: &product.id,
                        change_type: ChangeType::Increase,
                        quantity: opening_stock,
                        reason: OPENING_STOCK_REASON,
                        reference: None,
                        actor,
                    },
                    product.created_at,
                )
                .await?,
            )
        } else {
            None
        };

        let stored = ProductRepository::find(&mut tx, &product.id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Product", &product.id))?;

        tx.commit().await?;
        Ok((stored, applied))
    }

    /// Edits catalog fields. Stock is untouched.
    pub async fn update_product(&self, id: &str, update: ProductUpdate) -> LedgerResult<Product> {
        validate_product_update(&update)?;
        let product = self.db.products().update_details(id, &update).await?;
        info!(product_id = %id, "Product updated");
        Ok(product)
    }

    /// Removes a product. Its ledger rows and sale lines remain.
    pub async fn delete_product(&self, id: &str) -> LedgerResult<()> {
        let _locks = self.locks.acquire([id]).await;
        self.db.products().delete(id).await?;
        info!(product_id = %id, "Product deleted");
        Ok(())
    }

    pub async fn get_product(&self, id: &str) -> LedgerResult<Product> {
        self.db
            .products()
            .get_by_id(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Product", id))
    }

    /// Free-text search, optionally narrowed to one exact category.
    pub async fn search_products(
        &self,
        query: &str,
        category: Option<&str>,
        limit: u32,
    ) -> LedgerResult<Vec<Product>> {
        let query = validate_search_query(query)?;
        Ok(self.db.products().search(&query, category, limit).await?)
    }

    /// Distinct categories in use, for filter pickers.
    pub async fn product_categories(&self) -> LedgerResult<Vec<String>> {
        Ok(self.db.products().categories().await?)
    }

    /// Products at or below their reorder threshold.
    pub async fn low_stock_products(&self) -> LedgerResult<Vec<Product>> {
        Ok(self.db.products().list_low_stock().await?)
    }

    /// Every ledger row of a product, oldest first. Rows outlive the product.
    pub async fn movement_history(&self, product_id: &str) -> LedgerResult<Vec<InventoryLog>> {
        Ok(self.db.inventory_logs().list_for_product(product_id).await?)
    }

    /// Ledger rows written by one operation (e.g. all movements of a sale).
    pub async fn movements_by_reference(&self, reference: &str) -> LedgerResult<Vec<InventoryLog>> {
        Ok(self.db.inventory_logs().list_by_reference(reference).await?)
    }

    /// Replays a product's ledger against its stored stock, from one
    /// consistent snapshot.
    pub async fn verify_ledger(&self, product_id: &str) -> LedgerResult<LedgerAudit> {
        let mut tx = self.db.begin().await?;

        let product = ProductRepository::find(&mut tx, product_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Product", product_id))?;
        let logs = InventoryLogRepository::for_product(&mut tx, product_id).await?;

        tx.commit().await?;

        let audit = LedgerAudit::compute(product_id, product.stock_quantity, &logs);
        debug!(
            product_id,
            consistent = audit.is_consistent(),
            entries = audit.entries,
            "Ledger verified"
        );
        Ok(audit)
    }
}

/// `SKU-` followed by eight uppercase hex digits.
fn generate_sku() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("SKU-{}", &hex[..8])
}

// =============================================================================
// Unit Tests
// =============================================================================
