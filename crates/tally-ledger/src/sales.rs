//! # Sale Lifecycle Manager
//!
//! Creates, completes and cancels sales, keeping stock and the ledger in
//! step with each transition.
//!
//! ## State Machine
//! ```text
//!                 create_sale (status = pending | completed)
//!                        │
//!          ┌─────────────┴─────────────┐
//!          ▼                           ▼
//!      ┌─────────┐  complete_sale  ┌───────────┐
//!      │ pending │ ──────────────► │ completed │
//!      └────┬────┘                 └─────┬─────┘
//!           │          cancel_sale       │
//!           └─────────────┬──────────────┘
//!                         ▼
//!                   ┌───────────┐
//!                   │ cancelled │  (terminal)
//!                   └───────────┘
//! ```
//!
//! ## Stock Effects
//! - create: one `stock_out` per line, reason `Sale #<code>`
//! - cancel: one `return` per line, reason `Cancel sale #<code>`
//! - complete: none
//!
//! Every ledger row written for a sale carries the sale id as `reference`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::validation::{
    validate_actor, validate_new_customer, validate_new_sale, validate_search_query,
};
use tally_core::{
    ChangeEvent, ChangeType, Customer, CustomerSummary, InventoryLog, Money, NewCustomer,
    NewSale, Sale, SaleDetail, SaleItem, SaleStatus, SaleSummary, SaleTotals,
};
use tally_db::repository::sale::{generate_sale_code, generate_sale_id, generate_sale_item_id};
use tally_db::{CustomerRepository, Database, DbError, ProductRepository, SaleFilter, SaleRepository};
use tracing::{debug, info, warn};

use crate::engine::{apply_in_tx, AppliedMovement, MovementInput};
use crate::error::{LedgerError, LedgerResult};
use crate::locks::LockTable;
use crate::notifier::ChangeNotifier;
use crate::retry::RetryPolicy;

/// How many sales a customer summary lists.
pub const RECENT_SALES_LIMIT: u32 = 10;

/// Result of cancelling a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    /// The sale after cancellation.
    pub sale: SaleDetail,
    /// `return` ledger rows written, one per restocked line.
    pub returned: Vec<InventoryLog>,
    /// Lines whose product no longer exists; no stock was returned for them.
    pub skipped_items: Vec<SaleItem>,
}

/// Drives sales through their lifecycle.
#[derive(Clone)]
pub struct SaleManager {
    db: Database,
    locks: Arc<LockTable>,
    notifier: Arc<dyn ChangeNotifier>,
    retry: RetryPolicy,
    code_attempts: u32,
}

impl SaleManager {
    pub fn new(
        db: Database,
        locks: Arc<LockTable>,
        notifier: Arc<dyn ChangeNotifier>,
        retry: RetryPolicy,
        code_attempts: u32,
    ) -> Self {
        SaleManager {
            db,
            locks,
            notifier,
            retry,
            code_attempts: code_attempts.max(1),
        }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Records a sale and takes its stock, all or nothing.
    ///
    /// ## Errors
    /// - `Validation` for malformed input
    /// - `NotFound` for an unknown product or customer
    /// - `InsufficientStock` for the first line that cannot be served;
    ///   no line is applied
    /// - `Conflict` if no free sale code was found or concurrent writers
    ///   kept winning
    pub async fn create_sale(&self, input: NewSale) -> LedgerResult<SaleDetail> {
        validate_new_sale(&input)?;

        let (detail, movements) = self
            .retry
            .run("create_sale", || self.create_once(&input))
            .await?;

        info!(
            sale_id = %detail.sale.id,
            sale_code = %detail.sale.sale_code,
            status = %detail.sale.status,
            items = detail.items.len(),
            total = %detail.sale.total_amount,
            "Sale created"
        );

        self.publish_transition(&detail.sale, &input.actor, &movements);
        Ok(detail)
    }

    async fn create_once(&self, input: &NewSale) -> LedgerResult<(SaleDetail, Vec<AppliedMovement>)> {
        let _locks = self
            .locks
            .acquire(input.items.iter().map(|i| i.product_id.as_str()))
            .await;
        let mut tx = self.db.begin().await?;
        let now = Utc::now();

        if let Some(customer_id) = &input.customer_id {
            if CustomerRepository::find(&mut tx, customer_id).await?.is_none() {
                return Err(LedgerError::not_found("Customer", customer_id));
            }
        }

        // Price every line before anything is written.
        let mut lines: Vec<(i64, Money)> = Vec::with_capacity(input.items.len());
        for item in &input.items {
            let product = ProductRepository::find(&mut tx, &item.product_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("Product", &item.product_id))?;
            lines.push((item.quantity, item.unit_price.unwrap_or(product.price)));
        }
        let totals = SaleTotals::compute(&lines, input.discount, input.tax, input.total)?;

        let sale_code = self.allocate_sale_code(&mut tx, now).await?;
        let sale = Sale {
            id: generate_sale_id(),
            sale_code,
            customer_id: input.customer_id.clone(),
            actor: input.actor.trim().to_string(),
            subtotal: totals.subtotal,
            discount: totals.discount,
            tax: totals.tax,
            total_amount: totals.total,
            payment_method: input.payment_method,
            status: input.status,
            sale_date: now,
            notes: input.notes.clone(),
            updated_at: now,
        };

        SaleRepository::insert(&mut tx, &sale)
            .await
            .map_err(|e| match e {
                DbError::UniqueViolation { .. } => {
                    LedgerError::Conflict(format!("sale code {} was taken", sale.sale_code))
                }
                other => other.into(),
            })?;

        let reason = format!("Sale #{}", sale.sale_code);
        let mut movements = Vec::with_capacity(input.items.len());

        for (item, (quantity, unit_price)) in input.items.iter().zip(&lines) {
            let applied = apply_in_tx(
                &mut tx,
                &MovementInput {
                    product_id: &item.product_id,
                    change_type: ChangeType::StockOut,
                    quantity: *quantity,
                    reason: &reason,
                    reference: Some(sale.id.as_str()),
                    actor: &sale.actor,
                },
                now,
            )
            .await?;

            SaleRepository::insert_item(
                &mut tx,
                &SaleItem {
                    id: generate_sale_item_id(),
                    sale_id: sale.id.clone(),
                    product_id: item.product_id.clone(),
                    sku_snapshot: applied.product.sku.clone(),
                    name_snapshot: applied.product.name.clone(),
                    quantity: *quantity,
                    unit_price: *unit_price,
                    total_price: unit_price.multiply_quantity(*quantity),
                },
            )
            .await?;

            movements.push(applied);
        }

        let items = SaleRepository::items_for(&mut tx, &sale.id).await?;
        tx.commit().await?;

        Ok((SaleDetail { sale, items }, movements))
    }

    /// Draws random codes until one is free.
    async fn allocate_sale_code(
        &self,
        conn: &mut sqlx::SqliteConnection,
        now: DateTime<Utc>,
    ) -> LedgerResult<String> {
        for attempt in 1..=self.code_attempts {
            let code = generate_sale_code(now);
            if !SaleRepository::code_exists(conn, &code).await? {
                return Ok(code);
            }
            debug!(code = %code, attempt, "Sale code collision");
        }

        Err(LedgerError::Conflict(format!(
            "no free sale code after {} attempts",
            self.code_attempts
        )))
    }

    // =========================================================================
    // Cancel
    // =========================================================================

    /// Cancels a sale and returns its stock.
    ///
    /// Lines whose product has since been deleted are skipped and reported
    /// in [`CancelOutcome::skipped_items`].
    ///
    /// ## Errors
    /// - `NotFound` if the sale does not exist
    /// - `AlreadyCancelled` if it was cancelled before; stock is untouched
    pub async fn cancel_sale(&self, sale_id: &str, actor: &str) -> LedgerResult<CancelOutcome> {
        validate_actor(actor)?;

        let (outcome, movements) = self
            .retry
            .run("cancel_sale", || self.cancel_once(sale_id, actor))
            .await?;

        for item in &outcome.skipped_items {
            warn!(
                sale_code = %outcome.sale.sale.sale_code,
                product_id = %item.product_id,
                sku = %item.sku_snapshot,
                quantity = item.quantity,
                "Product no longer exists, stock not returned"
            );
        }
        info!(
            sale_id = %sale_id,
            sale_code = %outcome.sale.sale.sale_code,
            returned = outcome.returned.len(),
            skipped = outcome.skipped_items.len(),
            actor = %actor,
            "Sale cancelled"
        );

        self.publish_transition(&outcome.sale.sale, actor, &movements);
        Ok(outcome)
    }

    async fn cancel_once(
        &self,
        sale_id: &str,
        actor: &str,
    ) -> LedgerResult<(CancelOutcome, Vec<AppliedMovement>)> {
        // Items never change after creation, so the lock keys can be read
        // before the locks are held.
        let planned = self.db.sales().get_items(sale_id).await?;
        let keys = std::iter::once(LockTable::sale_key(sale_id))
            .chain(planned.iter().map(|i| i.product_id.clone()));
        let _locks = self.locks.acquire(keys).await;

        let mut tx = self.db.begin().await?;
        let now = Utc::now();

        let sale = SaleRepository::find(&mut tx, sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        sale.status.ensure_can_cancel(&sale.sale_code)?;

        let items = SaleRepository::items_for(&mut tx, sale_id).await?;
        let reason = format!("Cancel sale #{}", sale.sale_code);

        let mut movements = Vec::with_capacity(items.len());
        let mut skipped_items = Vec::new();

        for item in &items {
            if ProductRepository::find(&mut tx, &item.product_id).await?.is_none() {
                skipped_items.push(item.clone());
                continue;
            }

            let applied = apply_in_tx(
                &mut tx,
                &MovementInput {
                    product_id: &item.product_id,
                    change_type: ChangeType::Return,
                    quantity: item.quantity,
                    reason: &reason,
                    reference: Some(sale.id.as_str()),
                    actor,
                },
                now,
            )
            .await?;
            movements.push(applied);
        }

        SaleRepository::set_status(&mut tx, sale_id, sale.status, SaleStatus::Cancelled, now).await?;
        let sale = SaleRepository::find(&mut tx, sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;

        tx.commit().await?;

        let outcome = CancelOutcome {
            sale: SaleDetail { sale, items },
            returned: movements.iter().map(|m| m.log.clone()).collect(),
            skipped_items,
        };
        Ok((outcome, movements))
    }

    // =========================================================================
    // Complete
    // =========================================================================

    /// Confirms a pending sale. No stock effects.
    ///
    /// ## Errors
    /// - `AlreadyCompleted` if it is already completed
    /// - `AlreadyCancelled` if it was cancelled
    pub async fn complete_sale(&self, sale_id: &str, actor: &str) -> LedgerResult<SaleDetail> {
        validate_actor(actor)?;

        let detail = self
            .retry
            .run("complete_sale", || self.complete_once(sale_id))
            .await?;

        info!(
            sale_id = %sale_id,
            sale_code = %detail.sale.sale_code,
            actor = %actor,
            "Sale completed"
        );

        self.publish_transition(&detail.sale, actor, &[]);
        Ok(detail)
    }

    async fn complete_once(&self, sale_id: &str) -> LedgerResult<SaleDetail> {
        let _locks = self.locks.acquire([LockTable::sale_key(sale_id)]).await;
        let mut tx = self.db.begin().await?;

        let sale = SaleRepository::find(&mut tx, sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        sale.status.ensure_can_complete(&sale.sale_code)?;

        SaleRepository::set_status(&mut tx, sale_id, sale.status, SaleStatus::Completed, Utc::now())
            .await?;

        let sale = SaleRepository::find(&mut tx, sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        let items = SaleRepository::items_for(&mut tx, sale_id).await?;

        tx.commit().await?;
        Ok(SaleDetail { sale, items })
    }

    // =========================================================================
    // Read side
    // =========================================================================

    /// A sale with its items.
    pub async fn get_sale(&self, sale_id: &str) -> LedgerResult<SaleDetail> {
        self.db
            .sales()
            .get_detail(sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))
    }

    pub async fn get_sale_by_code(&self, sale_code: &str) -> LedgerResult<SaleDetail> {
        let sale = self
            .db
            .sales()
            .get_by_code(sale_code)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_code))?;
        let items = self.db.sales().get_items(&sale.id).await?;
        Ok(SaleDetail { sale, items })
    }

    /// Sale headers matching `filter`, newest first.
    pub async fn list_sales(&self, filter: &SaleFilter) -> LedgerResult<Vec<Sale>> {
        Ok(self.db.sales().list(filter).await?)
    }

    /// Totals over `[from, to)`, cancelled sales excluded.
    pub async fn sales_summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> LedgerResult<SaleSummary> {
        Ok(self.db.sales().summary(from, to).await?)
    }

    // =========================================================================
    // Customers
    // =========================================================================

    pub async fn register_customer(&self, input: NewCustomer) -> LedgerResult<Customer> {
        validate_new_customer(&input)?;
        let customer = self.db.customers().create(&input).await?;
        info!(customer_id = %customer.id, "Customer registered");
        Ok(customer)
    }

    pub async fn get_customer(&self, customer_id: &str) -> LedgerResult<Customer> {
        self.db
            .customers()
            .get_by_id(customer_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Customer", customer_id))
    }

    /// Customers by name, optionally narrowed by a name/email/phone substring.
    pub async fn list_customers(
        &self,
        search: Option<&str>,
        limit: u32,
    ) -> LedgerResult<Vec<Customer>> {
        let search = search.map(validate_search_query).transpose()?;
        Ok(self.db.customers().list(search.as_deref(), limit).await?)
    }

    /// The customer with lifetime spend, average order value and their
    /// most recent sales.
    pub async fn customer_summary(&self, customer_id: &str) -> LedgerResult<CustomerSummary> {
        let customer = self.get_customer(customer_id).await?;
        let totals = self.db.sales().summary_for_customer(customer_id).await?;
        let recent_sales = self
            .db
            .sales()
            .list(&SaleFilter {
                customer_id: Some(customer_id.to_string()),
                limit: Some(RECENT_SALES_LIMIT),
                ..Default::default()
            })
            .await?;

        debug!(
            customer_id = %customer_id,
            transactions = totals.transactions,
            "Customer summary built"
        );

        Ok(CustomerSummary {
            customer,
            totals,
            recent_sales,
        })
    }

    /// Deletes a customer. Their sales stay, without a customer reference.
    pub async fn delete_customer(&self, customer_id: &str) -> LedgerResult<()> {
        self.db.customers().delete(customer_id).await?;
        info!(customer_id = %customer_id, "Customer deleted");
        Ok(())
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Movement events in ledger order, then the status change.
    fn publish_transition(&self, sale: &Sale, actor: &str, movements: &[AppliedMovement]) {
        let mut events: Vec<ChangeEvent> = movements.iter().flat_map(|m| m.events()).collect();
        events.push(ChangeEvent::SaleStatusChanged {
            sale_id: sale.id.clone(),
            sale_code: sale.sale_code.clone(),
            new_status: sale.status,
            actor: actor.to_string(),
        });
        self.notifier.publish_all(events);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InventoryEngine, MovementRequest};
    use crate::notifier::{BroadcastNotifier, Notification};
    use tally_core::{NewProduct, NewSaleItem, PaymentMethod, Product};
    use tally_db::DbConfig;

    struct Fixture {
        engine: InventoryEngine,
        sales: SaleManager,
        notifier: Arc<BroadcastNotifier>,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let locks = Arc::new(LockTable::new());
        let notifier = Arc::new(BroadcastNotifier::new(64));
        Fixture {
            engine: InventoryEngine::new(
                db.clone(),
                locks.clone(),
                notifier.clone(),
                RetryPolicy::default(),
            ),
            sales: SaleManager::new(db, locks, notifier.clone(), RetryPolicy::default(), 10),
            notifier,
        }
    }

    async fn product(f: &Fixture, name: &str, price_cents: i64, stock: i64) -> Product {
        f.engine
            .register_product(
                NewProduct {
                    name: name.into(),
                    price: Money::from_cents(price_cents),
                    min_stock: Some(2),
                    ..Default::default()
                },
                stock,
                "admin",
            )
            .await
            .unwrap()
    }

    fn sale_of(items: &[(&Product, i64)]) -> NewSale {
        NewSale {
            customer_id: None,
            actor: "cashier".into(),
            payment_method: PaymentMethod::Cash,
            discount: Money::zero(),
            tax: Money::zero(),
            total: None,
            notes: None,
            status: SaleStatus::Completed,
            items: items
                .iter()
                .map(|(p, qty)| NewSaleItem {
                    product_id: p.id.clone(),
                    quantity: *qty,
                    unit_price: None,
                })
                .collect(),
        }
    }

    async fn stock(f: &Fixture, p: &Product) -> i64 {
        f.engine.get_product(&p.id).await.unwrap().stock_quantity
    }

    #[tokio::test]
    async fn test_create_then_cancel_round_trip() {
        let f = fixture().await;
        let tea = product(&f, "Tea", 150, 10).await;

        let detail = f.sales.create_sale(sale_of(&[(&tea, 2)])).await.unwrap();
        assert_eq!(detail.sale.status, SaleStatus::Completed);
        assert_eq!(detail.sale.subtotal, Money::from_cents(300));
        assert_eq!(detail.sale.total_amount, Money::from_cents(300));
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].sku_snapshot, tea.sku);
        assert!(detail.sale.sale_code.starts_with("SALE-"));
        assert_eq!(stock(&f, &tea).await, 8);

        let outcome = f.sales.cancel_sale(&detail.sale.id, "manager").await.unwrap();
        assert_eq!(outcome.sale.sale.status, SaleStatus::Cancelled);
        assert!(outcome.skipped_items.is_empty());
        assert_eq!(stock(&f, &tea).await, 10);

        let logs = f.engine.movements_by_reference(&detail.sale.id).await.unwrap();
        let shape: Vec<(ChangeType, i64)> =
            logs.iter().map(|l| (l.change_type, l.quantity_change)).collect();
        assert_eq!(shape, vec![(ChangeType::StockOut, -2), (ChangeType::Return, 2)]);
        assert_eq!(logs[0].reason, format!("Sale #{}", detail.sale.sale_code));
        assert_eq!(logs[1].reason, format!("Cancel sale #{}", detail.sale.sale_code));
        assert_eq!(logs[1].actor, "manager");

        assert!(f.engine.verify_ledger(&tea.id).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_insufficient_line_rolls_back_whole_sale() {
        let f = fixture().await;
        let a = product(&f, "A", 100, 5).await;
        let b = product(&f, "B", 100, 1).await;

        let err = f
            .sales
            .create_sale(sale_of(&[(&a, 3), (&b, 2)]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { available: 1, requested: 2, .. }));

        assert_eq!(stock(&f, &a).await, 5);
        assert_eq!(stock(&f, &b).await, 1);
        assert_eq!(f.engine.movement_history(&a.id).await.unwrap().len(), 1);
        assert!(f.sales.list_sales(&SaleFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_double_cancel_restores_once() {
        let f = fixture().await;
        let p = product(&f, "Cola", 120, 4).await;
        let sale = f.sales.create_sale(sale_of(&[(&p, 3)])).await.unwrap();

        f.sales.cancel_sale(&sale.sale.id, "manager").await.unwrap();
        let err = f.sales.cancel_sale(&sale.sale.id, "manager").await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyCancelled { .. }));

        assert_eq!(stock(&f, &p).await, 4);
        assert_eq!(f.engine.movement_history(&p.id).await.unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cancels_return_stock_once() {
        let f = fixture().await;
        let p = product(&f, "Chips", 90, 5).await;
        let sale = f.sales.create_sale(sale_of(&[(&p, 5)])).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let sales = f.sales.clone();
            let id = sale.sale.id.clone();
            handles.push(tokio::spawn(async move { sales.cancel_sale(&id, "manager").await }));
        }

        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(LedgerError::AlreadyCancelled { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(stock(&f, &p).await, 5);
    }

    #[tokio::test]
    async fn test_pending_complete_transitions() {
        let f = fixture().await;
        let p = product(&f, "Pen", 50, 10).await;
        let mut input = sale_of(&[(&p, 1)]);
        input.status = SaleStatus::Pending;

        let sale = f.sales.create_sale(input).await.unwrap();
        assert_eq!(sale.sale.status, SaleStatus::Pending);
        // Stock is taken at creation, not at completion.
        assert_eq!(stock(&f, &p).await, 9);

        let done = f.sales.complete_sale(&sale.sale.id, "manager").await.unwrap();
        assert_eq!(done.sale.status, SaleStatus::Completed);
        assert_eq!(stock(&f, &p).await, 9);

        let err = f.sales.complete_sale(&sale.sale.id, "manager").await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyCompleted { .. }));

        f.sales.cancel_sale(&sale.sale.id, "manager").await.unwrap();
        let err = f.sales.complete_sale(&sale.sale.id, "manager").await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyCancelled { .. }));
    }

    #[tokio::test]
    async fn test_cancel_skips_deleted_products() {
        let f = fixture().await;
        let keep = product(&f, "Keep", 100, 5).await;
        let gone = product(&f, "Gone", 100, 5).await;
        let sale = f
            .sales
            .create_sale(sale_of(&[(&keep, 1), (&gone, 2)]))
            .await
            .unwrap();

        f.engine.delete_product(&gone.id).await.unwrap();

        let outcome = f.sales.cancel_sale(&sale.sale.id, "manager").await.unwrap();
        assert_eq!(outcome.returned.len(), 1);
        assert_eq!(outcome.skipped_items.len(), 1);
        assert_eq!(outcome.skipped_items[0].product_id, gone.id);
        assert_eq!(outcome.sale.sale.status, SaleStatus::Cancelled);
        assert_eq!(stock(&f, &keep).await, 5);
    }

    #[tokio::test]
    async fn test_totals_with_discount_tax_and_override_price() {
        let f = fixture().await;
        let p = product(&f, "Cake", 1000, 10).await;
        let mut input = sale_of(&[(&p, 2)]);
        input.items[0].unit_price = Some(Money::from_cents(900));
        input.discount = Money::from_cents(100);
        input.tax = Money::from_cents(50);

        let sale = f.sales.create_sale(input).await.unwrap();
        assert_eq!(sale.sale.subtotal, Money::from_cents(1800));
        assert_eq!(sale.sale.total_amount, Money::from_cents(1750));
        assert_eq!(sale.items[0].total_price, Money::from_cents(1800));
    }

    #[tokio::test]
    async fn test_validation_and_missing_references() {
        let f = fixture().await;
        let p = product(&f, "Gum", 20, 10).await;

        let mut cancelled = sale_of(&[(&p, 1)]);
        cancelled.status = SaleStatus::Cancelled;
        assert!(matches!(
            f.sales.create_sale(cancelled).await,
            Err(LedgerError::Validation(_))
        ));

        let mut zero = sale_of(&[(&p, 1)]);
        zero.items[0].quantity = 0;
        assert!(matches!(f.sales.create_sale(zero).await, Err(LedgerError::Validation(_))));

        let mut ghost_customer = sale_of(&[(&p, 1)]);
        ghost_customer.customer_id = Some(uuid::Uuid::new_v4().to_string());
        assert!(matches!(
            f.sales.create_sale(ghost_customer).await,
            Err(LedgerError::NotFound { .. })
        ));

        let mut ghost_product = sale_of(&[(&p, 1)]);
        ghost_product.items[0].product_id = uuid::Uuid::new_v4().to_string();
        assert!(matches!(
            f.sales.create_sale(ghost_product).await,
            Err(LedgerError::NotFound { .. })
        ));

        assert_eq!(stock(&f, &p).await, 10);
        assert!(matches!(
            f.sales.cancel_sale(&uuid::Uuid::new_v4().to_string(), "manager").await,
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_events_follow_commit_order() {
        let f = fixture().await;
        let p = product(&f, "Water", 80, 3).await;
        let mut sub = f.notifier.subscribe();

        let sale = f.sales.create_sale(sale_of(&[(&p, 2)])).await.unwrap();

        let mut kinds = Vec::new();
        while let Some(Notification::Event(event)) = sub.try_recv() {
            kinds.push(event.kind());
        }
        // 3 → 1 with min_stock 2
        assert_eq!(kinds, vec!["stock_changed", "low_stock_warning", "sale_status_changed"]);

        f.sales.cancel_sale(&sale.sale.id, "manager").await.unwrap();
        let mut kinds = Vec::new();
        while let Some(Notification::Event(event)) = sub.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(kinds, vec!["stock_changed", "sale_status_changed"]);
    }

    #[tokio::test]
    async fn test_summary_excludes_cancelled() {
        let f = fixture().await;
        let p = product(&f, "Bun", 200, 20).await;

        f.sales.create_sale(sale_of(&[(&p, 1)])).await.unwrap();
        f.sales.create_sale(sale_of(&[(&p, 3)])).await.unwrap();
        let cancelled = f.sales.create_sale(sale_of(&[(&p, 5)])).await.unwrap();
        f.sales.cancel_sale(&cancelled.sale.id, "manager").await.unwrap();

        let summary = f.sales.sales_summary(None, None).await.unwrap();
        assert_eq!(summary.transactions, 2);
        assert_eq!(summary.items_sold, 4);
        assert_eq!(summary.total_amount, Money::from_cents(800));
        assert_eq!(summary.average_sale, Money::from_cents(400));

        let by_code = f.sales.get_sale_by_code(&cancelled.sale.sale_code).await.unwrap();
        assert_eq!(by_code.sale.status, SaleStatus::Cancelled);

        let filter = SaleFilter {
            status: Some(SaleStatus::Cancelled),
            ..Default::default()
        };
        let listed = f.sales.list_sales(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_customer_delete_keeps_sale() {
        let f = fixture().await;
        let p = product(&f, "Tape", 300, 5).await;
        let customer = f
            .sales
            .register_customer(NewCustomer {
                name: "Corner Cafe".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut input = sale_of(&[(&p, 1)]);
        input.customer_id = Some(customer.id.clone());
        let sale = f.sales.create_sale(input).await.unwrap();
        assert_eq!(sale.sale.customer_id.as_deref(), Some(customer.id.as_str()));

        f.sales.delete_customer(&customer.id).await.unwrap();
        let after = f.sales.get_sale(&sale.sale.id).await.unwrap();
        assert_eq!(after.sale.customer_id, None);
        assert_eq!(after.items.len(), 1);
    }

    #[tokio::test]
    async fn test_customer_summary_and_lookup() {
        let f = fixture().await;
        let p = product(&f, "Milk", 250, 50).await;
        let ana = f
            .sales
            .register_customer(NewCustomer {
                name: "Ana Ruiz".into(),
                email: Some("ana@example.com".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let other = f
            .sales
            .register_customer(NewCustomer {
                name: "Bo Chen".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut kept = Vec::new();
        for qty in [1, 3] {
            let mut input = sale_of(&[(&p, qty)]);
            input.customer_id = Some(ana.id.clone());
            kept.push(f.sales.create_sale(input).await.unwrap());
        }
        let mut cancelled = sale_of(&[(&p, 4)]);
        cancelled.customer_id = Some(ana.id.clone());
        let cancelled = f.sales.create_sale(cancelled).await.unwrap();
        f.sales.cancel_sale(&cancelled.sale.id, "manager").await.unwrap();

        let mut elsewhere = sale_of(&[(&p, 2)]);
        elsewhere.customer_id = Some(other.id.clone());
        f.sales.create_sale(elsewhere).await.unwrap();
        f.sales.create_sale(sale_of(&[(&p, 5)])).await.unwrap();

        let summary = f.sales.customer_summary(&ana.id).await.unwrap();
        assert_eq!(summary.customer, ana);
        assert_eq!(summary.totals.transactions, 2);
        assert_eq!(summary.totals.items_sold, 4);
        assert_eq!(summary.total_spent(), Money::from_cents(1000));
        assert_eq!(summary.average_order_value(), Money::from_cents(500));
        // Recent sales show every status, newest first.
        assert_eq!(summary.recent_sales.len(), 3);
        assert_eq!(summary.recent_sales[0].id, cancelled.sale.id);
        assert!(summary
            .recent_sales
            .iter()
            .all(|s| s.customer_id.as_deref() == Some(ana.id.as_str())));

        let filter = SaleFilter {
            customer_id: Some(other.id.clone()),
            ..Default::default()
        };
        assert_eq!(f.sales.list_sales(&filter).await.unwrap().len(), 1);

        assert_eq!(f.sales.get_customer(&other.id).await.unwrap().name, "Bo Chen");
        assert_eq!(f.sales.list_customers(None, 10).await.unwrap().len(), 2);
        let hits = f.sales.list_customers(Some("example"), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, ana.id);

        let fresh = f.sales.customer_summary(&other.id).await.unwrap();
        assert_eq!(fresh.totals.transactions, 1);
        assert!(matches!(
            f.sales.customer_summary("no-such-customer").await,
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_customer_summary_lists_ten_most_recent() {
        let f = fixture().await;
        let p = product(&f, "Gum", 100, 50).await;
        let regular = f
            .sales
            .register_customer(NewCustomer {
                name: "Regular".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        for _ in 0..12 {
            let mut input = sale_of(&[(&p, 1)]);
            input.customer_id = Some(regular.id.clone());
            f.sales.create_sale(input).await.unwrap();
        }

        let summary = f.sales.customer_summary(&regular.id).await.unwrap();
        assert_eq!(summary.recent_sales.len(), RECENT_SALES_LIMIT as usize);
        assert_eq!(summary.totals.transactions, 12);
        assert_eq!(summary.total_spent(), Money::from_cents(1200));
    }

    #[tokio::test]
    async fn test_manual_movement_and_sale_share_ledger() {
        let f = fixture().await;
        let p = product(&f, "Nuts", 100, 4).await;

        f.engine
            .apply_movement(MovementRequest {
                product_id: p.id.clone(),
                change_type: ChangeType::Increase,
                quantity: 6,
                reason: "Delivery".into(),
                actor: "admin".into(),
                reference: Some("PO-17".into()),
            })
            .await
            .unwrap();
        f.sales.create_sale(sale_of(&[(&p, 7), (&p, 2)])).await.unwrap();

        let audit = f.engine.verify_ledger(&p.id).await.unwrap();
        assert_eq!(audit.stock_quantity, 1);
        assert_eq!(audit.entries, 4);
        assert!(audit.is_consistent());
    }
}
