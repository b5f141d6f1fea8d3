//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE (one transaction, driven by the sale manager)               │
//! │     └── code_exists() until a free sale_code is found                  │
//! │     └── insert() → Sale { status: Pending | Completed }                │
//! │     └── insert_item() per line, next to its stock_out ledger row       │
//! │                                                                         │
//! │  2. (OPTIONAL) COMPLETE                                                │
//! │     └── set_status(Pending → Completed)                                │
//! │                                                                         │
//! │  3. (OPTIONAL) CANCEL                                                  │
//! │     └── set_status(Pending|Completed → Cancelled), next to the return  │
//! │         ledger rows                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::{Money, Sale, SaleDetail, SaleItem, SaleStatus, SaleSummary, SALE_CODE_PREFIX};

macro_rules! select_sales {
    ($tail:literal) => {
        concat!(
            "SELECT id, sale_code, customer_id, actor, subtotal, discount, tax, total_amount, ",
            "payment_method, status, sale_date, notes, updated_at ",
            "FROM sales ",
            $tail
        )
    };
}

const SELECT_ITEMS: &str = "SELECT id, sale_id, product_id, sku_snapshot, name_snapshot, \
     quantity, unit_price, total_price FROM sale_items WHERE sale_id = ?1 ORDER BY rowid";

/// Filter for sale listings. All fields are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaleFilter {
    /// Substring of the sale code.
    pub search: Option<String>,
    /// Inclusive lower bound on `sale_date`.
    pub date_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `sale_date`.
    pub date_to: Option<DateTime<Utc>>,
    pub status: Option<SaleStatus>,
    /// Only sales made to this customer.
    pub customer_id: Option<String>,
    /// Default: 50
    pub limit: Option<u32>,
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale header by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Gets a sale header by its human-readable code.
    pub async fn get_by_code(&self, sale_code: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(select_sales!("WHERE sale_code = ?1"))
            .bind(sale_code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Gets a sale together with its items.
    pub async fn get_detail(&self, id: &str) -> DbResult<Option<SaleDetail>> {
        let mut conn = self.pool.acquire().await?;
        let Some(sale) = Self::find(&mut conn, id).await? else {
            return Ok(None);
        };
        let items = Self::items_for(&mut conn, id).await?;
        Ok(Some(SaleDetail { sale, items }))
    }

    /// Gets all items for a sale, in insertion order.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::items_for(&mut conn, sale_id).await
    }

    /// Lists sale headers, newest first.
    pub async fn list(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_uppercase()));
        let limit = filter.limit.unwrap_or(50);

        debug!(search = ?search, limit, "Listing sales");

        let sales = sqlx::query_as::<_, Sale>(select_sales!(
            "WHERE (?1 IS NULL OR upper(sale_code) LIKE ?1) \
               AND (?2 IS NULL OR sale_date >= ?2) \
               AND (?3 IS NULL OR sale_date < ?3) \
               AND (?4 IS NULL OR status = ?4) \
               AND (?5 IS NULL OR customer_id = ?5) \
             ORDER BY sale_date DESC, rowid DESC \
             LIMIT ?6"
        ))
        .bind(search)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(filter.status)
        .bind(&filter.customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Totals over non-cancelled sales in `[from, to)`.
    pub async fn summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<SaleSummary> {
        self.summarize(from, to, None).await
    }

    /// Lifetime totals over one customer's non-cancelled sales.
    pub async fn summary_for_customer(&self, customer_id: &str) -> DbResult<SaleSummary> {
        self.summarize(None, None, Some(customer_id)).await
    }

    async fn summarize(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        customer_id: Option<&str>,
    ) -> DbResult<SaleSummary> {
        debug!(from = ?from, to = ?to, customer_id = ?customer_id, "Summarizing sales");

        let (transactions, total): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(total_amount), 0)
            FROM sales
            WHERE status != 'cancelled'
              AND (?1 IS NULL OR sale_date >= ?1)
              AND (?2 IS NULL OR sale_date < ?2)
              AND (?3 IS NULL OR customer_id = ?3)
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        let items_sold: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(si.quantity), 0)
            FROM sale_items si
            INNER JOIN sales s ON s.id = si.sale_id
            WHERE s.status != 'cancelled'
              AND (?1 IS NULL OR s.sale_date >= ?1)
              AND (?2 IS NULL OR s.sale_date < ?2)
              AND (?3 IS NULL OR s.customer_id = ?3)
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SaleSummary::new(
            transactions,
            Money::from_cents(total),
            items_sold,
        ))
    }

    // =========================================================================
    // Transactional primitives
    // =========================================================================

    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(select_sales!("WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(sale)
    }

    pub async fn items_for(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(SELECT_ITEMS)
            .bind(sale_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(items)
    }

    /// True if `sale_code` is already taken.
    pub async fn code_exists(conn: &mut SqliteConnection, sale_code: &str) -> DbResult<bool> {
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sales WHERE sale_code = ?1)")
                .bind(sale_code)
                .fetch_one(&mut *conn)
                .await?;

        Ok(exists != 0)
    }

    /// Inserts a sale header.
    pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, sale_code = %sale.sale_code, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, sale_code, customer_id, actor,
                subtotal, discount, tax, total_amount,
                payment_method, status, sale_date, notes, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.sale_code)
        .bind(&sale.customer_id)
        .bind(&sale.actor)
        .bind(sale.subtotal)
        .bind(sale.discount)
        .bind(sale.tax)
        .bind(sale.total_amount)
        .bind(sale.payment_method)
        .bind(sale.status)
        .bind(sale.sale_date)
        .bind(&sale.notes)
        .bind(sale.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Adds an item to a sale.
    ///
    /// ## Snapshot Pattern
    /// Product sku and name are copied to the sale item, so the sale history
    /// survives product renames and deletions.
    pub async fn insert_item(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
        debug!(sale_id = %item.sale_id, product_id = %item.product_id, "Adding sale item");

        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, sku_snapshot, name_snapshot,
                quantity, unit_price, total_price
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.sku_snapshot)
        .bind(&item.name_snapshot)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_price)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Moves a sale from `from` to `to`.
    ///
    /// ## Returns
    /// * `Err(DbError::StaleWrite)` - the status is no longer `from`
    pub async fn set_status(
        conn: &mut SqliteConnection,
        sale_id: &str,
        from: SaleStatus,
        to: SaleStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(sale_id = %sale_id, from = %from, to = %to, "Updating sale status");

        let result = sqlx::query(
            "UPDATE sales SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(sale_id)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::stale("Sale", sale_id));
        }

        Ok(())
    }
}

/// Generates a sale code in format: `SALE-YYYYMMDD-NNNN`
///
/// NNNN is random; uniqueness is checked by the caller inside the
/// creating transaction.
pub fn generate_sale_code(date: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{}-{}-{:04}", SALE_CODE_PREFIX, date.format("%Y%m%d"), suffix)
}

/// Generates a new sale ID.
pub fn generate_sale_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new sale item ID.
pub fn generate_sale_item_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::{Duration, TimeZone};
    use tally_core::PaymentMethod;

    fn sale(code: &str, status: SaleStatus, total: i64, date: DateTime<Utc>) -> Sale {
        Sale {
            id: generate_sale_id(),
            sale_code: code.to_string(),
            customer_id: None,
            actor: "cashier".to_string(),
            subtotal: Money::from_cents(total),
            discount: Money::zero(),
            tax: Money::zero(),
            total_amount: Money::from_cents(total),
            payment_method: PaymentMethod::Cash,
            status,
            sale_date: date,
            notes: None,
            updated_at: date,
        }
    }

    fn item(sale_id: &str, quantity: i64) -> SaleItem {
        SaleItem {
            id: generate_sale_item_id(),
            sale_id: sale_id.to_string(),
            product_id: "p1".to_string(),
            sku_snapshot: "A-1".to_string(),
            name_snapshot: "A".to_string(),
            quantity,
            unit_price: Money::from_cents(100),
            total_price: Money::from_cents(100 * quantity),
        }
    }

    #[test]
    fn test_sale_code_format() {
        let date = Utc.with_ymd_and_hms(2026, 1, 31, 9, 0, 0).unwrap();
        let code = generate_sale_code(date);
        assert!(code.starts_with("SALE-20260131-"));
        assert_eq!(code.len(), "SALE-20260131-0042".len());
        assert!(code[14..].chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_insert_and_get_detail() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let s = sale("SALE-20260131-0001", SaleStatus::Completed, 300, Utc::now());
        {
            let mut tx = db.begin().await.unwrap();
            SaleRepository::insert(&mut tx, &s).await.unwrap();
            SaleRepository::insert_item(&mut tx, &item(&s.id, 1)).await.unwrap();
            SaleRepository::insert_item(&mut tx, &item(&s.id, 2)).await.unwrap();
            assert!(SaleRepository::code_exists(&mut tx, &s.sale_code).await.unwrap());
            tx.commit().await.unwrap();
        }

        let detail = db.sales().get_detail(&s.id).await.unwrap().unwrap();
        assert_eq!(detail.sale, s);
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.item_count(), 3);
        assert!(db.sales().get_by_code(&s.sale_code).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rollback_on_drop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let s = sale("SALE-20260131-0002", SaleStatus::Completed, 100, Utc::now());
        {
            let mut tx = db.begin().await.unwrap();
            SaleRepository::insert(&mut tx, &s).await.unwrap();
            // dropped without commit
        }
        assert!(db.sales().get_by_id(&s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_status_is_compare_and_set() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let s = sale("SALE-20260131-0003", SaleStatus::Pending, 100, Utc::now());
        let mut conn = db.pool().acquire().await.unwrap();
        SaleRepository::insert(&mut conn, &s).await.unwrap();

        SaleRepository::set_status(&mut conn, &s.id, SaleStatus::Pending, SaleStatus::Completed, Utc::now())
            .await
            .unwrap();
        let err = SaleRepository::set_status(
            &mut conn,
            &s.id,
            SaleStatus::Pending,
            SaleStatus::Cancelled,
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::StaleWrite { .. }));
    }

    #[tokio::test]
    async fn test_list_and_summary() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let day = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let a = sale("SALE-20260310-1111", SaleStatus::Completed, 1000, day);
        let b = sale("SALE-20260311-2222", SaleStatus::Completed, 500, day + Duration::days(1));
        let c = sale("SALE-20260311-3333", SaleStatus::Cancelled, 9999, day + Duration::days(1));
        {
            let mut tx = db.begin().await.unwrap();
            for s in [&a, &b, &c] {
                SaleRepository::insert(&mut tx, s).await.unwrap();
                SaleRepository::insert_item(&mut tx, &item(&s.id, 2)).await.unwrap();
            }
            tx.commit().await.unwrap();
        }

        let all = db.sales().list(&SaleFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].id, a.id);

        let by_code = db
            .sales()
            .list(&SaleFilter {
                search: Some("2222".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_code.len(), 1);
        assert_eq!(by_code[0].id, b.id);

        let first_day = db
            .sales()
            .list(&SaleFilter {
                date_from: Some(day - Duration::hours(1)),
                date_to: Some(day + Duration::hours(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first_day.len(), 1);

        let summary = db.sales().summary(None, None).await.unwrap();
        assert_eq!(summary.transactions, 2);
        assert_eq!(summary.total_amount, Money::from_cents(1500));
        assert_eq!(summary.items_sold, 4);
        assert_eq!(summary.average_sale, Money::from_cents(750));
    }
}
