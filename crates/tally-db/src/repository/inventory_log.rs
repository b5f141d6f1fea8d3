//! # Inventory Log Repository
//!
//! The append-only stock ledger.
//!
//! ```text
//! seq │ product │ change_type │ Δ  │ prev │ new │ reference
//! ────┼─────────┼─────────────┼────┼──────┼─────┼──────────
//!   1 │ COKE    │ increase    │ 10 │    0 │  10 │
//!   2 │ COKE    │ stock_out   │ -2 │   10 │   8 │ sale-1
//!   3 │ COKE    │ return      │  2 │    8 │  10 │ sale-1
//! ```
//!
//! There is no update or delete here, and triggers in the schema reject both.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::InventoryLog;

macro_rules! select_logs {
    ($tail:literal) => {
        concat!(
            "SELECT seq, id, product_id, change_type, quantity_change, previous_quantity, ",
            "new_quantity, reason, reference, actor, created_at ",
            "FROM inventory_logs ",
            $tail
        )
    };
}

/// Fields of a ledger row before the store assigns `seq`.
#[derive(Debug, Clone)]
pub struct NewInventoryLog<'a> {
    pub id: &'a str,
    pub product_id: &'a str,
    pub change_type: tally_core::ChangeType,
    pub quantity_change: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub reason: &'a str,
    pub reference: Option<&'a str>,
    pub actor: &'a str,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Repository for ledger reads; appends happen inside engine transactions.
#[derive(Debug, Clone)]
pub struct InventoryLogRepository {
    pool: SqlitePool,
}

impl InventoryLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryLogRepository { pool }
    }

    /// A product's full ledger in creation order.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<InventoryLog>> {
        let mut conn = self.pool.acquire().await?;
        Self::for_product(&mut conn, product_id).await
    }

    /// Ledger rows correlated with `reference` (e.g. a sale id).
    pub async fn list_by_reference(&self, reference: &str) -> DbResult<Vec<InventoryLog>> {
        let logs = sqlx::query_as::<_, InventoryLog>(select_logs!(
            "WHERE reference = ?1 ORDER BY seq"
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    /// Most recent ledger rows across all products.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<InventoryLog>> {
        let logs = sqlx::query_as::<_, InventoryLog>(select_logs!(
            "ORDER BY seq DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    /// Σ quantity_change for a product (0 when it has no rows).
    pub async fn sum_for_product(&self, product_id: &str) -> DbResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity_change), 0) FROM inventory_logs WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    // =========================================================================
    // Transactional primitives
    // =========================================================================

    pub async fn for_product(
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Vec<InventoryLog>> {
        let logs = sqlx::query_as::<_, InventoryLog>(select_logs!(
            "WHERE product_id = ?1 ORDER BY seq"
        ))
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(logs)
    }

    /// Appends one ledger row and returns it with its assigned `seq`.
    pub async fn append(
        conn: &mut SqliteConnection,
        entry: &NewInventoryLog<'_>,
    ) -> DbResult<InventoryLog> {
        debug!(
            product_id = %entry.product_id,
            change_type = %entry.change_type,
            delta = entry.quantity_change,
            "Appending ledger row"
        );

        let log = sqlx::query_as::<_, InventoryLog>(
            r#"
            INSERT INTO inventory_logs (
                id, product_id, change_type, quantity_change, previous_quantity,
                new_quantity, reason, reference, actor, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING seq, id, product_id, change_type, quantity_change, previous_quantity,
                      new_quantity, reason, reference, actor, created_at
            "#,
        )
        .bind(entry.id)
        .bind(entry.product_id)
        .bind(entry.change_type)
        .bind(entry.quantity_change)
        .bind(entry.previous_quantity)
        .bind(entry.new_quantity)
        .bind(entry.reason)
        .bind(entry.reference)
        .bind(entry.actor)
        .bind(entry.created_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(log)
    }
}
