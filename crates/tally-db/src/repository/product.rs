//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - Catalog reads and search
//! - Catalog writes that never touch stock (`update_details`, `delete`)
//! - The transactional stock primitives used by the inventory engine
//!
//! ## Stock Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stock Update Strategy                                │
//! │                                                                         │
//! │  ❌ Blind write (lost update under concurrency)                         │
//! │     UPDATE products SET stock_quantity = 7 WHERE id = ?                │
//! │                                                                         │
//! │  ✅ Compare-and-set against the value the ledger row was planned from   │
//! │     UPDATE products SET stock_quantity = 7                             │
//! │      WHERE id = ? AND stock_quantity = 10                              │
//! │                                                                         │
//! │  0 rows affected → someone else moved the stock → StaleWrite           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `set_stock` is only ever called next to an `InventoryLogRepository::append`
//! in the same transaction.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::{Product, ProductUpdate};

macro_rules! select_products {
    ($tail:literal) => {
        concat!(
            "SELECT id, name, description, sku, category, price, cost_price, ",
            "stock_quantity, min_stock, image_url, created_at, updated_at ",
            "FROM products ",
            $tail
        )
    };
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let results = repo.search("coke", None, 20).await?;
/// let product = repo.get_by_id("uuid-here").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Searches products by name, SKU or category (case-insensitive
    /// substring), optionally restricted to one exact category. An empty
    /// query lists everything by name.
    pub async fn search(
        &self,
        query: &str,
        category: Option<&str>,
        limit: u32,
    ) -> DbResult<Vec<Product>> {
        let query = query.trim();
        let category = category.map(str::trim).filter(|c| !c.is_empty());

        debug!(query = %query, category = ?category, limit = %limit, "Searching products");

        let pattern = format!("%{}%", query.to_lowercase());

        let products = sqlx::query_as::<_, Product>(select_products!(
            "WHERE (?1 = '%%' \
                OR lower(name) LIKE ?1 \
                OR lower(sku) LIKE ?1 \
                OR lower(COALESCE(category, '')) LIKE ?1) \
               AND (?2 IS NULL OR category = ?2) \
             ORDER BY name \
             LIMIT ?3"
        ))
        .bind(&pattern)
        .bind(category)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Distinct non-empty categories, alphabetically.
    pub async fn categories(&self) -> DbResult<Vec<String>> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM products \
             WHERE category IS NOT NULL AND category != '' \
             ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(select_products!("WHERE sku = ?1"))
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Products at or below their reorder threshold, emptiest first.
    pub async fn list_low_stock(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(select_products!(
            "WHERE stock_quantity <= min_stock ORDER BY stock_quantity, name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Updates descriptive catalog fields. Stock and SKU are left alone.
    ///
    /// ## Returns
    /// * `Ok(Product)` - The updated row
    /// * `Err(DbError::NotFound)` - Product doesn't exist
    pub async fn update_details(&self, id: &str, update: &ProductUpdate) -> DbResult<Product> {
        debug!(id = %id, "Updating product details");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                description = ?3,
                category = ?4,
                price = ?5,
                cost_price = ?6,
                min_stock = ?7,
                image_url = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.category)
        .bind(update.price)
        .bind(update.cost_price)
        .bind(update.min_stock)
        .bind(&update.image_url)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Hard-deletes a product.
    ///
    /// Its ledger rows and sale items stay: they reference the product by id
    /// only.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting product");

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Transactional primitives
    // =========================================================================

    /// Reads a product on the given connection (usually a transaction).
    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(select_products!("WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(product)
    }

    /// Inserts a product row. Callers insert with `stock_quantity = 0` and
    /// bring stock up through a ledger movement.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, description, sku, category, price, cost_price,
                stock_quantity, min_stock, image_url, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.sku)
        .bind(&product.category)
        .bind(product.price)
        .bind(product.cost_price)
        .bind(product.stock_quantity)
        .bind(product.min_stock)
        .bind(&product.image_url)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: product.sku.clone(),
            },
            other => other,
        })?;

        Ok(())
    }

    /// True if another product already uses `sku`.
    pub async fn sku_exists(conn: &mut SqliteConnection, sku: &str) -> DbResult<bool> {
        let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE sku = ?1)")
            .bind(sku)
            .fetch_one(&mut *conn)
            .await?;

        Ok(exists != 0)
    }

    /// Compare-and-set of the stock level.
    ///
    /// ## Returns
    /// * `Err(DbError::StaleWrite)` - stock is no longer `expected`
    ///   (or the product vanished)
    pub async fn set_stock(
        conn: &mut SqliteConnection,
        id: &str,
        expected: i64,
        new_quantity: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id = %id, expected, new_quantity, "Setting stock");

        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = ?3, updated_at = ?4
            WHERE id = ?1 AND stock_quantity = ?2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(new_quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::stale("Product", id));
        }

        Ok(())
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
