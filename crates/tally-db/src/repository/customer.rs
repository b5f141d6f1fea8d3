//! # Customer Repository
//!
//! Customers are plain catalog data. Deleting one keeps its sales, whose
//! `customer_id` is set to NULL by the schema.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::{Customer, NewCustomer};

macro_rules! select_customers {
    ($tail:literal) => {
        concat!(
            "SELECT id, name, email, phone, address, customer_type, created_at FROM customers ",
            $tail
        )
    };
}

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Inserts a customer with a fresh id.
    pub async fn create(&self, input: &NewCustomer) -> DbResult<Customer> {
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: input.name.trim().to_string(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            address: input.address.clone(),
            customer_type: input.customer_type,
            created_at: Utc::now(),
        };

        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, phone, address, customer_type, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(customer.customer_type)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(customer)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Lists customers by name, optionally filtered by a name/email/phone
    /// substring.
    pub async fn list(&self, search: Option<&str>, limit: u32) -> DbResult<Vec<Customer>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));

        let customers = sqlx::query_as::<_, Customer>(select_customers!(
            "WHERE ?1 IS NULL \
                OR lower(name) LIKE ?1 \
                OR lower(COALESCE(email, '')) LIKE ?1 \
                OR COALESCE(phone, '') LIKE ?1 \
             ORDER BY name \
             LIMIT ?2"
        ))
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting customer");

        let result = sqlx::query("DELETE FROM customers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        Ok(())
    }

    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(select_customers!("WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::sale::{generate_sale_id, SaleRepository};
    use crate::{Database, DbConfig};
    use tally_core::{CustomerType, Money, PaymentMethod, Sale, SaleStatus};

    #[tokio::test]
    async fn test_create_list_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();

        let lan = repo
            .create(&NewCustomer {
                name: "Lan Nguyen".to_string(),
                email: Some("lan@example.com".to_string()),
                customer_type: CustomerType::Wholesale,
                ..Default::default()
            })
            .await
            .unwrap();
        repo.create(&NewCustomer {
            name: "Minh".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(repo.list(None, 10).await.unwrap().len(), 2);
        let hits = repo.list(Some("example"), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].customer_type, CustomerType::Wholesale);

        repo.delete(&lan.id).await.unwrap();
        assert!(repo.get_by_id(&lan.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_keeps_sales() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let customer = db
            .customers()
            .create(&NewCustomer {
                name: "Walk-in regular".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let now = Utc::now();
        let sale = Sale {
            id: generate_sale_id(),
            sale_code: "SALE-20260101-0001".to_string(),
            customer_id: Some(customer.id.clone()),
            actor: "cashier".to_string(),
            subtotal: Money::from_cents(100),
            discount: Money::zero(),
            tax: Money::zero(),
            total_amount: Money::from_cents(100),
            payment_method: PaymentMethod::Cash,
            status: SaleStatus::Completed,
            sale_date: now,
            notes: None,
            updated_at: now,
        };
        {
            let mut conn = db.pool().acquire().await.unwrap();
            SaleRepository::insert(&mut conn, &sale).await.unwrap();
        }

        db.customers().delete(&customer.id).await.unwrap();
        let kept = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(kept.customer_id, None);
    }
}
