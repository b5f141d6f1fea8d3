//! # Change Events
//!
//! The closed set of notifications published after a ledger transaction
//! commits.
//!
//! ## Wire Shape
//! ```text
//! {"type":"stock_changed","product_id":"…","delta":-2,"new_quantity":8,…}
//! {"type":"low_stock_warning","product_id":"…","quantity":8,"min_stock":10}
//! {"type":"sale_status_changed","sale_id":"…","new_status":"cancelled",…}
//! ```
//!
//! The transport layer forwards the JSON unchanged.

use serde::{Deserialize, Serialize};

use crate::types::SaleStatus;

/// A committed state change worth telling connected clients about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A sale was created, completed or cancelled.
    SaleStatusChanged {
        sale_id: String,
        sale_code: String,
        new_status: SaleStatus,
        actor: String,
    },

    /// One ledger movement was applied to a product.
    StockChanged {
        product_id: String,
        product_name: String,
        sku: String,
        delta: i64,
        new_quantity: i64,
        previous_quantity: i64,
        reason: String,
        actor: String,
    },

    /// Stock went down and is now at or below the reorder threshold.
    LowStockWarning {
        product_id: String,
        product_name: String,
        quantity: i64,
        min_stock: i64,
    },
}

impl ChangeEvent {
    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::SaleStatusChanged { .. } => "sale_status_changed",
            ChangeEvent::StockChanged { .. } => "stock_changed",
            ChangeEvent::LowStockWarning { .. } => "low_stock_warning",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_tag() {
        let event = ChangeEvent::SaleStatusChanged {
            sale_id: "s1".to_string(),
            sale_code: "SALE-20260131-0042".to_string(),
            new_status: SaleStatus::Cancelled,
            actor: "manager".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sale_status_changed");
        assert_eq!(json["new_status"], "cancelled");
        assert_eq!(json["type"], event.kind());
    }

    #[test]
    fn test_deserialize_low_stock() {
        let json = r#"{"type":"low_stock_warning","product_id":"p","product_name":"Tea","quantity":3,"min_stock":10}"#;
        let event: ChangeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ChangeEvent::LowStockWarning {
                product_id: "p".to_string(),
                product_name: "Tea".to_string(),
                quantity: 3,
                min_stock: 10,
            }
        );
    }
}
