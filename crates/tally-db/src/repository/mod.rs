//! # Repository Module
//!
//! Database repository implementations for the ledger store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Kinds of Methods                                 │
//! │                                                                         │
//! │  Pool-backed reads (&self)            Transactional primitives          │
//! │  ─────────────────────────            ──────────────────────────────    │
//! │  db.products().categories()           ProductRepository::find(&mut tx) │
//! │  db.sales().list(&filter)             ProductRepository::set_stock(..) │
//! │  db.inventory_logs().list_for_..      InventoryLogRepository::append   │
//! │                                       SaleRepository::insert(..)       │
//! │                                                                         │
//! │  Each acquires its own connection     Run on the caller's connection,   │
//! │                                       so several compose into one      │
//! │                                       all-or-nothing transaction        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog reads, CAS stock writes
//! - [`InventoryLogRepository`](inventory_log::InventoryLogRepository) - Append-only ledger
//! - [`SaleRepository`](sale::SaleRepository) - Sale headers and items
//! - [`CustomerRepository`](customer::CustomerRepository) - Customers

pub mod customer;
pub mod inventory_log;
pub mod product;
pub mod sale;
