//! # Seed Data Generator
//!
//! Populates the ledger store with test products and customers for
//! development.
//!
//! ## Usage
//! ```bash
//! # Generate 500 products (default)
//! cargo run -p tally-db --bin seed
//!
//! # Generate custom amount into a specific file
//! cargo run -p tally-db --bin seed -- --count 2000 --db ./data/tally.db
//!
//! # More output
//! RUST_LOG=tally_db=debug cargo run -p tally-db --bin seed
//! ```
//!
//! ## Generated Data
//! Every product's opening stock is written as an `increase` ledger row
//! ("Opening stock"), so the seeded database satisfies the same
//! stock = Σ ledger invariant as one built through the engine.

use chrono::Utc;
use std::env;
use tally_core::{ChangeType, CustomerType, Money, NewCustomer, Product, DEFAULT_MIN_STOCK};
use tally_db::repository::product::generate_product_id;
use tally_db::{Database, DbConfig, DbResult, InventoryLogRepository, NewInventoryLog, ProductRepository};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Product categories for realistic test data
const CATEGORIES: &[(&str, &str, &[&str])] = &[
    (
        "BEV",
        "Beverages",
        &[
            "Coca-Cola", "Pepsi", "Sprite", "Red Bull", "Orange Juice", "Iced Tea", "Coffee",
            "Mineral Water",
        ],
    ),
    (
        "SNK",
        "Snacks",
        &[
            "Potato Chips", "Pretzels", "Chocolate Bar", "Gummy Bears", "Cookies", "Crackers",
        ],
    ),
    (
        "DRY",
        "Dairy",
        &["Whole Milk", "Greek Yogurt", "Cheddar Cheese", "Butter", "Eggs Dozen"],
    ),
    (
        "GRO",
        "Grocery",
        &[
            "Rice", "Pasta Penne", "Canned Tomatoes", "Peanut Butter", "Honey", "Flour", "Sugar",
        ],
    ),
];

/// Size variants for products (name, price addon in cents)
const SIZES: &[(&str, i64)] = &[
    ("Small", 0),
    ("Medium", 100),
    ("Large", 200),
    ("6-Pack", 300),
    ("12-Pack", 500),
];

const CUSTOMERS: &[(&str, CustomerType)] = &[
    ("Walk-in Regular", CustomerType::Retail),
    ("Corner Cafe", CustomerType::Wholesale),
    ("Acme Offices", CustomerType::Corporate),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 500;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(500);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 500)");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(database = %db_path, products = count, "Seeding");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(
            existing,
            "Database already has products; skipping seed. Delete the file to regenerate."
        );
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut generated = 0;

    'outer: for (category_idx, (code, category, names)) in CATEGORIES.iter().enumerate() {
        for (product_idx, name) in names.iter().enumerate() {
            for (size_idx, (size, price_addon)) in SIZES.iter().enumerate() {
                if generated >= count {
                    break 'outer;
                }

                let seed = category_idx * 1000 + product_idx * 20 + size_idx;
                let product = generate_product(code, category, name, size, *price_addon, seed);
                let opening = (seed % 101) as i64;

                if let Err(e) = insert_with_opening_stock(&db, &product, opening).await {
                    warn!(sku = %product.sku, error = %e, "Failed to insert product");
                    continue;
                }

                generated += 1;
                if generated % 100 == 0 {
                    info!(generated, "Progress");
                }
            }
        }
    }

    info!(generated, elapsed = ?start.elapsed(), "Products generated");

    for (name, customer_type) in CUSTOMERS {
        db.customers()
            .create(&NewCustomer {
                name: name.to_string(),
                customer_type: *customer_type,
                ..Default::default()
            })
            .await?;
    }
    info!(customers = CUSTOMERS.len(), "Customers generated");

    let low = db.products().list_low_stock().await?;
    info!(low_stock = low.len(), "Seed complete");

    Ok(())
}

/// Inserts the product at zero stock, then books the opening stock through
/// the ledger, all in one transaction.
async fn insert_with_opening_stock(db: &Database, product: &Product, opening: i64) -> DbResult<()> {
    let mut tx = db.begin().await?;
    let now = Utc::now();

    ProductRepository::insert(&mut tx, product).await?;

    if opening > 0 {
        let log_id = Uuid::new_v4().to_string();
        InventoryLogRepository::append(
            &mut tx,
            &NewInventoryLog {
                id: &log_id,
                product_id: &product.id,
                change_type: ChangeType::Increase,
                quantity_change: opening,
                previous_quantity: 0,
                new_quantity: opening,
                reason: "Opening stock",
                reference: None,
                actor: "seed",
                created_at: now,
            },
        )
        .await?;
        ProductRepository::set_stock(&mut tx, &product.id, 0, opening, now).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Generates a single product with realistic data, at zero stock.
fn generate_product(
    code: &str,
    category: &str,
    name: &str,
    size: &str,
    price_addon: i64,
    seed: usize,
) -> Product {
    let now = Utc::now();

    let short: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    let sku = format!("{}-{}-{:04}", code, short, seed);

    // Base 1.99 - 9.99 plus size addon
    let price = Money::from_cents(199 + ((seed * 17) % 800) as i64 + price_addon);
    // Cost is 60-80% of price
    let cost_price = Money::from_cents(price.cents() * (60 + (seed % 20) as i64) / 100);

    Product {
        id: generate_product_id(),
        name: format!("{} {}", name, size),
        description: None,
        sku,
        category: Some(category.to_string()),
        price,
        cost_price,
        stock_quantity: 0,
        min_stock: DEFAULT_MIN_STOCK,
        image_url: None,
        created_at: now,
        updated_at: now,
    }
}
