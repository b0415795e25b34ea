//! Seed the database with demo data.
//!
//! Inserts one user per role, a customer and a small tea catalogue. Running
//! it twice is harmless: users are keyed by username and products by name.
//!
//! # Usage
//!
//! ```bash
//! oms-cli seed
//! ```

use oms_core::Role;
use oms_server::db;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;

/// Demo users, one per role.
const USERS: &[(&str, Role)] = &[
    ("admin", Role::Admin),
    ("seller", Role::Seller),
    ("customer", Role::Customer),
];

/// Demo catalogue: name, price in cents, stock.
const PRODUCTS: &[(&str, i64, i32)] = &[
    ("Alishan Oolong 150g", 68_000, 40),
    ("Sun Moon Lake Black Tea 100g", 52_000, 25),
    ("Dong Ding Oolong 150g", 75_000, 10),
    ("Tea Cup", 25_000, 60),
    ("Gift Box", 12_050, 0),
];

/// Counts of what was inserted.
#[derive(Debug, Default)]
struct SeedResult {
    users: u64,
    customers: u64,
    products: u64,
}

/// Seed demo data.
///
/// # Errors
///
/// Returns an error if the database URL is missing or a query fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url()?;

    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let result = seed(&pool).await?;

    info!("Seeding complete!");
    info!("  Users inserted: {}", result.users);
    info!("  Customers inserted: {}", result.customers);
    info!("  Products inserted: {}", result.products);
    Ok(())
}

async fn seed(pool: &PgPool) -> Result<SeedResult, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut result = SeedResult::default();

    for (username, role) in USERS {
        result.users += sqlx::query(
            "INSERT INTO users (username, role) VALUES ($1, $2) ON CONFLICT (username) DO NOTHING",
        )
        .bind(username)
        .bind(role)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    result.customers += sqlx::query(
        "INSERT INTO customers (name, phone, address) \
         SELECT $1, $2, $3 WHERE NOT EXISTS (SELECT 1 FROM customers WHERE name = $1)",
    )
    .bind("Walk-in Customer")
    .bind("0912000111")
    .bind("No. 1, Sec. 1, Zhongshan Rd., Taipei")
    .execute(&mut *tx)
    .await?
    .rows_affected();

    for &(name, cents, stock) in PRODUCTS {
        result.products += sqlx::query(
            "INSERT INTO products (name, price, stock) \
             SELECT $1, $2, $3 WHERE NOT EXISTS (SELECT 1 FROM products WHERE name = $1)",
        )
        .bind(name)
        .bind(Decimal::new(cents, 2))
        .bind(stock)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    tx.commit().await?;
    Ok(result)
}
