//! Integration test helpers for Grocer.
//!
//! The tests in `tests/` run against a real `PostgreSQL` database and are
//! ignored by default. Point `TEST_DATABASE_URL` at a scratch database and
//! run them with:
//!
//! ```bash
//! TEST_DATABASE_URL=postgres://localhost/grocer_test \
//!     cargo test -p grocer-integration-tests -- --ignored
//! ```
//!
//! Every helper creates fresh rows with unique emails and order number
//! prefixes, so tests can share one database and run in parallel.

#![allow(clippy::missing_panics_doc)]

use chrono::NaiveDate;
use grocer_core::{AddressId, UserId};
use grocer_orders::{AppState, Checkout, OrdersConfig, db};
use secrecy::SecretString;
use sqlx::PgPool;
use uuid::Uuid;

/// Database URL for integration tests.
fn database_url() -> SecretString {
    SecretString::from(
        std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set for integration tests"),
    )
}

/// Connect to the test database and apply migrations.
pub async fn test_pool() -> PgPool {
    let url = database_url();
    let pool = db::create_pool(&url, 10)
        .await
        .expect("Failed to connect to test database");
    db::migrate(&pool).await.expect("Failed to run migrations");
    pool
}

/// Engine state over `pool` with a per-test order number prefix and upload
/// directory.
pub fn test_state(pool: PgPool) -> AppState {
    let mut config = OrdersConfig::with_database_url(database_url());
    config.order_number_prefix = unique_prefix();
    config.upload.dir = std::env::temp_dir().join(format!("grocer-it-{}", Uuid::new_v4()));
    AppState::new(config, pool)
}

/// An order number prefix no other test uses.
pub fn unique_prefix() -> String {
    let id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("T{}", id.to_uppercase())
}

/// Insert a user and return its id.
pub async fn insert_user(pool: &PgPool, is_admin: bool) -> UserId {
    let email = format!("test-{}@example.com", Uuid::new_v4());
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO users (email, display_name, is_admin) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&email)
    .bind("Test User")
    .bind(is_admin)
    .fetch_one(pool)
    .await
    .expect("Failed to insert user");
    UserId::new(id)
}

/// Insert an address owned by `user_id` and return its id.
pub async fn insert_address(pool: &PgPool, user_id: UserId) -> AddressId {
    let id: i32 = sqlx::query_scalar(
        r"
        INSERT INTO addresses (user_id, recipient_name, street, house_number, postal_code, city)
        VALUES ($1, 'Erika Mustermann', 'Hauptstrasse', '5', '10115', 'Berlin')
        RETURNING id
        ",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .expect("Failed to insert address");
    AddressId::new(id)
}

/// A checkout of the active cart for delivery on `date` in the evening.
pub fn cart_checkout(address_id: AddressId, date: NaiveDate) -> Checkout {
    Checkout {
        address_id,
        desired_date: date,
        desired_slot: "evening".to_owned(),
        store: None,
        instructions: None,
        items: None,
    }
}

/// A fixed delivery date.
pub fn delivery_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 8).expect("valid date")
}

