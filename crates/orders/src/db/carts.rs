//! Cart and cart item persistence.
//!
//! A user has at most one active cart, enforced by the partial unique index
//! `carts_one_active_per_user`. [`get_or_create_active`] relies on it to stay
//! safe under concurrent first adds.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use grocer_core::{Cart, CartId, CartItem, CartItemId, ResolvedItem, UserId};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: i32,
    user_id: i32,
    is_active: bool,
    store: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Self {
            id: CartId::new(row.id),
            user_id: UserId::new(row.user_id),
            is_active: row.is_active,
            store: row.store,
            items: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    id: i32,
    cart_id: i32,
    product_name: String,
    quantity: String,
    store: Option<String>,
    notes: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: CartItemId::new(row.id),
            cart_id: CartId::new(row.cart_id),
            product_name: row.product_name,
            quantity: row.quantity,
            store: row.store,
            notes: row.notes,
            image_url: row.image_url,
            images: Vec::new(),
            created_at: row.created_at,
        }
    }
}

/// Get the user's active cart without its items.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_active(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Option<Cart>, RepositoryError> {
    let row = sqlx::query_as::<_, CartRow>(
        r"
        SELECT id, user_id, is_active, store, created_at, updated_at
        FROM carts
        WHERE user_id = $1 AND is_active
        ",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Cart::from))
}

/// Lock the user's active cart for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_active(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Option<Cart>, RepositoryError> {
    let row = sqlx::query_as::<_, CartRow>(
        r"
        SELECT id, user_id, is_active, store, created_at, updated_at
        FROM carts
        WHERE user_id = $1 AND is_active
        FOR UPDATE
        ",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Cart::from))
}

/// Get and lock the user's active cart, creating it if needed.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn get_or_create_active(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Cart, RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO carts (user_id)
        VALUES ($1)
        ON CONFLICT (user_id) WHERE is_active DO NOTHING
        ",
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    lock_active(conn, user_id)
        .await?
        .ok_or_else(|| RepositoryError::DataCorruption(format!("no active cart for user {user_id}")))
}

/// Items of a cart, oldest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn items(conn: &mut PgConnection, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, CartItemRow>(
        r"
        SELECT id, cart_id, product_name, quantity, store, notes, image_url, created_at
        FROM cart_items
        WHERE cart_id = $1
        ORDER BY id
        ",
    )
    .bind(cart_id)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(CartItem::from).collect())
}

/// Stores of a cart's items, most recently added first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn item_stores_newest_first(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<Vec<Option<String>>, RepositoryError> {
    let stores = sqlx::query_scalar::<_, Option<String>>(
        "SELECT store FROM cart_items WHERE cart_id = $1 ORDER BY id DESC",
    )
    .bind(cart_id)
    .fetch_all(conn)
    .await?;

    Ok(stores)
}

/// Insert a validated item.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item(
    conn: &mut PgConnection,
    cart_id: CartId,
    item: &ResolvedItem,
) -> Result<CartItem, RepositoryError> {
    let row = sqlx::query_as::<_, CartItemRow>(
        r"
        INSERT INTO cart_items (cart_id, product_name, quantity, store, notes, image_url)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, cart_id, product_name, quantity, store, notes, image_url, created_at
        ",
    )
    .bind(cart_id)
    .bind(&item.product_name)
    .bind(&item.quantity)
    .bind(&item.store)
    .bind(&item.notes)
    .bind(&item.image_url)
    .fetch_one(&mut *conn)
    .await?;

    touch(conn, cart_id).await?;
    Ok(CartItem::from(row))
}

/// Delete one item of a cart. Returns whether it existed.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the delete fails.
pub async fn delete_item(
    conn: &mut PgConnection,
    cart_id: CartId,
    item_id: CartItemId,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
        .bind(item_id)
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;

    touch(conn, cart_id).await?;
    Ok(result.rows_affected() > 0)
}

/// Delete every item of a cart. Their images cascade.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the delete fails.
pub async fn delete_items(conn: &mut PgConnection, cart_id: CartId) -> Result<u64, RepositoryError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;

    touch(conn, cart_id).await?;
    Ok(result.rows_affected())
}

/// Set the cart's default store.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_store(
    conn: &mut PgConnection,
    cart_id: CartId,
    store: Option<&str>,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE carts SET store = $2, updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .bind(store)
        .execute(conn)
        .await?;
    Ok(())
}

/// Retire a cart after checkout. The user's next add creates a new one.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn deactivate(conn: &mut PgConnection, cart_id: CartId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE carts SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn touch(conn: &mut PgConnection, cart_id: CartId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(())
}
