//! Order and order item persistence.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgConnection;

use grocer_core::{
    AddressId, AddressSnapshot, Order, OrderId, OrderItem, OrderItemId, OrderNumber, OrderStatus,
    ResolvedItem, UserId,
};

use super::RepositoryError;

/// Name of the unique constraint on `orders.order_number`.
pub const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_key";

macro_rules! select_orders {
    ($tail:literal) => {
        concat!(
            r"
            SELECT id, user_id, order_number, status, address_id,
                   address_recipient_name, address_street, address_house_number,
                   address_postal_code, address_city, address_phone, address_delivery_notes,
                   desired_delivery_date, desired_time_slot,
                   suggested_delivery_date, suggested_time_slot,
                   final_delivery_date, final_time_slot,
                   store, additional_instructions, is_locked, is_deleted,
                   cancelled_at, created_at, updated_at
            FROM orders
            ",
            $tail
        )
    };
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    order_number: OrderNumber,
    status: OrderStatus,
    address_id: Option<i32>,
    address_recipient_name: String,
    address_street: String,
    address_house_number: Option<String>,
    address_postal_code: String,
    address_city: String,
    address_phone: Option<String>,
    address_delivery_notes: Option<String>,
    desired_delivery_date: NaiveDate,
    desired_time_slot: String,
    suggested_delivery_date: Option<NaiveDate>,
    suggested_time_slot: Option<String>,
    final_delivery_date: Option<NaiveDate>,
    final_time_slot: Option<String>,
    store: Option<String>,
    additional_instructions: Option<String>,
    is_locked: bool,
    is_deleted: bool,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: OrderId::new(row.id),
            user_id: UserId::new(row.user_id),
            order_number: row.order_number,
            status: row.status,
            address_id: row.address_id.map(AddressId::new),
            address: AddressSnapshot {
                recipient_name: row.address_recipient_name,
                street: row.address_street,
                house_number: row.address_house_number,
                postal_code: row.address_postal_code,
                city: row.address_city,
                phone: row.address_phone,
                delivery_notes: row.address_delivery_notes,
            },
            desired_delivery_date: row.desired_delivery_date,
            desired_time_slot: row.desired_time_slot,
            suggested_delivery_date: row.suggested_delivery_date,
            suggested_time_slot: row.suggested_time_slot,
            final_delivery_date: row.final_delivery_date,
            final_time_slot: row.final_time_slot,
            store: row.store,
            additional_instructions: row.additional_instructions,
            is_locked: row.is_locked,
            is_deleted: row.is_deleted,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_name: String,
    quantity: String,
    store: String,
    notes: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
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

/// Fields of a new order.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub user_id: UserId,
    pub order_number: &'a OrderNumber,
    pub address_id: AddressId,
    pub address: &'a AddressSnapshot,
    pub desired_delivery_date: NaiveDate,
    pub desired_time_slot: &'a str,
    pub store: Option<&'a str>,
    pub additional_instructions: Option<&'a str>,
}

/// Get an order by ID, without items.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(conn: &mut PgConnection, id: OrderId) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(select_orders!("WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(Order::from))
}

/// Get and lock an order for a transition.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not exist.
pub async fn lock(conn: &mut PgConnection, id: OrderId) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(select_orders!("WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(conn)
        .await?;

    row.map(Order::from).ok_or(RepositoryError::NotFound)
}

/// Get an order by its number, without items.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_by_number(
    conn: &mut PgConnection,
    number: &OrderNumber,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(select_orders!("WHERE order_number = $1"))
        .bind(number)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(Order::from))
}

/// A user's orders that are not soft-deleted, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_user(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Vec<Order>, RepositoryError> {
    let rows = sqlx::query_as::<_, OrderRow>(select_orders!(
        "WHERE user_id = $1 AND NOT is_deleted ORDER BY created_at DESC, id DESC"
    ))
    .bind(user_id)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Order::from).collect())
}

/// Every order, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_all(
    conn: &mut PgConnection,
    include_deleted: bool,
) -> Result<Vec<Order>, RepositoryError> {
    let rows = sqlx::query_as::<_, OrderRow>(select_orders!(
        "WHERE $1 OR NOT is_deleted ORDER BY created_at DESC, id DESC"
    ))
    .bind(include_deleted)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Order::from).collect())
}

/// Insert a new order in status `new`, unlocked.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the order number is taken.
/// Returns `RepositoryError::Database` for other database errors.
pub async fn insert(conn: &mut PgConnection, new: NewOrder<'_>) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(
        r"
        INSERT INTO orders (
            user_id, order_number, status, address_id,
            address_recipient_name, address_street, address_house_number,
            address_postal_code, address_city, address_phone, address_delivery_notes,
            desired_delivery_date, desired_time_slot, store, additional_instructions
        )
        VALUES ($1, $2, 'new', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING id, user_id, order_number, status, address_id,
                  address_recipient_name, address_street, address_house_number,
                  address_postal_code, address_city, address_phone, address_delivery_notes,
                  desired_delivery_date, desired_time_slot,
                  suggested_delivery_date, suggested_time_slot,
                  final_delivery_date, final_time_slot,
                  store, additional_instructions, is_locked, is_deleted,
                  cancelled_at, created_at, updated_at
        ",
    )
    .bind(new.user_id)
    .bind(new.order_number)
    .bind(new.address_id)
    .bind(&new.address.recipient_name)
    .bind(&new.address.street)
    .bind(&new.address.house_number)
    .bind(&new.address.postal_code)
    .bind(&new.address.city)
    .bind(&new.address.phone)
    .bind(&new.address.delivery_notes)
    .bind(new.desired_delivery_date)
    .bind(new.desired_time_slot)
    .bind(new.store)
    .bind(new.additional_instructions)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        RepositoryError::from_unique(e, ORDER_NUMBER_CONSTRAINT, "order number already taken")
    })?;

    Ok(Order::from(row))
}

/// Write every mutable column of `order` back.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order no longer exists.
pub async fn update_state(conn: &mut PgConnection, order: &Order) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE orders
        SET status = $2,
            address_id = $3,
            address_recipient_name = $4,
            address_street = $5,
            address_house_number = $6,
            address_postal_code = $7,
            address_city = $8,
            address_phone = $9,
            address_delivery_notes = $10,
            desired_delivery_date = $11,
            desired_time_slot = $12,
            suggested_delivery_date = $13,
            suggested_time_slot = $14,
            final_delivery_date = $15,
            final_time_slot = $16,
            additional_instructions = $17,
            is_locked = $18,
            is_deleted = $19,
            cancelled_at = $20,
            updated_at = $21
        WHERE id = $1
        ",
    )
    .bind(order.id)
    .bind(order.status)
    .bind(order.address_id)
    .bind(&order.address.recipient_name)
    .bind(&order.address.street)
    .bind(&order.address.house_number)
    .bind(&order.address.postal_code)
    .bind(&order.address.city)
    .bind(&order.address.phone)
    .bind(&order.address.delivery_notes)
    .bind(order.desired_delivery_date)
    .bind(&order.desired_time_slot)
    .bind(order.suggested_delivery_date)
    .bind(&order.suggested_time_slot)
    .bind(order.final_delivery_date)
    .bind(&order.final_time_slot)
    .bind(&order.additional_instructions)
    .bind(order.is_locked)
    .bind(order.is_deleted)
    .bind(order.cancelled_at)
    .bind(order.updated_at)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Insert an order item. New items carry no legacy image string.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    item: &ResolvedItem,
) -> Result<OrderItem, RepositoryError> {
    let row = sqlx::query_as::<_, OrderItemRow>(
        r"
        INSERT INTO order_items (order_id, product_name, quantity, store, notes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, order_id, product_name, quantity, store, notes, image_url, created_at
        ",
    )
    .bind(order_id)
    .bind(&item.product_name)
    .bind(&item.quantity)
    .bind(&item.store)
    .bind(&item.notes)
    .fetch_one(conn)
    .await?;

    Ok(OrderItem::from(row))
}

/// Items of many orders, grouped by order and oldest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn items_for_orders(
    conn: &mut PgConnection,
    order_ids: &[i32],
) -> Result<Vec<OrderItem>, RepositoryError> {
    if order_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, OrderItemRow>(
        r"
        SELECT id, order_id, product_name, quantity, store, notes, image_url, created_at
        FROM order_items
        WHERE order_id = ANY($1)
        ORDER BY order_id, id
        ",
    )
    .bind(order_ids)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(OrderItem::from).collect())
}
