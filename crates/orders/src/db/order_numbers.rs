//! Order number allocation.
//!
//! Numbers are `{PREFIX}-{year}-{NNNN}`, counting up per year. Allocation
//! takes a transaction-scoped advisory lock keyed by prefix and year, so
//! concurrent checkouts in the same year queue up until the first one
//! commits its order row. The unique constraint on `orders.order_number`
//! backs this up.

use sqlx::PgConnection;

use grocer_core::OrderNumber;

use super::RepositoryError;

/// Allocate the next order number for `year`.
///
/// Must run inside the transaction that inserts the order: the lock is
/// released on commit or rollback.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn next(
    conn: &mut PgConnection,
    prefix: &str,
    year: i32,
) -> Result<OrderNumber, RepositoryError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("order_number:{prefix}:{year}"))
        .execute(&mut *conn)
        .await?;

    let existing = sqlx::query_scalar::<_, String>(
        "SELECT order_number FROM orders WHERE order_number LIKE $1",
    )
    .bind(OrderNumber::like_pattern(prefix, year))
    .fetch_all(conn)
    .await?;

    Ok(OrderNumber::next_after(
        existing.iter().map(String::as_str),
        prefix,
        year,
    ))
}
