//! Notification persistence with deduplication.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use grocer_core::{DedupWindow, Notification, NotificationId, NotificationKind, OrderId, UserId};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: i32,
    user_id: i32,
    kind: NotificationKind,
    message: String,
    related_order_id: Option<i32>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: NotificationId::new(row.id),
            user_id: UserId::new(row.user_id),
            kind: row.kind,
            message: row.message,
            related_order_id: row.related_order_id.map(OrderId::new),
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}

/// Whether [`create_deduplicated`] stored a new row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stored {
    Created(Notification),
    /// A notification with the same key exists inside the window.
    Existing(Notification),
}

impl Stored {
    #[must_use]
    pub fn into_inner(self) -> Notification {
        match self {
            Self::Created(n) | Self::Existing(n) => n,
        }
    }
}

/// Store a notification unless an identical `(user, kind, order)` one was
/// created within `window`.
///
/// An advisory lock on the key serializes concurrent attempts, so retried
/// requests cannot both insert. Run inside a transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn create_deduplicated(
    conn: &mut PgConnection,
    user_id: UserId,
    kind: NotificationKind,
    message: &str,
    related_order_id: Option<OrderId>,
    window: DedupWindow,
    now: DateTime<Utc>,
) -> Result<Stored, RepositoryError> {
    let key = format!(
        "notification:{user_id}:{kind}:{}",
        related_order_id.map_or(0, |id| id.as_i32())
    );
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(key)
        .execute(&mut *conn)
        .await?;

    let existing = sqlx::query_as::<_, NotificationRow>(
        r"
        SELECT id, user_id, kind, message, related_order_id, is_read, created_at
        FROM notifications
        WHERE user_id = $1
          AND kind = $2
          AND related_order_id IS NOT DISTINCT FROM $3
          AND created_at > $4
        ORDER BY created_at DESC
        LIMIT 1
        ",
    )
    .bind(user_id)
    .bind(kind)
    .bind(related_order_id)
    .bind(window.cutoff(now))
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = existing {
        return Ok(Stored::Existing(Notification::from(row)));
    }

    let row = sqlx::query_as::<_, NotificationRow>(
        r"
        INSERT INTO notifications (user_id, kind, message, related_order_id, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, kind, message, related_order_id, is_read, created_at
        ",
    )
    .bind(user_id)
    .bind(kind)
    .bind(message)
    .bind(related_order_id)
    .bind(now)
    .fetch_one(conn)
    .await?;

    Ok(Stored::Created(Notification::from(row)))
}

/// A user's notifications, newest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_user(
    conn: &mut PgConnection,
    user_id: UserId,
    limit: i64,
) -> Result<Vec<Notification>, RepositoryError> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        r"
        SELECT id, user_id, kind, message, related_order_id, is_read, created_at
        FROM notifications
        WHERE user_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2
        ",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Notification::from).collect())
}
