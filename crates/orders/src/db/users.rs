//! User lookups.

use sqlx::PgConnection;

use grocer_core::{User, UserId};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    email: String,
    display_name: Option<String>,
    is_admin: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::new(row.id),
            email: row.email,
            display_name: row.display_name,
            is_admin: row.is_admin,
        }
    }
}

/// Get a user by ID.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(conn: &mut PgConnection, id: UserId) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query_as::<_, UserRow>(
        r"
        SELECT id, email, display_name, is_admin
        FROM users
        WHERE id = $1
        ",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(User::from))
}

/// List every admin user.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_admins(conn: &mut PgConnection) -> Result<Vec<User>, RepositoryError> {
    let rows = sqlx::query_as::<_, UserRow>(
        r"
        SELECT id, email, display_name, is_admin
        FROM users
        WHERE is_admin
        ORDER BY id
        ",
    )
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(User::from).collect())
}
