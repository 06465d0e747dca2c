//! Address lookups.

use sqlx::PgConnection;

use grocer_core::{Address, AddressId, UserId};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
struct AddressRow {
    id: i32,
    user_id: i32,
    label: Option<String>,
    recipient_name: String,
    street: String,
    house_number: Option<String>,
    postal_code: String,
    city: String,
    phone: Option<String>,
    delivery_notes: Option<String>,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        Self {
            id: AddressId::new(row.id),
            user_id: UserId::new(row.user_id),
            label: row.label,
            recipient_name: row.recipient_name,
            street: row.street,
            house_number: row.house_number,
            postal_code: row.postal_code,
            city: row.city,
            phone: row.phone,
            delivery_notes: row.delivery_notes,
        }
    }
}

/// Get an address only if it belongs to `user_id`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_owned(
    conn: &mut PgConnection,
    id: AddressId,
    user_id: UserId,
) -> Result<Option<Address>, RepositoryError> {
    let row = sqlx::query_as::<_, AddressRow>(
        r"
        SELECT id, user_id, label, recipient_name, street, house_number,
               postal_code, city, phone, delivery_notes
        FROM addresses
        WHERE id = $1 AND user_id = $2
        ",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Address::from))
}
