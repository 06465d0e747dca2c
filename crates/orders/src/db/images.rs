//! Image store: the normalized `item_images` table.
//!
//! The table is the source of truth for item images. Mutations lock the
//! owning item row first (`SELECT … FOR UPDATE`), load the owner's
//! [`ImageSet`], let it plan the change, and write the plan back. Run them
//! inside a transaction: the lock is held until it ends.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::{debug, warn};

use grocer_core::image::{Decoding, IngestPlan, PendingImage, Removal, decode_detailed, encode};
use grocer_core::{
    CartId, CartItemId, ImageError, ImageId, ImageOwner, ImageOwnerKind, ImageRecord, ImageSet,
    OrderItemId, UserId,
};

use super::RepositoryError;

/// Errors from image store mutations.
#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for ImageStoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ImageRow {
    id: i32,
    owner_kind: ImageOwnerKind,
    order_item_id: Option<i32>,
    cart_item_id: Option<i32>,
    url: String,
    is_main: bool,
    sort_order: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<ImageRow> for ImageRecord {
    type Error = RepositoryError;

    fn try_from(row: ImageRow) -> Result<Self, Self::Error> {
        let owner = match (row.owner_kind, row.order_item_id, row.cart_item_id) {
            (ImageOwnerKind::OrderItem, Some(id), None) => ImageOwner::OrderItem(OrderItemId::new(id)),
            (ImageOwnerKind::CartItem, None, Some(id)) => ImageOwner::CartItem(CartItemId::new(id)),
            _ => {
                return Err(RepositoryError::DataCorruption(format!(
                    "image {} has inconsistent owner columns",
                    row.id
                )));
            }
        };

        Ok(Self {
            id: ImageId::new(row.id),
            owner,
            url: row.url,
            is_main: row.is_main,
            sort_order: row.sort_order,
            created_at: row.created_at,
        })
    }
}

fn into_records(rows: Vec<ImageRow>) -> Result<Vec<ImageRecord>, RepositoryError> {
    rows.into_iter().map(ImageRecord::try_from).collect()
}

/// Owner column values as `(order_item_id, cart_item_id)`.
fn owner_columns(owner: ImageOwner) -> (Option<i32>, Option<i32>) {
    (
        owner.order_item_id().map(|id| id.as_i32()),
        owner.cart_item_id().map(|id| id.as_i32()),
    )
}

/// Images of an owner, ordered by `sort_order`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for(
    conn: &mut PgConnection,
    owner: ImageOwner,
) -> Result<Vec<ImageRecord>, RepositoryError> {
    let (order_item_id, cart_item_id) = owner_columns(owner);
    let rows = sqlx::query_as::<_, ImageRow>(
        r"
        SELECT id, owner_kind, order_item_id, cart_item_id, url, is_main, sort_order, created_at
        FROM item_images
        WHERE owner_kind = $1
          AND order_item_id IS NOT DISTINCT FROM $2
          AND cart_item_id IS NOT DISTINCT FROM $3
        ORDER BY sort_order, id
        ",
    )
    .bind(owner.kind())
    .bind(order_item_id)
    .bind(cart_item_id)
    .fetch_all(conn)
    .await?;

    into_records(rows)
}

/// Images of many owners of one kind, ordered by owner then `sort_order`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_owners(
    conn: &mut PgConnection,
    kind: ImageOwnerKind,
    owner_ids: &[i32],
) -> Result<Vec<ImageRecord>, RepositoryError> {
    if owner_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, ImageRow>(
        r"
        SELECT id, owner_kind, order_item_id, cart_item_id, url, is_main, sort_order, created_at
        FROM item_images
        WHERE owner_kind = $1
          AND COALESCE(order_item_id, cart_item_id) = ANY($2)
        ORDER BY COALESCE(order_item_id, cart_item_id), sort_order, id
        ",
    )
    .bind(kind)
    .bind(owner_ids)
    .fetch_all(conn)
    .await?;

    into_records(rows)
}

/// Get a single image.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(
    conn: &mut PgConnection,
    id: ImageId,
) -> Result<Option<ImageRecord>, RepositoryError> {
    let row = sqlx::query_as::<_, ImageRow>(
        r"
        SELECT id, owner_kind, order_item_id, cart_item_id, url, is_main, sort_order, created_at
        FROM item_images
        WHERE id = $1
        ",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    row.map(ImageRecord::try_from).transpose()
}

/// The user who owns the item behind `owner`, and whether that item belongs
/// to a soft-deleted order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn owner_user(
    conn: &mut PgConnection,
    owner: ImageOwner,
) -> Result<Option<(UserId, bool)>, RepositoryError> {
    let row: Option<(i32, bool)> = match owner {
        ImageOwner::CartItem(id) => {
            sqlx::query_as(
                r"
                SELECT c.user_id, FALSE
                FROM cart_items ci
                JOIN carts c ON c.id = ci.cart_id
                WHERE ci.id = $1
                ",
            )
            .bind(id)
            .fetch_optional(conn)
            .await?
        }
        ImageOwner::OrderItem(id) => {
            sqlx::query_as(
                r"
                SELECT o.user_id, o.is_deleted
                FROM order_items oi
                JOIN orders o ON o.id = oi.order_id
                WHERE oi.id = $1
                ",
            )
            .bind(id)
            .fetch_optional(conn)
            .await?
        }
    };

    Ok(row.map(|(user_id, deleted)| (UserId::new(user_id), deleted)))
}

/// Lock the owning item row for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the item does not exist.
pub async fn lock_owner(conn: &mut PgConnection, owner: ImageOwner) -> Result<(), RepositoryError> {
    let query = match owner {
        ImageOwner::CartItem(id) => {
            sqlx::query_scalar::<_, i32>("SELECT id FROM cart_items WHERE id = $1 FOR UPDATE")
                .bind(id)
        }
        ImageOwner::OrderItem(id) => {
            sqlx::query_scalar::<_, i32>("SELECT id FROM order_items WHERE id = $1 FOR UPDATE")
                .bind(id)
        }
    };

    query
        .fetch_optional(conn)
        .await?
        .map(|_| ())
        .ok_or(RepositoryError::NotFound)
}

/// Lock the owner and load its current image set.
async fn lock_set(conn: &mut PgConnection, owner: ImageOwner) -> Result<ImageSet, RepositoryError> {
    lock_owner(&mut *conn, owner).await?;
    let records = list_for(&mut *conn, owner).await?;
    Ok(ImageSet::new(owner, records))
}

async fn insert(
    conn: &mut PgConnection,
    owner: ImageOwner,
    pending: &PendingImage,
) -> Result<ImageRecord, RepositoryError> {
    let (order_item_id, cart_item_id) = owner_columns(owner);
    let row = sqlx::query_as::<_, ImageRow>(
        r"
        INSERT INTO item_images (owner_kind, order_item_id, cart_item_id, url, is_main, sort_order)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, owner_kind, order_item_id, cart_item_id, url, is_main, sort_order, created_at
        ",
    )
    .bind(owner.kind())
    .bind(order_item_id)
    .bind(cart_item_id)
    .bind(&pending.url)
    .bind(pending.is_main)
    .bind(pending.sort_order)
    .fetch_one(conn)
    .await?;

    ImageRecord::try_from(row)
}

/// Append one image to an owner.
///
/// # Errors
///
/// Returns `ImageError::CapacityExceeded` if the owner is full and
/// `RepositoryError::NotFound` if the owner does not exist.
pub async fn add(
    conn: &mut PgConnection,
    owner: ImageOwner,
    url: &str,
) -> Result<ImageRecord, ImageStoreError> {
    let set = lock_set(&mut *conn, owner).await?;
    let pending = set.plan_add(url)?;
    let record = insert(conn, owner, &pending).await?;

    debug!(owner = %owner, image_id = %record.id, "Added image");
    Ok(record)
}

/// Make `image_id` the owner's only main image.
///
/// # Errors
///
/// Returns `ImageError::NotFound` if the image belongs to another owner.
pub async fn set_main(
    conn: &mut PgConnection,
    owner: ImageOwner,
    image_id: ImageId,
) -> Result<(), ImageStoreError> {
    let mut set = lock_set(&mut *conn, owner).await?;
    set.set_main(image_id)?;

    let (order_item_id, cart_item_id) = owner_columns(owner);
    // Siblings first: the partial unique index allows one main at a time.
    sqlx::query(
        r"
        UPDATE item_images
        SET is_main = FALSE
        WHERE owner_kind = $1
          AND order_item_id IS NOT DISTINCT FROM $2
          AND cart_item_id IS NOT DISTINCT FROM $3
          AND is_main
          AND id <> $4
        ",
    )
    .bind(owner.kind())
    .bind(order_item_id)
    .bind(cart_item_id)
    .bind(image_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE item_images SET is_main = TRUE WHERE id = $1")
        .bind(image_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Delete an image, promoting and renumbering its siblings.
///
/// The backing file is left alone; the caller decides whether it is still
/// referenced once the transaction has committed.
///
/// # Errors
///
/// Returns `ImageError::NotFound` if the image does not exist.
pub async fn remove(conn: &mut PgConnection, image_id: ImageId) -> Result<Removal, ImageStoreError> {
    let owner = get(&mut *conn, image_id)
        .await?
        .ok_or(ImageError::NotFound(image_id))?
        .owner;
    let mut set = lock_set(&mut *conn, owner).await?;
    let removal = set.remove(image_id)?;

    sqlx::query("DELETE FROM item_images WHERE id = $1")
        .bind(image_id)
        .execute(&mut *conn)
        .await?;

    if let Some(promoted) = removal.promoted {
        sqlx::query("UPDATE item_images SET is_main = TRUE WHERE id = $1")
            .bind(promoted)
            .execute(&mut *conn)
            .await?;
    }

    for (id, sort_order) in &removal.renumbered {
        sqlx::query("UPDATE item_images SET sort_order = $2 WHERE id = $1")
            .bind(id)
            .bind(sort_order)
            .execute(&mut *conn)
            .await?;
    }

    debug!(
        owner = %owner,
        image_id = %image_id,
        promoted = ?removal.promoted,
        "Removed image"
    );
    Ok(removal)
}

/// Outcome of ingesting a transport string.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub inserted: Vec<ImageRecord>,
    pub skipped_existing: usize,
    pub dropped_over_capacity: usize,
}

/// Persist the images of a transport string for an owner.
///
/// Urls the owner already has are skipped, so repeating a call with the same
/// string adds nothing. Images beyond capacity are dropped with a warning.
///
/// # Errors
///
/// Returns `RepositoryError` if the owner does not exist or a write fails.
pub async fn ingest_legacy_string(
    conn: &mut PgConnection,
    owner: ImageOwner,
    encoded: &str,
) -> Result<IngestReport, RepositoryError> {
    let (refs, decoding) = decode_detailed(Some(encoded));
    match decoding {
        Decoding::Salvaged => {
            warn!(owner = %owner, recovered = refs.len(), "Salvaged urls from malformed image string");
        }
        Decoding::Unrecoverable => {
            warn!(owner = %owner, "Discarding unreadable image string");
        }
        Decoding::Blank | Decoding::Legacy | Decoding::Parsed => {}
    }
    if refs.is_empty() {
        return Ok(IngestReport::default());
    }

    let set = lock_set(&mut *conn, owner).await?;
    let IngestPlan {
        pending,
        skipped_existing,
        dropped_over_capacity,
    } = set.plan_ingest(refs);

    if dropped_over_capacity > 0 {
        warn!(
            owner = %owner,
            dropped = dropped_over_capacity,
            "Dropped images over the per-item limit"
        );
    }

    let mut inserted = Vec::with_capacity(pending.len());
    for image in &pending {
        inserted.push(insert(&mut *conn, owner, image).await?);
    }

    Ok(IngestReport {
        inserted,
        skipped_existing,
        dropped_over_capacity,
    })
}

/// Copy the image records of `from` onto `to`, sharing the urls.
///
/// # Errors
///
/// Returns `RepositoryError` if either owner does not exist or a write fails.
pub async fn copy_images(
    conn: &mut PgConnection,
    from: ImageOwner,
    to: ImageOwner,
) -> Result<Vec<ImageRecord>, RepositoryError> {
    let source = list_for(&mut *conn, from).await?;
    if source.is_empty() {
        return Ok(Vec::new());
    }

    let set = lock_set(&mut *conn, to).await?;
    let plan = set.plan_ingest(source.iter().map(ImageRecord::to_ref).collect());

    let mut copied = Vec::with_capacity(plan.pending.len());
    for image in &plan.pending {
        copied.push(insert(&mut *conn, to, image).await?);
    }
    Ok(copied)
}

/// The owner's images as a transport string.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn project_as_transport_string(
    conn: &mut PgConnection,
    owner: ImageOwner,
) -> Result<String, RepositoryError> {
    let records = list_for(conn, owner).await?;
    let refs: Vec<_> = records.iter().map(ImageRecord::to_ref).collect();
    Ok(encode(&refs))
}

/// Distinct urls of the images of a cart's items, or of one item when
/// `item_id` is given.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn cart_urls(
    conn: &mut PgConnection,
    cart_id: CartId,
    item_id: Option<CartItemId>,
) -> Result<Vec<String>, RepositoryError> {
    let urls = sqlx::query_scalar::<_, String>(
        r"
        SELECT DISTINCT i.url
        FROM item_images i
        JOIN cart_items c ON c.id = i.cart_item_id
        WHERE c.cart_id = $1
          AND ($2::INTEGER IS NULL OR c.id = $2)
        ORDER BY i.url
        ",
    )
    .bind(cart_id)
    .bind(item_id)
    .fetch_all(conn)
    .await?;
    Ok(urls)
}

/// Number of image records pointing at `url`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn count_references(conn: &mut PgConnection, url: &str) -> Result<i64, RepositoryError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM item_images WHERE url = $1")
        .bind(url)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// An item that still carries a legacy image string but no image records.
#[derive(Debug, Clone)]
pub struct LegacyItem {
    pub owner: ImageOwner,
    pub image_url: String,
}

#[derive(Debug, sqlx::FromRow)]
struct LegacyRow {
    id: i32,
    image_url: String,
}

/// Items of `kind` whose legacy `image_url` has not been ingested yet.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn pending_backfill(
    conn: &mut PgConnection,
    kind: ImageOwnerKind,
    limit: i64,
) -> Result<Vec<LegacyItem>, RepositoryError> {
    let sql = match kind {
        ImageOwnerKind::OrderItem => {
            r"
            SELECT oi.id, oi.image_url
            FROM order_items oi
            WHERE oi.image_url IS NOT NULL AND btrim(oi.image_url) <> ''
              AND NOT EXISTS (SELECT 1 FROM item_images i WHERE i.order_item_id = oi.id)
            ORDER BY oi.id
            LIMIT $1
            "
        }
        ImageOwnerKind::CartItem => {
            r"
            SELECT ci.id, ci.image_url
            FROM cart_items ci
            WHERE ci.image_url IS NOT NULL AND btrim(ci.image_url) <> ''
              AND NOT EXISTS (SELECT 1 FROM item_images i WHERE i.cart_item_id = ci.id)
            ORDER BY ci.id
            LIMIT $1
            "
        }
    };

    let rows = sqlx::query_as::<_, LegacyRow>(sql)
        .bind(limit)
        .fetch_all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| LegacyItem {
            owner: match kind {
                ImageOwnerKind::OrderItem => ImageOwner::OrderItem(OrderItemId::new(row.id)),
                ImageOwnerKind::CartItem => ImageOwner::CartItem(CartItemId::new(row.id)),
            },
            image_url: row.image_url,
        })
        .collect())
}
